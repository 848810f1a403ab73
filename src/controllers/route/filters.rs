use tracing::debug;

use super::RouteError;
use crate::common::{
    gateway_api::{
        common::{HTTPHeader, HeaderModifier as KubeHeaderModifier, RequestMirror},
        grpcroutes::{GRPCFilterType, GRPCRouteFilter},
        httproutes::{Cors, HTTPFilterType, HTTPPathModifier, HTTPRouteFilter, PathModifierType, RequestRedirect},
    },
    route::{CorsPolicy, HeaderModifier, PathRewrite, Redirect},
    BackendError, BackendResolver, ResourceKey, RouteFilter,
};

const DEFAULT_REDIRECT_STATUS: u16 = 302;
const SUPPORTED_REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];
const DEFAULT_MIRROR_DENOMINATOR: i32 = 100;
const DEFAULT_MIRROR_PERCENT: i32 = 100;

/// Translated filters of one rule or one backend.
#[derive(Debug, Default)]
pub struct FilterTranslation {
    pub filters: Vec<RouteFilter>,
    pub backend_error: Option<BackendError>,
    pub deprecated: Option<String>,
}

impl FilterTranslation {
    fn push_mirror(&mut self, mirror: MirrorTranslation) {
        self.filters.extend(mirror.filter);
        if self.backend_error.is_none() {
            self.backend_error = mirror.backend_error;
        }
        if self.deprecated.is_none() {
            self.deprecated = mirror.deprecated;
        }
    }
}

struct MirrorTranslation {
    filter: Option<RouteFilter>,
    backend_error: Option<BackendError>,
    deprecated: Option<String>,
}

fn missing(filter: &str) -> RouteError {
    RouteError::UnsupportedValue(format!("filter {filter} has no configuration"))
}

fn header_pairs(headers: Option<&Vec<HTTPHeader>>) -> Vec<(String, String)> {
    headers.into_iter().flatten().map(|h| (h.name.clone(), h.value.clone())).collect()
}

pub fn header_modifier(modifier: &KubeHeaderModifier) -> HeaderModifier {
    HeaderModifier {
        set: header_pairs(modifier.set.as_ref()),
        add: header_pairs(modifier.add.as_ref()),
        remove: modifier.remove.clone().unwrap_or_default(),
    }
}

/// Mirror percentage from `fraction` or `percent`, `percent` wins when both are set.
pub fn mirror_percentage(mirror: &RequestMirror) -> Result<f64, RouteError> {
    match (mirror.percent, &mirror.fraction) {
        (Some(percent), _) => Ok(f64::from(percent)),
        (None, Some(fraction)) => {
            let denominator = fraction.denominator.unwrap_or(DEFAULT_MIRROR_DENOMINATOR);
            if denominator <= 0 || fraction.numerator < 0 || fraction.numerator > denominator {
                return Err(RouteError::UnsupportedValue(format!(
                    "mirror fraction {}/{denominator} is not a valid ratio",
                    fraction.numerator
                )));
            }
            Ok(f64::from(fraction.numerator) / f64::from(denominator) * 100.0)
        }
        (None, None) => Ok(f64::from(DEFAULT_MIRROR_PERCENT)),
    }
}

fn mirror(backends: &BackendResolver<'_>, route: &ResourceKey, mirror: &RequestMirror) -> Result<MirrorTranslation, RouteError> {
    let deprecated = (mirror.percent.is_some() && mirror.fraction.is_some()).then(|| "mirror sets both percent and fraction, percent is used".to_owned());
    let percentage = mirror_percentage(mirror)?;
    if percentage == 0.0 {
        debug!("Route {route} mirror to {} is disabled", mirror.backend_ref.name);
        return Ok(MirrorTranslation {
            filter: None,
            backend_error: None,
            deprecated,
        });
    }

    match backends.resolve(route, &mirror.backend_ref, Some(1)) {
        (Some(backend), _) => Ok(MirrorTranslation {
            filter: Some(RouteFilter::RequestMirror {
                backend: backend.backend,
                percentage,
            }),
            backend_error: None,
            deprecated,
        }),
        (None, Some(e)) if e.is_fatal() => Err(RouteError::Backend(e)),
        (None, backend_error) => Ok(MirrorTranslation {
            filter: None,
            backend_error,
            deprecated,
        }),
    }
}

fn path_modifier(modifier: &HTTPPathModifier) -> Result<PathRewrite, RouteError> {
    match modifier.r#type {
        PathModifierType::ReplaceFullPath => modifier
            .replace_full_path
            .clone()
            .map(PathRewrite::Full)
            .ok_or_else(|| RouteError::UnsupportedValue("ReplaceFullPath requires replaceFullPath".to_owned())),
        PathModifierType::ReplacePrefixMatch => modifier
            .replace_prefix_match
            .as_deref()
            .map(|prefix| PathRewrite::Prefix(strip_trailing_slash(prefix).to_owned()))
            .ok_or_else(|| RouteError::UnsupportedValue("ReplacePrefixMatch requires replacePrefixMatch".to_owned())),
    }
}

/// Drops one trailing `/`, the root path is kept as is.
pub fn strip_trailing_slash(path: &str) -> &str {
    if path == "/" {
        path
    } else {
        path.strip_suffix('/').unwrap_or(path)
    }
}

fn redirect(redirect: &RequestRedirect) -> Result<Redirect, RouteError> {
    let status = match redirect.status_code {
        None => DEFAULT_REDIRECT_STATUS,
        Some(code) => u16::try_from(code)
            .ok()
            .filter(|code| SUPPORTED_REDIRECT_STATUSES.contains(code))
            .ok_or_else(|| RouteError::UnsupportedValue(format!("redirect status code {code} is not supported")))?,
    };
    Ok(Redirect {
        scheme: redirect.scheme.clone(),
        hostname: redirect.hostname.clone(),
        port: redirect.port,
        path: redirect.path.as_ref().map(path_modifier).transpose()?,
        status,
    })
}

fn cors(cors: &Cors) -> CorsPolicy {
    CorsPolicy {
        allow_origins: cors.allow_origins.clone().unwrap_or_default(),
        allow_methods: cors.allow_methods.clone().unwrap_or_default(),
        allow_headers: cors.allow_headers.clone().unwrap_or_default(),
        expose_headers: cors.expose_headers.clone().unwrap_or_default(),
        allow_credentials: cors.allow_credentials.unwrap_or_default(),
        max_age: cors.max_age,
    }
}

pub fn http_filters(backends: &BackendResolver<'_>, route: &ResourceKey, filters: &[HTTPRouteFilter]) -> Result<FilterTranslation, RouteError> {
    let has = |filter_type: HTTPFilterType| filters.iter().any(|f| f.r#type == filter_type);
    if has(HTTPFilterType::RequestRedirect) && has(HTTPFilterType::URLRewrite) {
        return Err(RouteError::IncompatibleFilters("RequestRedirect and URLRewrite cannot be used together".to_owned()));
    }

    let mut translation = FilterTranslation::default();
    for filter in filters {
        match filter.r#type {
            HTTPFilterType::RequestHeaderModifier => {
                let modifier = filter.request_header_modifier.as_ref().ok_or_else(|| missing("RequestHeaderModifier"))?;
                translation.filters.push(RouteFilter::RequestHeaderModifier(header_modifier(modifier)));
            }
            HTTPFilterType::ResponseHeaderModifier => {
                let modifier = filter.response_header_modifier.as_ref().ok_or_else(|| missing("ResponseHeaderModifier"))?;
                translation.filters.push(RouteFilter::ResponseHeaderModifier(header_modifier(modifier)));
            }
            HTTPFilterType::RequestRedirect => {
                let request_redirect = filter.request_redirect.as_ref().ok_or_else(|| missing("RequestRedirect"))?;
                translation.filters.push(RouteFilter::RequestRedirect(redirect(request_redirect)?));
            }
            HTTPFilterType::URLRewrite => {
                let rewrite = filter.url_rewrite.as_ref().ok_or_else(|| missing("URLRewrite"))?;
                translation.filters.push(RouteFilter::UrlRewrite {
                    hostname: rewrite.hostname.clone(),
                    path: rewrite.path.as_ref().map(path_modifier).transpose()?,
                });
            }
            HTTPFilterType::RequestMirror => {
                let request_mirror = filter.request_mirror.as_ref().ok_or_else(|| missing("RequestMirror"))?;
                translation.push_mirror(mirror(backends, route, request_mirror)?);
            }
            HTTPFilterType::Cors => {
                let policy = filter.cors.as_ref().ok_or_else(|| missing("CORS"))?;
                translation.filters.push(RouteFilter::Cors(cors(policy)));
            }
            HTTPFilterType::ExtensionRef | HTTPFilterType::Unsupported => {
                return Err(RouteError::IncompatibleFilters(format!("filter type {:?} is not supported", filter.r#type)));
            }
        }
    }
    Ok(translation)
}

pub fn grpc_filters(backends: &BackendResolver<'_>, route: &ResourceKey, filters: &[GRPCRouteFilter]) -> Result<FilterTranslation, RouteError> {
    let mut translation = FilterTranslation::default();
    for filter in filters {
        match filter.r#type {
            GRPCFilterType::RequestHeaderModifier => {
                let modifier = filter.request_header_modifier.as_ref().ok_or_else(|| missing("RequestHeaderModifier"))?;
                translation.filters.push(RouteFilter::RequestHeaderModifier(header_modifier(modifier)));
            }
            GRPCFilterType::ResponseHeaderModifier => {
                let modifier = filter.response_header_modifier.as_ref().ok_or_else(|| missing("ResponseHeaderModifier"))?;
                translation.filters.push(RouteFilter::ResponseHeaderModifier(header_modifier(modifier)));
            }
            GRPCFilterType::RequestMirror => {
                let request_mirror = filter.request_mirror.as_ref().ok_or_else(|| missing("RequestMirror"))?;
                translation.push_mirror(mirror(backends, route, request_mirror)?);
            }
            GRPCFilterType::ExtensionRef | GRPCFilterType::Unsupported => {
                return Err(RouteError::IncompatibleFilters(format!("filter type {:?} is not supported", filter.r#type)));
            }
        }
    }
    Ok(translation)
}
