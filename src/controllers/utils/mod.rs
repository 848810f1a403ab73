mod hostname_match_filter;
mod namespace_selector;

pub use hostname_match_filter::{hostnames_match, HostnameMatchFilter};
pub use namespace_selector::{namespace_matches, select_namespaces};
