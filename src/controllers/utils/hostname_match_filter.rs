use tracing::debug;

use crate::common::DEFAULT_ROUTE_HOSTNAME;

/// Symmetric string wildcard match between two hostnames.
///
/// A leading `*` on either side matches any prefix. This is a plain suffix comparison rather than a
/// label match, so `*.com` also matches `*.apple.com`.
pub fn hostnames_match(left: &str, right: &str) -> bool {
    let left_wildcard = left.starts_with('*');
    let right_wildcard = right.starts_with('*');
    match (left_wildcard, right_wildcard) {
        (true, true) => {
            if left.len() < right.len() {
                right[1..].ends_with(&left[1..])
            } else {
                left[1..].ends_with(&right[1..])
            }
        }
        (true, false) => right.ends_with(&left[1..]),
        (false, true) => left.ends_with(&right[1..]),
        (false, false) => left == right,
    }
}

pub struct HostnameMatchFilter<'a> {
    listener_hostname: &'a str,
    route_hostnames: &'a [String],
}

impl<'a> HostnameMatchFilter<'a> {
    pub fn new(listener_hostname: &'a str, route_hostnames: &'a [String]) -> Self {
        Self { listener_hostname, route_hostnames }
    }

    pub fn filter(&self) -> bool {
        if self.listener_hostname.is_empty() || self.route_hostnames.is_empty() {
            return true;
        }
        self.route_hostnames.iter().any(|route_hostname| {
            let res = hostnames_match(self.listener_hostname, route_hostname);
            debug!("Comparing hostnames {} {} {}", self.listener_hostname, route_hostname, res);
            res
        })
    }

    /// Route hostnames narrowed to what the listener serves, most specific side kept.
    pub fn effective_hostnames(&self) -> Vec<String> {
        let listener_hostname = if self.listener_hostname.is_empty() { DEFAULT_ROUTE_HOSTNAME } else { self.listener_hostname };
        if self.route_hostnames.is_empty() {
            return vec![listener_hostname.to_owned()];
        }
        let mut hostnames: Vec<String> = vec![];
        for route_hostname in self.route_hostnames {
            if !hostnames_match(listener_hostname, route_hostname) {
                continue;
            }
            let narrowest = if more_specific(route_hostname, listener_hostname) { route_hostname.as_str() } else { listener_hostname };
            if !hostnames.iter().any(|h| h == narrowest) {
                hostnames.push(narrowest.to_owned());
            }
        }
        hostnames
    }
}

fn more_specific(candidate: &str, other: &str) -> bool {
    match (candidate.starts_with('*'), other.starts_with('*')) {
        (false, _) => true,
        (true, false) => false,
        (true, true) => candidate.len() >= other.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_is_symmetric() {
        let pairs = [
            ("*", "api.example.com", true),
            ("*.example.com", "api.example.com", true),
            ("api.example.com", "*.apple.com", false),
            ("*.com", "*.apple.com", true),
            ("api.example.com", "api.example.com", true),
            ("api.example.com", "web.example.com", false),
        ];
        for (left, right, expected) in pairs {
            assert_eq!(hostnames_match(left, right), expected, "{left} {right}");
            assert_eq!(hostnames_match(right, left), expected, "{right} {left}");
        }
    }

    #[test]
    fn domain_testing() {
        let listener_hostname = "test.com";
        let route_hostnames = vec!["test.com".to_owned(), "no-test.com".to_owned()];
        assert!(HostnameMatchFilter::new(listener_hostname, &route_hostnames).filter());
        let route_hostnames = vec!["diff-test.com".to_owned(), "no-test.com".to_owned()];
        assert!(!HostnameMatchFilter::new(listener_hostname, &route_hostnames).filter());

        let listener_hostname = "*.test.com";
        let route_hostnames = vec!["even.more.test.com".to_owned(), "no-test.com".to_owned()];
        assert!(HostnameMatchFilter::new(listener_hostname, &route_hostnames).filter());

        let listener_hostname = "more.test.com";
        let route_hostnames = vec!["*.test.com".to_owned()];
        assert!(HostnameMatchFilter::new(listener_hostname, &route_hostnames).filter());
    }

    #[test]
    fn effective_hostnames_keep_the_narrower_side() {
        let route_hostnames = vec!["*.test.com".to_owned(), "a.test.com".to_owned(), "other.org".to_owned()];
        assert_eq!(HostnameMatchFilter::new("b.test.com", &route_hostnames).effective_hostnames(), vec!["b.test.com".to_owned()]);
        assert_eq!(
            HostnameMatchFilter::new("*.test.com", &route_hostnames).effective_hostnames(),
            vec!["*.test.com".to_owned(), "a.test.com".to_owned()]
        );
        assert_eq!(HostnameMatchFilter::new("", &[]).effective_hostnames(), vec!["*".to_owned()]);
    }
}
