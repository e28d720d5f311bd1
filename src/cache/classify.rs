//! Route classification.
//!
//! Every intercepted request is mapped to exactly one [`RouteClass`] by an
//! ordered predicate table; the first matching rule wins and the fall-through
//! default is [`RouteClass::Dynamic`]. Classification is pure and carries no
//! strategy logic, so the table can be tested apart from dispatch.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::RouteConfig;

/// The caching class assigned to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteClass {
    /// Never intercepted: session-bound, real-time, or security-sensitive.
    Excluded,
    /// Versioned static resource, served stale-while-revalidate.
    ShellAsset,
    /// Third-party static resource, served cache-first.
    CrossOrigin,
    /// Everything else, served network-first with cache fallback.
    Dynamic,
}

impl std::fmt::Display for RouteClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteClass::Excluded => write!(f, "excluded"),
            RouteClass::ShellAsset => write!(f, "shell-asset"),
            RouteClass::CrossOrigin => write!(f, "cross-origin"),
            RouteClass::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// A single predicate over the request.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// The full URL contains this substring.
    UrlContains(String),
    /// The URL path starts with this prefix.
    PathPrefix(String),
    /// The request host equals this host.
    Host(String),
    /// The method is anything other than GET.
    NonGet,
}

impl Pattern {
    fn matches(&self, method: &str, url: &Url) -> bool {
        match self {
            Pattern::UrlContains(s) => url.as_str().contains(s.as_str()),
            Pattern::PathPrefix(p) => url.path().starts_with(p.as_str()),
            Pattern::Host(h) => url.host_str() == Some(h.as_str()),
            Pattern::NonGet => !method.eq_ignore_ascii_case("GET"),
        }
    }
}

/// One row of the classification table.
#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: Pattern,
    pub class: RouteClass,
}

/// Ordered first-match-wins classifier.
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Classifier {
    /// Build the rule table from route configuration.
    ///
    /// Order matters: exclusion substrings come first so a state or command
    /// endpoint under the static prefix could never be cached, then the
    /// non-GET guard (only GET exchanges are cache candidates), then the
    /// static prefix, then the cross-origin host allow-list.
    pub fn from_config(routes: &RouteConfig) -> Self {
        let mut rules = Vec::new();

        for substring in &routes.excluded_substrings {
            rules.push(Rule {
                pattern: Pattern::UrlContains(substring.clone()),
                class: RouteClass::Excluded,
            });
        }

        rules.push(Rule {
            pattern: Pattern::NonGet,
            class: RouteClass::Excluded,
        });

        rules.push(Rule {
            pattern: Pattern::PathPrefix(routes.static_prefix.clone()),
            class: RouteClass::ShellAsset,
        });

        for host in &routes.cross_origin_hosts {
            rules.push(Rule {
                pattern: Pattern::Host(host.clone()),
                class: RouteClass::CrossOrigin,
            });
        }

        Self { rules }
    }

    /// Classify a request by method and absolute URL.
    ///
    /// An unparseable URL is excluded: the controller must not intercept
    /// what it cannot reason about.
    pub fn classify(&self, method: &str, url: &str) -> RouteClass {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(_) => return RouteClass::Excluded,
        };

        for rule in &self.rules {
            if rule.pattern.matches(method, &parsed) {
                return rule.class;
            }
        }
        RouteClass::Dynamic
    }
}
