use std::collections::BTreeMap;

use crate::config::Config;

/// Built-in screen graph for the records client.
const DEFAULT_ADJACENCY: &[(&str, &[&str])] = &[
    ("/", &["/login", "/dashboard"]),
    ("/login", &["/dashboard"]),
    ("/dashboard", &["/records", "/medications", "/appointments"]),
    ("/records", &["/records/new", "/dashboard"]),
    ("/records/new", &["/records"]),
    ("/records/[id]", &["/records"]),
    ("/medications", &["/medications/new", "/dashboard"]),
    ("/medications/new", &["/medications"]),
    ("/appointments", &["/appointments/new", "/dashboard"]),
    ("/appointments/new", &["/appointments"]),
    ("/profile", &["/dashboard", "/settings"]),
    ("/settings", &["/profile"]),
];

/// Static, read-only map from a screen to its likely-next screens, in order.
///
/// Keys may contain `[param]` segments that match any single path segment,
/// e.g. `/records/[id]` matches `/records/42`.
#[derive(Debug, Clone)]
pub struct RouteAdjacency {
    routes: BTreeMap<String, Vec<String>>,
}

impl Default for RouteAdjacency {
    fn default() -> Self {
        Self::new(
            DEFAULT_ADJACENCY
                .iter()
                .map(|(from, to)| (from.to_string(), to.iter().map(|s| s.to_string()).collect()))
                .collect(),
        )
    }
}

impl RouteAdjacency {
    pub fn new(routes: BTreeMap<String, Vec<String>>) -> Self {
        let routes = routes
            .into_iter()
            .map(|(from, to)| (normalize(&from), to.iter().map(|r| normalize(r)).collect()))
            .collect();
        Self { routes }
    }

    /// The table from `config`, or the built-in one when none is set.
    pub fn from_config(config: &Config) -> Self {
        match &config.route_adjacency {
            Some(routes) => Self::new(routes.clone()),
            None => Self::default(),
        }
    }

    /// Likely-next screens for `route`; empty for unknown screens.
    pub fn next(&self, route: &str) -> &[String] {
        let route = normalize(route);
        if let Some(next) = self.routes.get(&route) {
            return next;
        }
        self.routes
            .iter()
            .find(|(pattern, _)| matches_pattern(pattern, &route))
            .map(|(_, next)| next.as_slice())
            .unwrap_or(&[])
    }
}

/// Drop query/fragment and any trailing slash (except on the root).
pub(crate) fn normalize(route: &str) -> String {
    let path = route.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn matches_pattern(pattern: &str, route: &str) -> bool {
    if !pattern.contains('[') {
        return false;
    }
    let pattern: Vec<&str> = pattern.split('/').collect();
    let route: Vec<&str> = route.split('/').collect();
    pattern.len() == route.len()
        && pattern.iter().zip(&route).all(|(p, r)| {
            (p.starts_with('[') && p.ends_with(']') && !r.is_empty()) || p == r
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_lookup_keeps_order() {
        let adjacency = RouteAdjacency::default();
        assert_eq!(
            adjacency.next("/dashboard"),
            &["/records", "/medications", "/appointments"]
        );
    }

    #[test]
    fn test_normalizes_query_and_trailing_slash() {
        let adjacency = RouteAdjacency::default();
        assert_eq!(adjacency.next("/login/?next=%2Frecords"), &["/dashboard"]);
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/records/#top"), "/records");
    }

    #[test]
    fn test_param_segments_match_one_segment() {
        let adjacency = RouteAdjacency::default();
        assert_eq!(adjacency.next("/records/42"), &["/records"]);
        assert!(adjacency.next("/records/42/attachments").is_empty());
        // Exact entries win over patterns
        assert_eq!(adjacency.next("/records/new"), &["/records"]);
    }

    #[test]
    fn test_configured_table_replaces_default() {
        let mut routes = BTreeMap::new();
        routes.insert("/vitals/".to_string(), vec!["/vitals/history".to_string()]);
        let config = Config {
            route_adjacency: Some(routes),
            ..Config::default()
        };

        let adjacency = RouteAdjacency::from_config(&config);
        assert_eq!(adjacency.next("/vitals"), &["/vitals/history"]);
        assert!(adjacency.next("/dashboard").is_empty());

        let fallback = RouteAdjacency::from_config(&Config::default());
        assert_eq!(fallback.next("/login"), &["/dashboard"]);
    }

    #[test]
    fn test_unknown_route_has_no_neighbours() {
        assert!(RouteAdjacency::default().next("/nowhere").is_empty());
    }
}
