//! # Route Table
//!
//! Maps a request path to the API whose listen path is its longest
//! segment-aligned prefix. Built once per reload generation and never
//! mutated.

use std::sync::Arc;

use tollgate_core::GatewayError;

use crate::registry::{ApiRegistry, ApiSpec};

/// A dispatched request.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// The selected API.
    pub spec: Arc<ApiSpec>,
    /// Path to append to the target URL. Always starts with `/`.
    pub forward_path: String,
}

/// Listen-path routes, longest first.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Arc<ApiSpec>>,
}

impl RouteTable {
    /// One route per registered API.
    pub fn build(registry: &ApiRegistry) -> Self {
        let mut routes = registry.specs().to_vec();
        // Listen paths are unique, so this order is total.
        routes.sort_by(|a, b| {
            b.listen_path()
                .len()
                .cmp(&a.listen_path().len())
                .then_with(|| a.listen_path().cmp(b.listen_path()))
        });
        Self { routes }
    }

    /// Select the API for `path`.
    pub fn dispatch(&self, path: &str) -> Result<RouteMatch, GatewayError> {
        let spec = self
            .routes
            .iter()
            .find(|spec| prefix_matches(spec.listen_path(), path))
            .ok_or_else(|| GatewayError::NoMatchingApi {
                path: path.to_string(),
            })?;

        let forward_path = if spec.definition().proxy.strip_listen_path {
            let rest = strip_prefix(spec.listen_path(), path);
            if rest.starts_with('/') {
                rest.to_string()
            } else {
                format!("/{rest}")
            }
        } else {
            path.to_string()
        };

        Ok(RouteMatch {
            spec: Arc::clone(spec),
            forward_path,
        })
    }

    /// Listen paths in match order.
    pub fn listen_paths(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|s| s.listen_path())
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table has no routes.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Whether `listen_path` is a segment-aligned prefix of `path`.
pub fn prefix_matches(listen_path: &str, path: &str) -> bool {
    if listen_path == "/" {
        return true;
    }
    match path.strip_prefix(listen_path) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// `path` with `listen_path` removed; `path` unchanged when it does not
/// start with `listen_path`.
pub fn strip_prefix<'a>(listen_path: &str, path: &'a str) -> &'a str {
    if listen_path == "/" {
        return path;
    }
    path.strip_prefix(listen_path).unwrap_or(path)
}

/// Resolve the `.` and `..` segments of a request path.
///
/// Follows URL parsing for http(s): `%2e` counts as a dot and `\` as a
/// separator. The result is the path the upstream will see, so listen-path
/// matching and the path lists must run on it. A `..` that would climb
/// above the root is refused.
pub fn normalize_request_path(path: &str) -> Result<String, GatewayError> {
    let rest = path.strip_prefix(['/', '\\']).unwrap_or(path);
    let mut out: Vec<&str> = Vec::new();
    let mut ends_in_dots = false;
    for segment in rest.split(['/', '\\']) {
        ends_in_dots = true;
        if is_double_dot(segment) {
            out.pop().ok_or_else(|| GatewayError::InvalidPath {
                path: path.to_string(),
            })?;
        } else if !is_single_dot(segment) {
            ends_in_dots = false;
            out.push(segment);
        }
    }
    if ends_in_dots {
        out.push("");
    }
    Ok(format!("/{}", out.join("/")))
}

fn is_single_dot(segment: &str) -> bool {
    segment == "." || segment.eq_ignore_ascii_case("%2e")
}

fn is_double_dot(segment: &str) -> bool {
    segment.len() <= 6
        && matches!(
            segment.to_ascii_lowercase().as_str(),
            ".." | ".%2e" | "%2e." | "%2e%2e"
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::fixtures::definition;

    fn table(defs: &[(&str, &str, bool)]) -> RouteTable {
        let defs = defs
            .iter()
            .map(|(id, listen, strip)| {
                let mut d = definition(id, listen);
                d.proxy.strip_listen_path = *strip;
                d
            })
            .collect();
        RouteTable::build(&ApiRegistry::load(defs).unwrap())
    }

    #[test]
    fn prefix_matches_at_segment_boundary() {
        assert!(prefix_matches("/v1", "/v1"));
        assert!(prefix_matches("/v1", "/v1/x"));
        assert!(!prefix_matches("/v1", "/v10"));
        assert!(!prefix_matches("/v1", "/"));
        assert!(prefix_matches("/", "/anything"));
    }

    #[test]
    fn longest_listen_path_wins() {
        let table = table(&[("short", "/api", false), ("long", "/api/v2", false)]);
        assert_eq!(
            table.listen_paths().collect::<Vec<_>>(),
            vec!["/api/v2", "/api"]
        );
        assert_eq!(table.dispatch("/api/v2/x").unwrap().spec.api_id(), "long");
        assert_eq!(table.dispatch("/api/v3").unwrap().spec.api_id(), "short");
    }

    #[test]
    fn root_listen_path_catches_everything_else() {
        let table = table(&[("root", "/", false), ("v1", "/v1", false)]);
        assert_eq!(table.dispatch("/v1/a").unwrap().spec.api_id(), "v1");
        assert_eq!(table.dispatch("/other").unwrap().spec.api_id(), "root");
    }

    #[test]
    fn no_match_is_an_error() {
        let table = table(&[("1", "/v1", false)]);
        assert_eq!(
            table.dispatch("/v10/x").unwrap_err(),
            GatewayError::NoMatchingApi {
                path: "/v10/x".into()
            }
        );
    }

    #[test]
    fn forward_path_respects_strip_flag() {
        let table = table(&[("keep", "/keep", false), ("strip", "/strip", true)]);
        assert_eq!(table.dispatch("/keep/a/b").unwrap().forward_path, "/keep/a/b");
        assert_eq!(table.dispatch("/strip/a/b").unwrap().forward_path, "/a/b");
        assert_eq!(table.dispatch("/strip").unwrap().forward_path, "/");
    }

    #[test]
    fn dot_segments_are_resolved() {
        assert_eq!(normalize_request_path("/v1/x/../admin").unwrap(), "/v1/admin");
        assert_eq!(normalize_request_path("/v1/./a").unwrap(), "/v1/a");
        assert_eq!(normalize_request_path("/v1/x/%2E%2e/admin").unwrap(), "/v1/admin");
        assert_eq!(normalize_request_path("/v1/x\\..\\admin").unwrap(), "/v1/admin");
        assert_eq!(normalize_request_path("/v1/a/..").unwrap(), "/v1/");
        assert_eq!(normalize_request_path("/").unwrap(), "/");
        assert_eq!(normalize_request_path("/a//b/").unwrap(), "/a//b/");
        assert_eq!(normalize_request_path("/v1/..x").unwrap(), "/v1/..x");
    }

    #[test]
    fn dot_segments_may_not_escape_the_root() {
        for path in ["/..", "/v1/../..", "/%2e%2e/etc"] {
            assert_eq!(
                normalize_request_path(path).unwrap_err(),
                GatewayError::InvalidPath { path: path.into() }
            );
        }
    }

    #[test]
    fn empty_table_matches_nothing() {
        let table = RouteTable::default();
        assert!(table.is_empty());
        assert!(table.dispatch("/").is_err());
    }
}
