//! Request routing and path matching.
//!
//! The router maps a method and path to a registered route, extracting
//! `{param}` segments along the way. Several routes may share a pattern
//! when they differ by version; the `accept-version` header selects
//! between them.
//!
//! # Version selection
//!
//! 1. With an `accept-version` header, the route whose major version
//!    matches wins; a route without a version accepts any header.
//! 2. Without the header, the highest registered version wins.
//!
//! # Example
//!
//! ```rust
//! use bitbeat_server::{RouteLookup, Router};
//! use http::Method;
//!
//! let mut router = Router::new();
//! router.add_route(&[Method::GET], "/api/users/{id}", Some(1), 0);
//! router.add_route(&[Method::GET], "/api/users/{id}", Some(2), 1);
//!
//! let RouteLookup::Found(found) = router.lookup(&Method::GET, "/api/users/7", Some("1.x")) else {
//!     panic!("expected a match");
//! };
//! assert_eq!(found.index(), 0);
//! assert_eq!(found.param("id"), Some("7"));
//!
//! let RouteLookup::Found(latest) = router.lookup(&Method::GET, "/api/users/7", None) else {
//!     panic!("expected a match");
//! };
//! assert_eq!(latest.index(), 1);
//! ```

use std::collections::HashMap;

use http::Method;

/// A matched route with extracted path parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    index: usize,
    params: HashMap<String, String>,
}

impl RouteMatch {
    /// Returns the index the route was registered with.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the extracted path parameters.
    #[must_use]
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Returns a specific path parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Consumes the match, returning the path parameters.
    #[must_use]
    pub fn into_params(self) -> HashMap<String, String> {
        self.params
    }
}

/// Outcome of a route lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteLookup {
    /// A route matched.
    Found(RouteMatch),
    /// The path matched but no route accepts the method.
    MethodNotAllowed,
    /// The path and method matched but no route serves the requested version.
    VersionNotFound,
    /// Nothing matched the path.
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone)]
struct Route {
    methods: Vec<Method>,
    segments: Vec<PathSegment>,
    version: Option<u64>,
    index: usize,
}

impl Route {
    fn parse_segments(pattern: &str) -> Vec<PathSegment> {
        pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => PathSegment::Param(name.to_string()),
                None => PathSegment::Literal(s.to_string()),
            })
            .collect()
    }

    fn match_path(&self, path: &[&str]) -> Option<HashMap<String, String>> {
        if path.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (pattern, actual) in self.segments.iter().zip(path) {
            match pattern {
                PathSegment::Literal(expected) => {
                    if expected != actual {
                        return None;
                    }
                }
                PathSegment::Param(name) => {
                    params.insert(name.clone(), (*actual).to_string());
                }
            }
        }
        Some(params)
    }

    fn accepts(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }
}

/// HTTP request router.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route.
    ///
    /// `version` is the major version the route serves, or `None` for a
    /// route that answers regardless of the requested version. `index`
    /// is returned in [`RouteMatch::index`].
    pub fn add_route(
        &mut self,
        methods: &[Method],
        pattern: &str,
        version: Option<u64>,
        index: usize,
    ) {
        self.routes.push(Route {
            methods: methods.to_vec(),
            segments: Route::parse_segments(pattern),
            version,
            index,
        });
    }

    /// Returns `true` if a route with the same pattern, version and an
    /// overlapping method is already registered.
    #[must_use]
    pub fn conflicts(&self, methods: &[Method], pattern: &str, version: Option<u64>) -> bool {
        let segments = Route::parse_segments(pattern);
        self.routes.iter().any(|route| {
            route.version == version
                && same_shape(&route.segments, &segments)
                && methods.iter().any(|m| route.accepts(m))
        })
    }

    /// Returns the number of registered routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Looks up the route for a request.
    #[must_use]
    pub fn lookup(&self, method: &Method, path: &str, accept_version: Option<&str>) -> RouteLookup {
        let path: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let matching: Vec<(&Route, HashMap<String, String>)> = self
            .routes
            .iter()
            .filter_map(|route| route.match_path(&path).map(|params| (route, params)))
            .collect();
        if matching.is_empty() {
            return RouteLookup::NotFound;
        }

        let allowed: Vec<_> = matching
            .into_iter()
            .filter(|(route, _)| route.accepts(method))
            .collect();
        if allowed.is_empty() {
            return RouteLookup::MethodNotAllowed;
        }

        let chosen = match accept_version {
            Some(requested) => {
                let Some(major) = parse_major(requested) else {
                    return RouteLookup::VersionNotFound;
                };
                allowed
                    .iter()
                    .find(|(route, _)| route.version == Some(major))
                    .or_else(|| allowed.iter().find(|(route, _)| route.version.is_none()))
            }
            None => allowed.iter().max_by_key(|(route, _)| route.version),
        };

        match chosen {
            Some((route, params)) => RouteLookup::Found(RouteMatch {
                index: route.index,
                params: params.clone(),
            }),
            None => RouteLookup::VersionNotFound,
        }
    }
}

fn same_shape(left: &[PathSegment], right: &[PathSegment]) -> bool {
    left.len() == right.len()
        && left.iter().zip(right).all(|pair| match pair {
            (PathSegment::Literal(a), PathSegment::Literal(b)) => a == b,
            (PathSegment::Param(_), PathSegment::Param(_)) => true,
            _ => false,
        })
}

/// Parses the major component of a version string.
///
/// Accepts `1`, `v1`, `1.x`, `1.0.0` and similar forms.
#[must_use]
pub fn parse_major(version: &str) -> Option<u64> {
    let version = version.trim();
    let version = version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version);
    version.split('.').next()?.parse().ok()
}
