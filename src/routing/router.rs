//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up the backend for a request path
//! - Return the root greeting, a matched route, or an explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Routes sorted longest prefix first, so declaration order never matters
//! - O(n) path prefix scan (acceptable for typical route counts)
//! - Explicit NotFound rather than silent default

use url::Url;

use crate::config::validation::{parse_target, ValidationError};
use crate::config::{BackendKind, RouteConfig};
use crate::routing::matcher::{ExactPathMatcher, Matcher, PathPrefixMatcher};

/// Where a matched route sends its traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    pub kind: BackendKind,
    pub url: Url,
}

/// A compiled route: one prefix, one backend.
#[derive(Debug)]
pub struct RouteEntry {
    pub name: String,
    matcher: PathPrefixMatcher,
    pub target: BackendTarget,
}

impl RouteEntry {
    pub fn prefix(&self) -> &str {
        self.matcher.prefix()
    }
}

impl TryFrom<&RouteConfig> for RouteEntry {
    type Error = ValidationError;

    fn try_from(config: &RouteConfig) -> Result<Self, Self::Error> {
        let url = parse_target(config)?;
        Ok(Self {
            name: config.name.clone(),
            matcher: PathPrefixMatcher::new(config.path_prefix.clone()),
            target: BackendTarget {
                kind: config.kind,
                url,
            },
        })
    }
}

/// Result of a route lookup.
#[derive(Debug)]
pub enum RouteMatch<'a> {
    /// The literal root path.
    Root,
    /// A backend route.
    Backend(&'a RouteEntry),
    /// Nothing matched.
    NotFound,
}

/// Immutable path-prefix route table.
#[derive(Debug)]
pub struct Router {
    root: ExactPathMatcher,
    routes: Vec<RouteEntry>,
}

impl Router {
    /// Compile the route table from configuration.
    pub fn from_config(routes: &[RouteConfig]) -> Result<Self, ValidationError> {
        let mut compiled = routes
            .iter()
            .map(RouteEntry::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        compiled.sort_by(|a, b| b.prefix().len().cmp(&a.prefix().len()));

        for route in &compiled {
            tracing::debug!(
                route = %route.name,
                prefix = %route.prefix(),
                kind = %route.target.kind,
                target = %route.target.url,
                "Route compiled"
            );
        }

        Ok(Self {
            root: ExactPathMatcher::new("/"),
            routes: compiled,
        })
    }

    /// Find the route for a request path.
    pub fn match_path(&self, path: &str) -> RouteMatch<'_> {
        if self.root.matches(path) {
            return RouteMatch::Root;
        }
        self.routes
            .iter()
            .find(|route| route.matcher.matches(path))
            .map(RouteMatch::Backend)
            .unwrap_or(RouteMatch::NotFound)
    }

    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }
}
