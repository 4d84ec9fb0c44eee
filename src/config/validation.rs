//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check backend URLs parse (with a host) and match the route kind
//! - Validate value ranges (timeouts > 0, bind address valid)
//! - Detect conflicting routes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{BackendKind, ProxyConfig, RouteConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid bind address {address:?}: {reason}")]
    BindAddress { address: String, reason: String },

    #[error("route {route:?}: invalid target URL {target:?}: {reason}")]
    TargetUrl {
        route: String,
        target: String,
        reason: String,
    },

    #[error("route {route:?}: scheme {scheme:?} cannot serve a {kind} backend")]
    SchemeMismatch {
        route: String,
        scheme: String,
        kind: BackendKind,
    },

    #[error("route {route:?}: path prefix {prefix:?} must start with '/' and must not be the root path")]
    PathPrefix { route: String, prefix: String },

    #[error("path prefix {prefix:?} is declared by more than one route")]
    DuplicatePrefix { prefix: String },

    #[error("timeout {name} must be greater than zero")]
    ZeroTimeout { name: &'static str },
}

/// Validate the whole configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = config.listener.bind_address.parse::<SocketAddr>() {
        errors.push(ValidationError::BindAddress {
            address: config.listener.bind_address.clone(),
            reason: e.to_string(),
        });
    }

    let mut seen = HashSet::new();
    for route in &config.routes {
        if !route.path_prefix.starts_with('/') || route.path_prefix == "/" {
            errors.push(ValidationError::PathPrefix {
                route: route.name.clone(),
                prefix: route.path_prefix.clone(),
            });
        }
        if !seen.insert(route.path_prefix.as_str()) {
            errors.push(ValidationError::DuplicatePrefix {
                prefix: route.path_prefix.clone(),
            });
        }
        if let Err(e) = parse_target(route) {
            errors.push(e);
        }
    }

    let timeouts = &config.timeouts;
    for (name, value) in [
        ("connect_secs", timeouts.connect_secs),
        ("request_secs", timeouts.request_secs),
        ("idle_secs", timeouts.idle_secs),
        ("close_secs", timeouts.close_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout { name });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Parse a route's target URL and check its scheme against the route kind.
pub fn parse_target(route: &RouteConfig) -> Result<Url, ValidationError> {
    let url = Url::parse(&route.target).map_err(|e| ValidationError::TargetUrl {
        route: route.name.clone(),
        target: route.target.clone(),
        reason: e.to_string(),
    })?;

    let scheme_ok = match route.kind {
        BackendKind::WebSocket => matches!(url.scheme(), "ws" | "wss"),
        BackendKind::Http => matches!(url.scheme(), "http" | "https"),
    };
    if !scheme_ok {
        return Err(ValidationError::SchemeMismatch {
            route: route.name.clone(),
            scheme: url.scheme().to_string(),
            kind: route.kind,
        });
    }

    Ok(url)
}
