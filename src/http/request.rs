//! Request handling and transformation.
//!
//! # Responsibilities
//! - Rewrite the request URL onto the backend origin
//! - Filter headers before forwarding (hop-by-hop, Host)
//! - Record the client address in `X-Forwarded-For`
//!
//! # Design Decisions
//! - The request path is forwarded as-is; the route prefix is not stripped
//! - Backend base path and request path are joined with exactly one slash
//! - Request ID added as early as possible for tracing (see server.rs)

use std::net::IpAddr;

use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::Uri;
use url::Url;

use crate::http::response::strip_hop_by_hop;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Header carrying the chain of client addresses.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Build the backend URL for an inbound request URI.
pub fn target_url(base: &Url, uri: &Uri) -> Url {
    let mut url = base.clone();
    url.set_path(&join_paths(base.path(), uri.path()));

    let query = match (base.query().filter(|q| !q.is_empty()), uri.query().filter(|q| !q.is_empty())) {
        (Some(a), Some(b)) => Some(format!("{}&{}", a, b)),
        (Some(a), None) => Some(a.to_string()),
        (None, Some(b)) => Some(b.to_string()),
        (None, None) => None,
    };
    url.set_query(query.as_deref());
    url
}

fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

/// Headers to send upstream for an inbound request.
pub fn forward_headers(inbound: &HeaderMap, client: Option<IpAddr>) -> HeaderMap {
    let mut headers = inbound.clone();
    strip_hop_by_hop(&mut headers);
    // The HTTP client derives Host from the target URL.
    headers.remove(header::HOST);

    if let Some(ip) = client {
        let chain = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(prior) if !prior.is_empty() => format!("{}, {}", prior, ip),
            _ => ip.to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&chain) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    headers
}

/// True if the inbound request announces a body worth streaming upstream.
pub fn has_body(headers: &HeaderMap) -> bool {
    if headers.contains_key(header::TRANSFER_ENCODING) {
        return true;
    }
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|len| len > 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn path_and_query_are_carried_over() {
        let uri: Uri = "/azusxh/a/b?x=1".parse().unwrap();
        let out = target_url(&url("https://ex01.choreoapps.dev"), &uri);
        assert_eq!(out.as_str(), "https://ex01.choreoapps.dev/azusxh/a/b?x=1");
    }

    #[test]
    fn base_path_is_joined_with_one_slash() {
        let uri: Uri = "/api/users".parse().unwrap();
        assert_eq!(
            target_url(&url("http://backend/v2/"), &uri).as_str(),
            "http://backend/v2/api/users"
        );
        assert_eq!(
            target_url(&url("http://backend/v2"), &uri).as_str(),
            "http://backend/v2/api/users"
        );
    }

    #[test]
    fn queries_are_merged() {
        let uri: Uri = "/p?b=2".parse().unwrap();
        let out = target_url(&url("http://backend/?a=1"), &uri);
        assert_eq!(out.query(), Some("a=1&b=2"));

        let bare: Uri = "/p".parse().unwrap();
        assert_eq!(target_url(&url("http://backend"), &bare).query(), None);
    }

    #[test]
    fn forwarded_headers_drop_host_and_hop_by_hop() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, HeaderValue::from_static("proxy.local"));
        inbound.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-secret"));
        inbound.insert("x-secret", HeaderValue::from_static("1"));
        inbound.insert(header::ACCEPT, HeaderValue::from_static("text/plain"));
        inbound.insert(X_FORWARDED_FOR, HeaderValue::from_static("10.0.0.1"));

        let out = forward_headers(&inbound, Some("192.168.1.7".parse().unwrap()));
        assert!(out.get(header::HOST).is_none());
        assert!(out.get(header::CONNECTION).is_none());
        assert!(out.get("x-secret").is_none());
        assert_eq!(out[header::ACCEPT], "text/plain");
        assert_eq!(out[X_FORWARDED_FOR], "10.0.0.1, 192.168.1.7");
    }

    #[test]
    fn body_detection() {
        let mut headers = HeaderMap::new();
        assert!(!has_body(&headers));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        assert!(!has_body(&headers));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("12"));
        assert!(has_body(&headers));
        headers.clear();
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        assert!(has_body(&headers));
    }
}
