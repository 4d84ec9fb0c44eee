//! HTTP reverse proxying to a fixed backend origin.

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::response::Response;
use url::Url;

use crate::config::TimeoutConfig;
use crate::http::request::{forward_headers, has_body, target_url};
use crate::http::response::from_upstream;

/// Forwarding a request upstream failed before a response arrived.
#[derive(Debug, thiserror::Error)]
#[error("upstream request to {url} failed: {source}")]
pub struct ForwardError {
    url: Url,
    #[source]
    source: reqwest::Error,
}

impl ForwardError {
    pub fn is_timeout(&self) -> bool {
        self.source.is_timeout()
    }
}

/// Forwards one request/response pair per call.
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
}

impl HttpForwarder {
    pub fn new(timeouts: &TimeoutConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .timeout(Duration::from_secs(timeouts.request_secs))
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()?;
        Ok(Self { client })
    }

    /// Send `request` to `origin`, keeping its path and query.
    pub async fn forward(&self, origin: &Url, request: Request<Body>) -> Result<Response, ForwardError> {
        let url = target_url(origin, request.uri());
        let client_ip = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        let (parts, body) = request.into_parts();
        let headers = forward_headers(&parts.headers, client_ip);

        let mut upstream = self
            .client
            .request(parts.method.clone(), url.clone())
            .headers(headers);
        if has_body(&parts.headers) {
            upstream = upstream.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        tracing::debug!(method = %parts.method, upstream = %url, "Forwarding request");

        let response = upstream
            .send()
            .await
            .map_err(|source| ForwardError { url, source })?;

        Ok(from_upstream(response))
    }
}
