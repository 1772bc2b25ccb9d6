//! # Data-Plane Proxy
//!
//! Every request that matches no management route lands here. The handler
//! takes one [`Dispatcher`](tollgate_gateway::Dispatcher) snapshot, resolves
//! dot segments in the path, selects the API, runs the
//! [gate](crate::middleware::gate) checks, reads the bounded body, charges
//! the key and forwards to the API's target with `reqwest`.
//!
//! Forwarding preserves method, body and end-to-end headers. Hop-by-hop
//! headers, `Host` and `Content-Length` are dropped in both directions.

use std::time::Duration;

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use tollgate_core::GatewayError;
use tollgate_gateway::normalize_request_path;
use url::Url;

use crate::error::AppError;
use crate::middleware::gate;
use crate::state::AppState;

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// HTTP client for upstream targets.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
}

/// A buffered upstream response.
#[derive(Debug)]
pub struct UpstreamResponse {
    /// Upstream status.
    pub status: StatusCode,
    /// End-to-end response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl UpstreamClient {
    /// Build a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { http })
    }

    /// Send one request to `url` and buffer the response.
    pub async fn forward(
        &self,
        method: Method,
        url: String,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<UpstreamResponse, reqwest::Error> {
        let response = self
            .http
            .request(method, url)
            .headers(headers)
            .body(body)
            .send()
            .await?;
        let status = response.status();
        let headers = end_to_end(response.headers());
        let body = response.bytes().await?;
        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Target base URL joined with the forward path and the original query.
pub fn forward_url(target: &Url, forward_path: &str, query: Option<&str>) -> String {
    let base = target.as_str().trim_end_matches('/');
    match query {
        Some(q) if !q.is_empty() => format!("{base}{forward_path}?{q}"),
        _ => format!("{base}{forward_path}"),
    }
}

/// Copy of `headers` without hop-by-hop headers, `Host` and `Content-Length`.
pub fn end_to_end(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in HOP_BY_HOP {
        out.remove(name);
    }
    out.remove(header::HOST);
    out.remove(header::CONTENT_LENGTH);
    out
}

/// Fallback handler: dispatch, admit and forward.
pub async fn handle(State(state): State<AppState>, request: Request) -> Response {
    match proxy(&state, request).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn proxy(state: &AppState, request: Request) -> Result<Response, AppError> {
    let snapshot = state.coordinator.snapshot();
    let (mut parts, body) = request.into_parts();

    let checked = async {
        parts.uri = normalized_uri(&parts.uri)?;
        let route = snapshot.dispatch(parts.uri.path())?;
        let admission =
            gate::check(&state.sessions, &route, &parts.headers, &parts.uri, Utc::now()).await?;
        Ok::<_, GatewayError>((route, admission))
    }
    .await;
    let (route, admission) = checked.map_err(|e| refused(state, &parts.uri, e))?;

    let body = to_bytes(body, state.config.max_body_bytes).await.map_err(|_| {
        state.metrics.record_rejected();
        AppError::PayloadTooLarge("request body exceeds the configured limit".into())
    })?;

    let admission = gate::charge(&state.sessions, route.spec.api_id(), admission, Utc::now())
        .await
        .map_err(|e| refused(state, &parts.uri, e))?;

    let url = forward_url(route.spec.target(), &route.forward_path, parts.uri.query());
    let upstream = state
        .upstream
        .forward(parts.method, url, end_to_end(&parts.headers), body)
        .await
        .map_err(|e| {
            state.metrics.record_upstream_error();
            tracing::warn!(
                api_id = route.spec.api_id(),
                generation = snapshot.generation(),
                error = %e,
                "upstream request failed"
            );
            AppError::BadGateway(format!("upstream for API {} unavailable", route.spec.api_id()))
        })?;
    state.metrics.record_proxied();

    let mut response = Response::new(Body::from(upstream.body));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = upstream.headers;
    if let Some(charge) = admission.charge.as_ref() {
        for (name, value) in gate::rate_limit_headers(charge) {
            response.headers_mut().insert(name, value);
        }
    }
    Ok(response)
}

/// `uri` with dot segments resolved; the query is kept as is.
fn normalized_uri(uri: &Uri) -> Result<Uri, GatewayError> {
    let path = normalize_request_path(uri.path())?;
    if path == uri.path() {
        return Ok(uri.clone());
    }
    let rebuilt = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path,
    };
    rebuilt.parse().map_err(|_| GatewayError::InvalidPath {
        path: uri.path().to_string(),
    })
}

fn refused(state: &AppState, uri: &Uri, err: GatewayError) -> AppError {
    state.metrics.record_rejected();
    if err.is_server_fault() {
        tracing::warn!(path = %uri.path(), error = %err, "request failed at storage");
    } else {
        tracing::debug!(path = %uri.path(), error = %err, "request refused");
    }
    AppError::from(err)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn forward_url_joins_path_and_query() {
        let target = Url::parse("http://upstream.local").unwrap();
        assert_eq!(
            forward_url(&target, "/v1/anything", Some("a=1")),
            "http://upstream.local/v1/anything?a=1"
        );
        let nested = Url::parse("https://upstream.local/base/").unwrap();
        assert_eq!(
            forward_url(&nested, "/x", None),
            "https://upstream.local/base/x"
        );
        assert_eq!(
            forward_url(&nested, "/x", Some("")),
            "https://upstream.local/base/x"
        );
    }

    #[test]
    fn normalized_uri_keeps_the_query() {
        let uri: Uri = "/v1/x/../admin?a=1".parse().unwrap();
        assert_eq!(normalized_uri(&uri).unwrap(), "/v1/admin?a=1");

        let clean: Uri = "/v1/users?a=1".parse().unwrap();
        assert_eq!(normalized_uri(&clean).unwrap(), clean);

        let escaping: Uri = "/../etc".parse().unwrap();
        assert!(matches!(
            normalized_uri(&escaping),
            Err(GatewayError::InvalidPath { .. })
        ));
    }

    #[test]
    fn hop_by_hop_headers_are_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::HOST, HeaderValue::from_static("gateway.local"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("3"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert("authorization", HeaderValue::from_static("1234"));
        headers.insert("x-custom", HeaderValue::from_static("kept"));

        let out = end_to_end(&headers);
        assert_eq!(out.len(), 2);
        assert_eq!(out["x-custom"], "kept");
        assert_eq!(out["authorization"], "1234");
    }
}
