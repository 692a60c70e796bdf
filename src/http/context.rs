//! Framework-neutral request and response surfaces.
//!
//! The security checks only ever see a [`RequestContext`] and write into a
//! [`ResponseMutation`]; translating to and from axum types happens here.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use axum::{
    body::{Body, Bytes},
    extract::ConnectInfo,
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::http::error::GuardError;
use crate::http::request::X_REQUEST_ID;

/// Everything the security layer needs to know about an inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub cookies: HashMap<String, String>,
    /// Raw body bytes. Empty when built from request parts only.
    pub body: Bytes,
    pub client_ip: Option<IpAddr>,
    pub request_id: String,
}

impl RequestContext {
    /// Build a body-less context from request parts.
    pub fn from_parts(parts: &Parts, trust_forwarded_for: bool) -> Self {
        let client_ip = resolve_client_ip(parts, trust_forwarded_for);
        let request_id = parts
            .headers
            .get(&X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers.clone(),
            cookies: parse_cookies(&parts.headers),
            body: Bytes::new(),
            client_ip,
            request_id,
        }
    }

    /// Build a context including the raw body, read up to `max_body_bytes`.
    pub async fn from_request(
        request: Request<Body>,
        max_body_bytes: usize,
        trust_forwarded_for: bool,
    ) -> Result<Self, GuardError> {
        let (parts, body) = request.into_parts();
        let mut ctx = Self::from_parts(&parts, trust_forwarded_for);
        ctx.read_body(body, max_body_bytes).await?;
        Ok(ctx)
    }

    /// Buffer `body` into the context. Fails with `PayloadTooLarge` past the ceiling.
    pub async fn read_body(&mut self, body: Body, max_body_bytes: usize) -> Result<(), GuardError> {
        let declared = self
            .header(header::CONTENT_LENGTH.as_str())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > max_body_bytes) {
            return Err(GuardError::PayloadTooLarge { limit: max_body_bytes });
        }

        match axum::body::to_bytes(body, max_body_bytes).await {
            Ok(bytes) => {
                self.body = bytes;
                Ok(())
            }
            Err(e) => {
                tracing::debug!(request_id = %self.request_id, error = %e, "Failed to read request body");
                Err(GuardError::PayloadTooLarge { limit: max_body_bytes })
            }
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn host(&self) -> Option<&str> {
        self.header(header::HOST.as_str())
    }

    /// Identity component for rate-limit keys.
    pub fn client_key(&self) -> String {
        self.client_ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

fn resolve_client_ip(parts: &Parts, trust_forwarded_for: bool) -> Option<IpAddr> {
    if trust_forwarded_for {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok());
        if forwarded.is_some() {
            return forwarded;
        }
    }

    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Parse every `Cookie` header into a name → value map. First occurrence wins.
pub fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for value in headers.get_all(header::COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        for pair in raw.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                cookies
                    .entry(name.to_string())
                    .or_insert_with(|| value.trim().trim_matches('"').to_string());
            }
        }
    }
    cookies
}

#[derive(Debug, Clone)]
enum HeaderOp {
    Set,
    Append,
}

/// Header, status and body changes the security layer wants on a response.
#[derive(Debug, Clone, Default)]
pub struct ResponseMutation {
    pub status: Option<StatusCode>,
    headers: Vec<(HeaderName, HeaderValue, HeaderOp)>,
    pub body: Option<serde_json::Value>,
}

impl ResponseMutation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Replace any existing value for `name`.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.retain(|(existing, _, _)| *existing != name);
        self.headers.push((name, value, HeaderOp::Set));
    }

    /// Add a value without replacing existing ones (e.g. `Set-Cookie`).
    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.push((name, value, HeaderOp::Append));
    }

    /// Last value recorded for `name`.
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers
            .iter()
            .rev()
            .find(|(existing, _, _)| existing.as_str().eq_ignore_ascii_case(name))
            .map(|(_, value, _)| value)
    }

    pub fn headers(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.headers.iter().map(|(name, value, _)| (name, value))
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.headers.is_empty() && self.body.is_none()
    }

    /// Apply status and headers to an existing response. The body is left alone.
    pub fn apply(&self, response: &mut Response) {
        if let Some(status) = self.status {
            *response.status_mut() = status;
        }
        let headers = response.headers_mut();
        for (name, value, op) in &self.headers {
            match op {
                HeaderOp::Set => {
                    headers.insert(name.clone(), value.clone());
                }
                HeaderOp::Append => {
                    headers.append(name.clone(), value.clone());
                }
            }
        }
    }
}

impl IntoResponse for ResponseMutation {
    fn into_response(self) -> Response {
        let mut response = match &self.body {
            Some(body) => Json(body.clone()).into_response(),
            None => Response::new(Body::empty()),
        };
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        self.apply(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts_for(request: Request<Body>) -> Parts {
        request.into_parts().0
    }

    #[test]
    fn test_parse_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; csrf_token=abc123;  session=\"xyz\""),
        );
        headers.append(header::COOKIE, HeaderValue::from_static("csrf_token=ignored"));

        let cookies = parse_cookies(&headers);
        assert_eq!(cookies.get("theme").unwrap(), "dark");
        assert_eq!(cookies.get("csrf_token").unwrap(), "abc123");
        assert_eq!(cookies.get("session").unwrap(), "xyz");
    }

    #[test]
    fn test_parse_cookies_skips_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("novalue; =orphan; ok=1"));
        let cookies = parse_cookies(&headers);
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies.get("ok").unwrap(), "1");
    }

    #[test]
    fn test_from_parts_extracts_fields() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/contact?ref=home")
            .header("host", "example.com")
            .header("x-request-id", "req-1")
            .header("cookie", "csrf_token=t1")
            .body(Body::empty())
            .unwrap();

        let ctx = RequestContext::from_parts(&parts_for(request), false);
        assert_eq!(ctx.method, Method::POST);
        assert_eq!(ctx.path, "/api/contact");
        assert_eq!(ctx.query.as_deref(), Some("ref=home"));
        assert_eq!(ctx.host(), Some("example.com"));
        assert_eq!(ctx.request_id, "req-1");
        assert_eq!(ctx.cookie("csrf_token"), Some("t1"));
        assert!(ctx.client_ip.is_none());
        assert_eq!(ctx.client_key(), "unknown");
    }

    #[test]
    fn test_forwarded_for_only_when_trusted() {
        let build = || {
            let mut request = Request::builder()
                .uri("/")
                .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
                .body(Body::empty())
                .unwrap();
            request
                .extensions_mut()
                .insert(ConnectInfo("127.0.0.1:4000".parse::<SocketAddr>().unwrap()));
            parts_for(request)
        };

        let trusted = RequestContext::from_parts(&build(), true);
        assert_eq!(trusted.client_key(), "203.0.113.9");

        let untrusted = RequestContext::from_parts(&build(), false);
        assert_eq!(untrusted.client_key(), "127.0.0.1");
    }

    #[tokio::test]
    async fn test_from_request_reads_body() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/webhooks/payments")
            .body(Body::from("{\"a\":1}"))
            .unwrap();
        let ctx = RequestContext::from_request(request, 1024, false).await.unwrap();
        assert_eq!(&ctx.body[..], b"{\"a\":1}");
    }

    #[tokio::test]
    async fn test_from_request_rejects_oversized_body() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/contact")
            .body(Body::from(vec![b'x'; 2048]))
            .unwrap();
        let err = RequestContext::from_request(request, 1024, false).await.unwrap_err();
        assert!(matches!(err, GuardError::PayloadTooLarge { limit: 1024 }));
    }

    #[test]
    fn test_mutation_set_replaces_and_append_accumulates() {
        let mut mutation = ResponseMutation::new();
        mutation.set_header(HeaderName::from_static("x-a"), HeaderValue::from_static("1"));
        mutation.set_header(HeaderName::from_static("x-a"), HeaderValue::from_static("2"));
        mutation.append_header(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        mutation.append_header(header::SET_COOKIE, HeaderValue::from_static("b=2"));

        let mut response = Response::new(Body::empty());
        mutation.apply(&mut response);
        assert_eq!(response.headers().get("x-a").unwrap(), "2");
        assert_eq!(response.headers().get_all(header::SET_COOKIE).iter().count(), 2);
    }

    #[test]
    fn test_mutation_into_response_defaults_to_ok() {
        let mut mutation = ResponseMutation::new();
        mutation.body = Some(serde_json::json!({ "ok": true }));
        let response = mutation.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }
}
