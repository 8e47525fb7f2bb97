//! Per-call unit of work threaded through middleware and procedures.
//!
//! # Data Flow
//! ```text
//! :method/:path + headers → HeaderSet ─┐
//! body frames → RequestContext.body ───┴→ Context
//!     → middleware chain (in order) → procedure
//!     → ResponseContext → response headers + terminal body
//! ```

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use serde::{Deserialize, Serialize};

/// Response content type used when nothing else is set.
pub const DEFAULT_CONTENT_TYPE: &str = "plain/text";

/// Body returned for unknown routing keys.
pub const NOT_FOUND_BODY: &str = "Procedure not found!";

/// The recognised request/response header keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HeaderSet {
    pub method: Option<String>,
    pub path: String,
    pub status: Option<u16>,
    pub content_type: Option<String>,
    pub authorization: Option<String>,
    pub content_encoding: Option<String>,
    pub content_length: Option<String>,
    pub date: Option<String>,
    pub referer: Option<String>,
    pub accept: Option<String>,
    #[serde(rename = "access-control-allow-credentials")]
    pub credentials_allowed: Option<bool>,
}

fn text(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

impl HeaderSet {
    /// Build from an incoming request's method, path and header map.
    ///
    /// A missing or empty path becomes `/`.
    pub fn from_request(method: &str, path: Option<&str>, headers: &HeaderMap) -> Self {
        let path = match path {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => "/".to_string(),
        };
        Self {
            method: Some(method.to_string()),
            path,
            ..Self::from_map(headers)
        }
    }

    /// Build from a response's status and header map.
    pub fn from_response(status: StatusCode, headers: &HeaderMap) -> Self {
        Self {
            status: Some(status.as_u16()),
            ..Self::from_map(headers)
        }
    }

    fn from_map(headers: &HeaderMap) -> Self {
        Self {
            method: None,
            path: "/".to_string(),
            status: None,
            content_type: text(headers, header::CONTENT_TYPE),
            authorization: text(headers, header::AUTHORIZATION),
            content_encoding: text(headers, header::CONTENT_ENCODING),
            content_length: text(headers, header::CONTENT_LENGTH),
            date: text(headers, header::DATE),
            referer: text(headers, header::REFERER),
            accept: text(headers, header::ACCEPT),
            credentials_allowed: text(headers, header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
                .and_then(|v| v.parse().ok()),
        }
    }

    /// Ordinary (non-pseudo) headers as a wire header map.
    ///
    /// Values that are not valid header text are skipped. `content-length`
    /// is left to the transport since the written body may be re-encoded.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        let pairs = [
            (header::CONTENT_TYPE, &self.content_type),
            (header::AUTHORIZATION, &self.authorization),
            (header::CONTENT_ENCODING, &self.content_encoding),
            (header::DATE, &self.date),
            (header::REFERER, &self.referer),
            (header::ACCEPT, &self.accept),
        ];
        for (name, value) in pairs {
            if let Some(v) = value.as_deref().and_then(|v| HeaderValue::from_str(v).ok()) {
                map.insert(name, v);
            }
        }
        if let Some(allowed) = self.credentials_allowed {
            map.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static(if allowed { "true" } else { "false" }),
            );
        }
        map
    }

    /// Whether the caller negotiated a gzip+base64 response body.
    pub fn accepts_gzip(&self) -> bool {
        self.accept.as_deref() == Some("gzip")
    }
}

/// Request half of a [`Context`].
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub headers: HeaderSet,
    /// Accumulated body text.
    pub body: String,
    /// Id of the transport stream carrying this call, when there is one.
    pub stream: Option<StreamHandle>,
}

/// Response half of a [`Context`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseContext {
    pub headers: HeaderSet,
    pub body: String,
}

impl Default for ResponseContext {
    fn default() -> Self {
        Self {
            headers: HeaderSet {
                path: "/".to_string(),
                status: Some(StatusCode::OK.as_u16()),
                content_type: Some(DEFAULT_CONTENT_TYPE.to_string()),
                ..HeaderSet::default()
            },
            body: String::new(),
        }
    }
}

/// Non-owning reference to the transport stream a call arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle {
    /// Connection the stream belongs to.
    pub connection: u64,
    /// Per-process unique call id.
    pub call: uuid::Uuid,
}

/// The mutable request/response pair for one call.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub request: RequestContext,
    pub response: ResponseContext,
}

impl Context {
    /// Fresh context for an incoming call, with default response fields.
    pub fn new(headers: HeaderSet) -> Self {
        Self {
            request: RequestContext {
                headers,
                ..RequestContext::default()
            },
            response: ResponseContext::default(),
        }
    }

    /// Routing key for this call: the request path without any query component.
    pub fn routing_key(&self) -> &str {
        routing_key(&self.request.headers.path)
    }
}

/// Strip the query component from a request path.
pub fn routing_key(path: &str) -> &str {
    match path.find('?') {
        Some(idx) => &path[..idx],
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_defaults() {
        let ctx = Context::default();
        assert_eq!(ctx.response.headers.status, Some(200));
        assert_eq!(ctx.response.headers.content_type.as_deref(), Some("plain/text"));
        assert_eq!(ctx.response.headers.path, "/");
        assert!(ctx.response.body.is_empty());
    }

    #[test]
    fn request_headers_parsed() {
        let mut map = HeaderMap::new();
        map.insert(header::ACCEPT, HeaderValue::from_static("gzip"));
        map.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer t"));
        map.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );

        let set = HeaderSet::from_request("POST", Some("/echo"), &map);
        assert_eq!(set.method.as_deref(), Some("POST"));
        assert_eq!(set.path, "/echo");
        assert!(set.accepts_gzip());
        assert_eq!(set.authorization.as_deref(), Some("Bearer t"));
        assert_eq!(set.credentials_allowed, Some(true));
    }

    #[test]
    fn empty_path_defaults_to_root() {
        let set = HeaderSet::from_request("GET", Some(""), &HeaderMap::new());
        assert_eq!(set.path, "/");
        let set = HeaderSet::from_request("GET", None, &HeaderMap::new());
        assert_eq!(set.path, "/");
    }

    #[test]
    fn routing_key_strips_query() {
        assert_eq!(routing_key("/hi?x=1"), "/hi");
        assert_eq!(routing_key("/hi"), "/hi");
        assert_eq!(routing_key("/"), "/");
    }

    #[test]
    fn header_map_skips_unset() {
        let set = ResponseContext::default().headers;
        let map = set.to_header_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(header::CONTENT_TYPE).unwrap(), "plain/text");
    }
}
