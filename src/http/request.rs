//! Incoming stream → [`Context`].
//!
//! # Responsibilities
//! - Map `:method`, `:path` and recognised headers into a [`HeaderSet`]
//! - Accumulate every body frame until end-of-stream
//!
//! # Design Decisions
//! - No size limit at this layer
//! - Bytes are decoded once at end-of-stream, so a UTF-8 sequence split
//!   across frames survives; invalid sequences become U+FFFD

use axum::body::Body;
use axum::http::Request;
use bytes::BytesMut;
use http_body_util::BodyExt;

use crate::context::{Context, HeaderSet, StreamHandle};
use crate::error::{Error, Result};

/// Build a fresh [`Context`] for `request` and read its body to the end.
pub async fn read_context(request: Request<Body>, stream: StreamHandle) -> Result<Context> {
    let (parts, mut body) = request.into_parts();
    let path = parts.uri.path_and_query().map(|pq| pq.as_str());
    let headers = HeaderSet::from_request(parts.method.as_str(), path, &parts.headers);

    let mut ctx = Context::new(headers);
    ctx.request.stream = Some(stream);

    let mut buf = BytesMut::new();
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| Error::Transport(e.to_string()))?;
        if let Ok(data) = frame.into_data() {
            tracing::trace!(len = data.len(), "Body chunk");
            buf.extend_from_slice(&data);
        }
    }
    ctx.request.body = String::from_utf8_lossy(&buf).into_owned();
    Ok(ctx)
}
