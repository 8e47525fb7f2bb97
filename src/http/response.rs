//! [`Context`] → response headers + terminal body.
//!
//! # Responsibilities
//! - Status from `response.headers.status` (200 when unset or invalid)
//! - Recognised response headers copied onto the wire
//! - gzip+base64 body when the *request* carried `accept: gzip`

use axum::body::Body;
use axum::http::{Response, StatusCode};

use crate::compression;
use crate::context::Context;
use crate::error::Result;

/// Compose the reply for a finished call.
pub fn compose(ctx: &Context) -> Result<Response<Body>> {
    let status = ctx
        .response
        .headers
        .status
        .and_then(|s| StatusCode::from_u16(s).ok())
        .unwrap_or(StatusCode::OK);

    let payload = if ctx.request.headers.accepts_gzip() {
        compression::compress(&ctx.response.body)?
    } else {
        ctx.response.body.clone()
    };

    let mut response = Response::new(Body::from(payload));
    *response.status_mut() = status;
    *response.headers_mut() = ctx.response.headers.to_header_map();
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_text(response: Response<Body>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn plain_body_and_defaults() {
        let mut ctx = Context::default();
        ctx.response.body = "Hi!".into();

        let response = compose(&ctx).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "plain/text");
        assert_eq!(body_text(response).await, "Hi!");
    }

    #[tokio::test]
    async fn gzip_when_request_accepts_it() {
        let mut ctx = Context::default();
        ctx.request.headers.accept = Some("gzip".into());
        ctx.response.body = "Hi".into();

        let response = compose(&ctx).unwrap();
        let text = body_text(response).await;
        assert_eq!(compression::decompress(&text).unwrap(), "Hi");
    }

    #[tokio::test]
    async fn custom_status_kept() {
        let mut ctx = Context::default();
        ctx.response.headers.status = Some(418);
        let response = compose(&ctx).unwrap();
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    }
}
