//! Gzip response compression with a per-request opt-out.
//!
//! The compression predicate only sees the response, so a small middleware
//! inside the compression layer copies the request's `x-no-compression`
//! header onto the response as an extension marker.

use axum::body::HttpBody;
use axum::extract::Request;
use axum::http::{HeaderName, Response};
use axum::middleware::Next;
use tower_http::CompressionLevel;
use tower_http::compression::{
    CompressionLayer, Predicate,
    predicate::{NotForContentType, SizeAbove},
};

/// Responses smaller than this many bytes are sent as-is.
pub const MIN_COMPRESS_SIZE: u16 = 10_000;
/// Gzip effort on the 1-9 scale.
pub const COMPRESSION_LEVEL: i32 = 6;
pub const NO_COMPRESSION_HEADER: HeaderName = HeaderName::from_static("x-no-compression");

/// Response marker: the client asked for an uncompressed body.
#[derive(Debug, Clone, Copy)]
pub struct CompressionOptOut;

pub async fn mark_opt_out(req: Request, next: Next) -> axum::response::Response {
    // An empty value does not count as opting out.
    let opt_out = req
        .headers()
        .get(&NO_COMPRESSION_HEADER)
        .is_some_and(|v| !v.is_empty());
    let mut res = next.run(req).await;
    if opt_out {
        res.extensions_mut().insert(CompressionOptOut);
    }
    res
}

/// Skips responses tagged with [`CompressionOptOut`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RespectOptOut;

impl Predicate for RespectOptOut {
    fn should_compress<B>(&self, response: &Response<B>) -> bool
    where
        B: HttpBody,
    {
        response.extensions().get::<CompressionOptOut>().is_none()
    }
}

/// The library's default exclusions (gRPC, images, event streams) with the
/// size threshold raised to [`MIN_COMPRESS_SIZE`], gated by the opt-out.
pub fn compression_predicate() -> impl Predicate + Clone {
    RespectOptOut
        .and(NotForContentType::GRPC)
        .and(NotForContentType::IMAGES)
        .and(NotForContentType::SSE)
        .and(SizeAbove::new(MIN_COMPRESS_SIZE))
}

pub fn compression_layer() -> CompressionLayer<impl Predicate + Clone> {
    CompressionLayer::new()
        .gzip(true)
        .quality(CompressionLevel::Precise(COMPRESSION_LEVEL))
        .compress_when(compression_predicate())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn response(len: usize, content_type: &str) -> Response<Body> {
        Response::builder()
            .header("content-type", content_type)
            .body(Body::from("x".repeat(len)))
            .unwrap()
    }

    #[test]
    fn threshold_is_ten_thousand_bytes() {
        let p = compression_predicate();
        assert!(!p.should_compress(&response(9_999, "text/html")));
        assert!(p.should_compress(&response(10_000, "text/html")));
    }

    #[test]
    fn opt_out_marker_disables_compression() {
        let p = compression_predicate();
        let mut res = response(50_000, "text/html");
        res.extensions_mut().insert(CompressionOptOut);
        assert!(!p.should_compress(&res));
    }

    #[test]
    fn images_are_left_alone() {
        let p = compression_predicate();
        assert!(!p.should_compress(&response(50_000, "image/png")));
    }
}
