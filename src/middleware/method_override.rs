use axum::http::{Method, Request};
use tracing::debug;

/// Query key holding the overriding method, e.g. `POST /authors/3?_method=DELETE`.
pub const METHOD_OVERRIDE_KEY: &str = "_method";

/// HTML forms can only `GET` or `POST`. A `POST` carrying `?_method=PUT`,
/// `PATCH` or `DELETE` is rewritten to that method before routing.
pub fn method_override<B>(mut req: Request<B>) -> Request<B> {
    if req.method() != Method::POST {
        return req;
    }
    let Some(query) = req.uri().query() else {
        return req;
    };

    let requested = url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == METHOD_OVERRIDE_KEY)
        .map(|(_, v)| v.trim().to_ascii_uppercase());
    let method = match requested.as_deref() {
        Some("PUT") => Method::PUT,
        Some("PATCH") => Method::PATCH,
        Some("DELETE") => Method::DELETE,
        _ => return req,
    };

    debug!(path = %req.uri().path(), method = %method, "method overridden");
    *req.method_mut() = method;
    req
}
