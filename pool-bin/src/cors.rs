use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

/// Conditionally stamps every response with the configured CORS headers,
/// mirroring `base_handler.py`'s `prepare()`: a header is emitted only when
/// the matching `--allow-*`/`--cors-*` flag was set, never a blanket `*`.
pub async fn inject_cors_headers(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let mut response = next.run(req).await;
    stamp_cors_headers(&mut response, &state);
    response
}

pub fn stamp_cors_headers(response: &mut Response, state: &AppState) {
    let headers = response.headers_mut();
    set(headers, "access-control-allow-origin", &state.config.allow_origin);
    set(headers, "access-control-expose-headers", &state.config.expose_headers);
    set(headers, "access-control-max-age", &state.config.max_age);
    set(headers, "access-control-allow-credentials", &state.config.allow_credentials);
    set(headers, "access-control-allow-methods", &state.config.allow_methods);
    set(headers, "access-control-allow-headers", &state.config.allow_headers);
}

fn set(headers: &mut axum::http::HeaderMap, name: &'static str, value: &Option<String>) {
    let Some(value) = value else { return };
    let Ok(value) = HeaderValue::from_str(value) else {
        return;
    };
    headers.insert(HeaderName::from_static(name), value);
}

/// Preflight `OPTIONS` responder: 204, no body, same conditional CORS
/// headers as every other response. Grounded on `base_handler.py`'s
/// `options()`, which answers every preflight the same way regardless of
/// path.
pub async fn cors_preflight(State(state): State<AppState>) -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    stamp_cors_headers(&mut response, &state);
    response
}
