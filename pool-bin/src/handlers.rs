use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use pool_core::EmptyPool;
use serde_json::json;
use tracing::warn;

use crate::cors::stamp_cors_headers;
use crate::pages::{loading_page, pool_full_page};
use crate::state::AppState;

/// Builds the path the caller should land on: the container's own base path,
/// plus either the sub-path they asked for or the configured default
/// (`--redirect-uri`), per spec §4.5's acquire formula.
fn target_path(container_path: &str, requested: Option<&str>, default_redirect_uri: &str) -> String {
    let suffix = requested.unwrap_or(default_redirect_uri);
    format!("{}/{}", container_path, suffix.trim_start_matches('/'))
}

/// `GET /spawn` and `GET /spawn/*path`: hand out a container or show the
/// "pool full" page while one becomes available.
pub async fn spawn_handler(
    State(state): State<AppState>,
    path: Option<Path<String>>,
) -> Response {
    match state.pool.acquire().await {
        Ok(record) => {
            let mut location = target_path(&record.path, path.as_deref().map(|p| p.as_str()), &state.config.redirect_uri);
            if !record.token.is_empty() {
                location.push_str("?token=");
                location.push_str(&record.token);
            }
            (StatusCode::FOUND, [(axum::http::header::LOCATION, location)]).into_response()
        }
        Err(EmptyPool) => {
            (StatusCode::OK, Html(pool_full_page(state.config.cull_period.as_secs()))).into_response()
        }
    }
}

/// `POST /api/spawn` and `POST /api/spawn/*path`: the JSON counterpart of
/// `spawn_handler`, token-authenticated when `--api-auth-token`
/// (`API_AUTH_TOKEN`) is configured. Grounded on `base_handler.py`'s
/// `get_current_user`, which checks the same `Authorization: token <...>`
/// scheme before allowing the call through.
pub async fn api_spawn_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    path: Option<Path<String>>,
) -> Response {
    if let Some(expected) = &state.config.api_auth_token {
        let presented = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("token "));
        if presented != Some(expected.as_str()) {
            return (StatusCode::UNAUTHORIZED, Json(json!({"status": 401}))).into_response();
        }
    }

    match state.pool.acquire().await {
        Ok(record) => {
            let mut url = target_path(&record.path, path.as_deref().map(|p| p.as_str()), &state.config.redirect_uri);
            if !record.token.is_empty() {
                url.push_str("?token=");
                url.push_str(&record.token);
            }
            Json(json!({ "url": url })).into_response()
        }
        Err(EmptyPool) => (StatusCode::TOO_MANY_REQUESTS, Json(json!({"status": "full"}))).into_response(),
    }
}

/// `GET /`: the landing page shown while a redirect target warms up.
pub async fn loading_handler() -> Html<String> {
    Html(loading_page())
}

/// Router fallback for any path not matched above. A `GET`/`HEAD` gets the
/// loading page, same as `loading_handler`; an `OPTIONS` preflight against
/// an unregistered path still gets the standard 204 response rather than
/// an HTML body, so a browser's CORS preflight never fails just because it
/// landed on a path this dispatcher doesn't otherwise know about.
pub async fn catch_all(State(state): State<AppState>, method: Method) -> Response {
    if method == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        stamp_cors_headers(&mut response, &state);
        response
    } else {
        Html(loading_page()).into_response()
    }
}

/// `GET /stats` on the admin listener.
pub async fn stats_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.pool.stats().await;
    Json(json!({
        "capacity": stats.capacity,
        "available": stats.available,
        "claimed": stats.claimed,
        "in_flight_births": stats.in_flight_births,
        "pool_name": stats.pool_name,
    }))
}

/// Fallback for unmatched admin-listener paths.
pub async fn not_found() -> Response {
    warn!("admin listener hit with no matching route");
    (StatusCode::NOT_FOUND, Json(json!({"status": 404}))).into_response()
}
