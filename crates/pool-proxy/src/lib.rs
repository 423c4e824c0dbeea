use chrono::{DateTime, Utc};
use pool_common::PoolError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub type Result<T> = std::result::Result<T, PoolError>;

/// One entry from `GET {endpoint}/api/routes`.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteInfo {
    pub container_id: Option<String>,
    /// Absent when the route has never been observed carrying traffic.
    /// Callers should treat that as "fresh" rather than culling a
    /// brand-new, never-claimed container (spec §4.2).
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct RegisterBody<'a> {
    target: &'a str,
    container_id: &'a str,
}

/// Client of the external routing proxy (C2 in the design). Holds no
/// per-path state of its own — register/unregister of different paths are
/// independent concurrent operations from the proxy's perspective.
#[derive(Clone)]
pub struct ProxyGateway {
    client: reqwest::Client,
    endpoint: String,
    auth_token: String,
}

impl ProxyGateway {
    pub fn new(endpoint: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
            endpoint: endpoint.into(),
            auth_token: auth_token.into(),
        }
    }

    fn route_url(&self, path: &str) -> String {
        format!("{}/api/routes{}", self.endpoint.trim_end_matches('/'), path)
    }

    #[instrument(skip(self))]
    pub async fn register(&self, path: &str, upstream_url: &str, container_id: &str) -> Result<()> {
        let body = RegisterBody { target: upstream_url, container_id };
        let resp = self
            .client
            .post(self.route_url(path))
            .header("Authorization", format!("token {}", self.auth_token))
            .json(&body)
            .send()
            .await
            .map_err(|e| PoolError::ProxyUnreachable(e.to_string()))?;

        if resp.status().is_success() {
            debug!(%path, "route registered");
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(PoolError::Proxy { status, body })
        }
    }

    /// Idempotent: a 404 (already absent) counts as success.
    #[instrument(skip(self))]
    pub async fn unregister(&self, path: &str) -> Result<()> {
        let resp = self
            .client
            .delete(self.route_url(path))
            .header("Authorization", format!("token {}", self.auth_token))
            .send()
            .await
            .map_err(|e| PoolError::ProxyUnreachable(e.to_string()))?;

        if resp.status().is_success() || resp.status().as_u16() == 404 {
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            warn!(%path, status, "unregister failed, continuing per best-effort cull policy");
            Err(PoolError::Proxy { status, body })
        }
    }

    #[instrument(skip(self))]
    pub async fn list_routes(&self) -> Result<HashMap<String, RouteInfo>> {
        let resp = self
            .client
            .get(format!("{}/api/routes", self.endpoint.trim_end_matches('/')))
            .header("Authorization", format!("token {}", self.auth_token))
            .send()
            .await
            .map_err(|e| PoolError::ProxyUnreachable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(PoolError::Proxy { status, body });
        }

        resp.json::<HashMap<String, RouteInfo>>()
            .await
            .map_err(|e| PoolError::ProxyUnreachable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_url_joins_cleanly() {
        let gw = ProxyGateway::new("http://127.0.0.1:8001", "tok");
        assert_eq!(gw.route_url("/pool/abc123"), "http://127.0.0.1:8001/api/routes/pool/abc123");
    }

    #[test]
    fn route_url_strips_trailing_slash_on_endpoint() {
        let gw = ProxyGateway::new("http://127.0.0.1:8001/", "tok");
        assert_eq!(gw.route_url("/pool/abc123"), "http://127.0.0.1:8001/api/routes/pool/abc123");
    }
}
