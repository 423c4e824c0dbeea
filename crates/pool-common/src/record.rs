use std::time::{Duration, Instant};

/// One pooled container. Immutable after creation except `last_activity`,
/// which the heartbeat's observe phase updates from proxy activity reports.
#[derive(Debug, Clone)]
pub struct ContainerRecord {
    /// Daemon-assigned container id.
    pub id: String,
    /// User-facing URL prefix, unique within the pool: `/<pool_name>/<suffix>`.
    pub path: String,
    pub host: String,
    pub port: u16,
    /// Empty when token-auth is disabled.
    pub token: String,
    pub created_at: Instant,
    pub last_activity: Instant,
}

impl ContainerRecord {
    pub fn upstream_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// A container is cullable once it has been idle past `max_idle` or has
    /// simply existed past `max_age`, whichever comes first.
    pub fn is_cullable(&self, now: Instant, max_idle: Duration, max_age: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) >= max_idle
            || now.saturating_duration_since(self.created_at) >= max_age
    }
}
