use std::time::Duration;

/// One bind-mount spec parsed from `src:dst[:mode]`.
#[derive(Debug, Clone)]
pub struct HostDirectory {
    pub src: String,
    pub dst: String,
    pub mode: Option<String>,
}

/// One `host:ip` extra-hosts entry.
#[derive(Debug, Clone)]
pub struct ExtraHost {
    pub host: String,
    pub ip: String,
}

/// The complete, typed configuration for one pool process. Built once (in
/// `pool-bin`) and passed by value into every component's constructor —
/// never a process-wide mutable settings dictionary.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    // --- culling ---
    pub cull_period: Duration,
    pub cull_timeout: Duration,
    pub cull_max: Duration,

    // --- container shape ---
    pub container_ip: String,
    pub container_port: u16,
    pub use_tokens: bool,
    /// Command template: `{base_path}`, `{port}`, `{ip}`, `{token}`.
    pub command: String,
    pub image: String,
    pub docker_version: String,
    pub mem_limit: String,
    pub cpu_shares: Option<i64>,
    pub cpu_quota: Option<i64>,
    pub container_user: Option<String>,
    pub host_network: bool,
    pub docker_network: Option<String>,
    pub host_directories: Vec<HostDirectory>,
    pub extra_hosts: Vec<ExtraHost>,
    pub assert_hostname: bool,

    // --- pool shape ---
    pub pool_size: usize,
    pub pool_name: String,
    pub user_length: usize,
    pub max_dock_workers: usize,

    // --- front end ---
    pub port: u16,
    pub ip: String,
    pub admin_port: u16,
    pub admin_ip: String,
    pub redirect_uri: String,
    pub static_files: Option<String>,

    // --- CORS (all unset by default) ---
    pub allow_origin: Option<String>,
    pub expose_headers: Option<String>,
    pub max_age: Option<String>,
    pub allow_credentials: Option<String>,
    pub allow_methods: Option<String>,
    pub allow_headers: Option<String>,

    // --- secrets / endpoints, from environment ---
    pub api_auth_token: Option<String>,
    pub proxy_auth_token: String,
    pub proxy_endpoint: String,
    pub docker_host: Option<String>,
}

impl PoolConfig {
    /// `pool_name` defaults to the image name with everything but
    /// alphanumerics replaced by `-`, lowercased.
    pub fn sanitize_image_name(image: &str) -> String {
        image
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect()
    }

    pub fn parse_host_directory(spec: &str) -> Option<HostDirectory> {
        let mut parts = spec.splitn(3, ':');
        let src = parts.next()?.to_string();
        let dst = parts.next()?.to_string();
        let mode = parts.next().map(|m| m.to_string());
        Some(HostDirectory { src, dst, mode })
    }

    pub fn parse_extra_host(spec: &str) -> Option<ExtraHost> {
        let (host, ip) = spec.split_once(':')?;
        Some(ExtraHost { host: host.to_string(), ip: ip.to_string() })
    }

    /// Regex source matching this pool's container names: `pool_name` as a
    /// literal substring, used both to tag new containers and to discover
    /// siblings in `cleanout()`.
    pub fn name_pattern(&self) -> String {
        regex::escape(&self.pool_name)
    }
}
