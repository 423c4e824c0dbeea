use clap::Parser;
use pool_common::{ExtraHost, HostDirectory, PoolConfig};
use std::time::Duration;

/// The full CLI/configuration surface of spec §6, one flag per setting.
/// Secrets (`CONFIGPROXY_AUTH_TOKEN`, `API_AUTH_TOKEN`) and daemon location
/// (`DOCKER_HOST`) are deliberately not here — those come from the
/// environment only, read in `Cli::into_config`.
#[derive(Parser, Debug)]
#[command(
    name = "pool-bin",
    about = "Transient-container pool and router",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Cli {
    /// Seconds between heartbeat (cull + replenish) cycles.
    #[arg(long, default_value_t = 300)]
    pub cull_period: u64,

    /// Seconds a container may sit idle before it is cullable.
    #[arg(long, default_value_t = 600)]
    pub cull_timeout: u64,

    /// Seconds a container may exist before it is cullable regardless of activity.
    #[arg(long, default_value_t = 14400)]
    pub cull_max: u64,

    /// IP the spawned container's notebook server should bind to.
    #[arg(long, default_value = "0.0.0.0")]
    pub container_ip: String,

    /// Port the spawned container's notebook server listens on.
    #[arg(long, default_value_t = 8888)]
    pub container_port: u16,

    /// Issue a per-container token, carried on the redirect query string.
    #[arg(long, default_value_t = false)]
    pub use_tokens: bool,

    /// Container command template: `{base_path}`, `{port}`, `{ip}`, `{token}`.
    #[arg(
        long,
        default_value = "jupyter notebook --no-browser --port={port} --ip={ip} \
                          --NotebookApp.base_url={base_path} --NotebookApp.token={token}"
    )]
    pub command: String,

    /// Public listener port (the `/spawn` and `/api/spawn` surface).
    #[arg(long, default_value_t = 9999)]
    pub port: u16,

    /// Public listener bind address.
    #[arg(long, default_value = "0.0.0.0")]
    pub ip: String,

    /// Admin listener port (`/stats`), separate from the public surface.
    #[arg(long, default_value_t = 10000)]
    pub admin_port: u16,

    /// Admin listener bind address; defaults to loopback-only.
    #[arg(long, default_value = "127.0.0.1")]
    pub admin_ip: String,

    /// Size of the bounded worker pool blocking Docker calls are dispatched onto.
    #[arg(long, default_value_t = 2)]
    pub max_dock_workers: usize,

    /// Per-container memory limit (`512m`, `2g`, or a bare byte count).
    #[arg(long, default_value = "512m")]
    pub mem_limit: String,

    /// Per-container relative CPU shares.
    #[arg(long)]
    pub cpu_shares: Option<i64>,

    /// Per-container CPU quota (microseconds per 100ms period).
    #[arg(long)]
    pub cpu_quota: Option<i64>,

    /// Image to launch for each new container.
    #[arg(long)]
    pub image: String,

    /// Docker API version to negotiate; `auto` probes the daemon.
    #[arg(long, default_value = "auto")]
    pub docker_version: String,

    /// Path appended after a container's base path on redirect, when the
    /// caller didn't request a specific sub-path.
    #[arg(long, default_value = "/tree")]
    pub redirect_uri: String,

    /// Target number of ready containers the pool maintains.
    #[arg(long, default_value_t = 2)]
    pub pool_size: usize,

    /// Identifies this process's containers among others on the same daemon.
    /// Defaults to the sanitized image name.
    #[arg(long)]
    pub pool_name: Option<String>,

    /// Directory of static assets served alongside the dispatcher.
    #[arg(long)]
    pub static_files: Option<String>,

    /// Verify the Docker daemon's TLS hostname against its certificate.
    #[arg(long, default_value_t = false)]
    pub assert_hostname: bool,

    /// User the container process runs as.
    #[arg(long)]
    pub container_user: Option<String>,

    /// Attach spawned containers to the host's network namespace.
    #[arg(long, default_value_t = false)]
    pub host_network: bool,

    /// Docker network to attach spawned containers to, if not host networking.
    #[arg(long)]
    pub docker_network: Option<String>,

    /// Bind mount, `src:dst[:mode]`. May be repeated.
    #[arg(long = "host-directory")]
    pub host_directories: Vec<String>,

    /// Extra `/etc/hosts` entry, `host:ip`. May be repeated.
    #[arg(long = "extra-host")]
    pub extra_hosts: Vec<String>,

    /// Length of the random alphanumeric suffix in each container's path.
    #[arg(long, default_value_t = 12)]
    pub user_length: usize,

    /// `Access-Control-Allow-Origin` value. Unset by default (no CORS headers emitted).
    #[arg(long)]
    pub allow_origin: Option<String>,

    /// `Access-Control-Expose-Headers` value.
    #[arg(long)]
    pub expose_headers: Option<String>,

    /// `Access-Control-Max-Age` value.
    #[arg(long)]
    pub max_age: Option<String>,

    /// `Access-Control-Allow-Credentials` value.
    #[arg(long)]
    pub allow_credentials: Option<String>,

    /// `Access-Control-Allow-Methods` value.
    #[arg(long)]
    pub allow_methods: Option<String>,

    /// `Access-Control-Allow-Headers` value.
    #[arg(long)]
    pub allow_headers: Option<String>,
}

impl Cli {
    /// Merge CLI flags with the environment variables spec §6 names, into
    /// the one typed `PoolConfig` every component is constructed from.
    pub fn into_config(self) -> anyhow::Result<PoolConfig> {
        let proxy_auth_token = std::env::var("CONFIGPROXY_AUTH_TOKEN")
            .map_err(|_| anyhow::anyhow!("CONFIGPROXY_AUTH_TOKEN must be set"))?;
        let proxy_endpoint = std::env::var("CONFIGPROXY_ENDPOINT")
            .unwrap_or_else(|_| "http://127.0.0.1:8001".to_string());
        let api_auth_token = std::env::var("API_AUTH_TOKEN").ok();
        let docker_host = std::env::var("DOCKER_HOST").ok();

        let pool_name = self
            .pool_name
            .unwrap_or_else(|| PoolConfig::sanitize_image_name(&self.image));

        let host_directories = self
            .host_directories
            .iter()
            .map(|spec| {
                PoolConfig::parse_host_directory(spec)
                    .ok_or_else(|| anyhow::anyhow!("invalid --host-directory {spec:?}, expected src:dst[:mode]"))
            })
            .collect::<anyhow::Result<Vec<HostDirectory>>>()?;

        let extra_hosts = self
            .extra_hosts
            .iter()
            .map(|spec| {
                PoolConfig::parse_extra_host(spec)
                    .ok_or_else(|| anyhow::anyhow!("invalid --extra-host {spec:?}, expected host:ip"))
            })
            .collect::<anyhow::Result<Vec<ExtraHost>>>()?;

        Ok(PoolConfig {
            cull_period: Duration::from_secs(self.cull_period),
            cull_timeout: Duration::from_secs(self.cull_timeout),
            cull_max: Duration::from_secs(self.cull_max),
            container_ip: self.container_ip,
            container_port: self.container_port,
            use_tokens: self.use_tokens,
            command: self.command,
            image: self.image,
            docker_version: self.docker_version,
            mem_limit: self.mem_limit,
            cpu_shares: self.cpu_shares,
            cpu_quota: self.cpu_quota,
            container_user: self.container_user,
            host_network: self.host_network,
            docker_network: self.docker_network,
            host_directories,
            extra_hosts,
            assert_hostname: self.assert_hostname,
            pool_size: self.pool_size,
            pool_name,
            user_length: self.user_length,
            max_dock_workers: self.max_dock_workers,
            port: self.port,
            ip: self.ip,
            admin_port: self.admin_port,
            admin_ip: self.admin_ip,
            redirect_uri: self.redirect_uri,
            static_files: self.static_files,
            allow_origin: self.allow_origin,
            expose_headers: self.expose_headers,
            max_age: self.max_age,
            allow_credentials: self.allow_credentials,
            allow_methods: self.allow_methods,
            allow_headers: self.allow_headers,
            api_auth_token,
            proxy_auth_token,
            proxy_endpoint,
            docker_host,
        })
    }
}
