use crate::retry::with_retry;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::models::{HostConfig, Mount, MountTypeEnum, PortBinding};
use bollard::Docker;
use pool_common::PoolError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub type Result<T> = std::result::Result<T, PoolError>;

/// One bind mount: host source, container destination, and whether it is
/// mounted read-only.
#[derive(Debug, Clone)]
pub struct MountSpec {
    pub src: String,
    pub dst: String,
    pub read_only: bool,
}

/// Everything needed to create one pooled container. Resource and network
/// fields mirror the CLI/configuration surface in spec §6.
#[derive(Debug, Clone)]
pub struct CreateSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub env: Vec<String>,
    pub container_port: u16,
    pub mem_limit_bytes: Option<i64>,
    pub cpu_shares: Option<i64>,
    pub cpu_quota: Option<i64>,
    pub mounts: Vec<MountSpec>,
    pub network: Option<String>,
    pub host_network: bool,
    pub extra_hosts: Vec<String>,
    pub container_user: Option<String>,
}

/// A container as reported by `list`, before it is known to be ours.
#[derive(Debug, Clone)]
pub struct ContainerDescriptor {
    pub id: String,
    pub names: Vec<String>,
}

/// Asynchronous wrapper over the Docker daemon (C1 in the design). Every
/// call accepts its own retry budget; the gateway itself holds no retry
/// policy. bollard's client is natively async and cheaply `Clone`, so no
/// additional worker pool indirection is needed here beyond what bollard's
/// hyper client already provides — the bounded "max_dock_workers" budget
/// from configuration caps concurrent in-flight births via a semaphore one
/// layer up, in `pool-core`.
#[derive(Clone)]
pub struct DockerGateway {
    docker: Arc<Docker>,
}

impl DockerGateway {
    pub fn new(docker: Arc<Docker>) -> Self {
        Self { docker }
    }

    /// Connect using the standard daemon endpoint resolution
    /// (`DOCKER_HOST` or the local unix socket), negotiating the API
    /// version when `version == "auto"`.
    pub async fn connect(docker_host: Option<&str>, version: &str) -> Result<Self> {
        let docker = match docker_host {
            Some(host) => Docker::connect_with_http(host, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| PoolError::Docker(e.to_string()))?,
            None => {
                Docker::connect_with_local_defaults().map_err(|e| PoolError::Docker(e.to_string()))?
            }
        };
        let docker = if version == "auto" {
            docker
                .negotiate_version()
                .await
                .map_err(|e| PoolError::Docker(e.to_string()))?
        } else {
            docker
        };
        Ok(Self { docker: Arc::new(docker) })
    }

    #[instrument(skip(self, spec), fields(name = %spec.name, image = %spec.image))]
    pub async fn create(&self, spec: &CreateSpec, retries: u32) -> Result<String> {
        let port_key = format!("{}/tcp", spec.container_port);

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(port_key.clone(), HashMap::new());

        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            port_key,
            Some(vec![PortBinding { host_ip: Some("0.0.0.0".to_string()), host_port: None }]),
        );

        let mounts: Vec<Mount> = spec
            .mounts
            .iter()
            .map(|m| Mount {
                source: Some(m.src.clone()),
                target: Some(m.dst.clone()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect();

        let network_mode = if spec.host_network {
            Some("host".to_string())
        } else {
            spec.network.clone()
        };

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            mounts: Some(mounts),
            memory: spec.mem_limit_bytes,
            cpu_shares: spec.cpu_shares,
            cpu_quota: spec.cpu_quota,
            network_mode,
            extra_hosts: if spec.extra_hosts.is_empty() { None } else { Some(spec.extra_hosts.clone()) },
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            env: Some(spec.env.clone()),
            user: spec.container_user.clone(),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions { name: spec.name.clone(), platform: None };

        let result = with_retry(retries, || {
            self.docker.create_container(Some(options.clone()), config.clone())
        })
        .await
        .map_err(docker_err)?;

        for w in result.warnings {
            warn!(warning = %w, "docker reported a creation warning");
        }

        debug!(id = %result.id, "container created");
        Ok(result.id)
    }

    #[instrument(skip(self))]
    pub async fn start(&self, id: &str, retries: u32) -> Result<()> {
        with_retry(retries, || self.docker.start_container::<String>(id, None))
            .await
            .map_err(docker_err)
    }

    #[instrument(skip(self))]
    pub async fn stop(&self, id: &str, retries: u32) -> Result<()> {
        let options = Some(StopContainerOptions { t: 5 });
        with_retry(retries, || self.docker.stop_container(id, options.clone()))
            .await
            .map_err(docker_err)
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, id: &str, retries: u32) -> Result<()> {
        let options = Some(RemoveContainerOptions { force: true, v: true, ..Default::default() });
        with_retry(retries, || self.docker.remove_container(id, options.clone()))
            .await
            .map_err(docker_err)
    }

    /// `list(all=true, name_filter)`. `name_filter` is a regex matched
    /// against the container's name (daemon-side name filters are
    /// substring/regex depending on anchoring; we additionally re-check
    /// client-side since the daemon's `name` filter semantics vary by
    /// version). A `Names: null` entry is skipped, never treated as a
    /// crash — the daemon does emit this for anonymous/orphaned entries.
    #[instrument(skip(self))]
    pub async fn list(&self, all: bool, name_filter: &str, retries: u32) -> Result<Vec<ContainerDescriptor>> {
        let re = regex::Regex::new(name_filter).map_err(|e| PoolError::Config(e.to_string()))?;

        let options = Some(ListContainersOptions::<String> { all, ..Default::default() });
        let containers = with_retry(retries, || self.docker.list_containers(options.clone()))
            .await
            .map_err(docker_err)?;

        let mut out = Vec::new();
        for c in containers {
            let Some(id) = c.id else { continue };
            let names: Vec<String> = c.names.unwrap_or_default();
            if names.iter().any(|n| re.is_match(n.trim_start_matches('/'))) {
                out.push(ContainerDescriptor { id, names });
            }
        }
        Ok(out)
    }

    /// Read back the daemon-assigned host address/port for `container_port`,
    /// after `start` — the preferred port-allocation strategy (§4.4 step 3,
    /// variant (a)): more robust across host reboots than a pool-assigned
    /// counter.
    #[instrument(skip(self))]
    pub async fn host_port(&self, id: &str, container_port: u16, retries: u32) -> Result<(String, u16)> {
        let inspect = with_retry(retries, || self.docker.inspect_container(id, None))
            .await
            .map_err(docker_err)?;

        let key = format!("{}/tcp", container_port);
        let bindings = inspect
            .network_settings
            .and_then(|ns| ns.ports)
            .and_then(|ports| ports.get(&key).cloned())
            .flatten()
            .ok_or_else(|| PoolError::Docker(format!("no port binding for {key} on {id}")))?;

        let binding = bindings
            .into_iter()
            .next()
            .ok_or_else(|| PoolError::Docker(format!("empty port binding list for {key} on {id}")))?;

        let host_port: u16 = binding
            .host_port
            .ok_or_else(|| PoolError::Docker("host port missing from binding".to_string()))?
            .parse()
            .map_err(|_| PoolError::Docker("host port was not numeric".to_string()))?;

        let host_ip = match binding.host_ip {
            Some(ip) if !ip.is_empty() && ip != "0.0.0.0" => ip,
            _ => "127.0.0.1".to_string(),
        };

        Ok((host_ip, host_port))
    }

    #[instrument(skip(self))]
    pub async fn copy(&self, id: &str, path: &str, retries: u32) -> Result<Vec<u8>> {
        use bollard::container::DownloadFromContainerOptions;
        use futures::StreamExt;

        let options = Some(DownloadFromContainerOptions { path: path.to_string() });
        let attempt = || async {
            let mut stream = self.docker.download_from_container(id, options.clone());
            let mut bytes = Vec::new();
            while let Some(chunk) = stream.next().await {
                bytes.extend_from_slice(&chunk?);
            }
            Ok::<_, BollardError>(bytes)
        };
        with_retry(retries, attempt).await.map_err(docker_err)
    }
}

fn docker_err(e: BollardError) -> PoolError {
    PoolError::Docker(e.to_string())
}
