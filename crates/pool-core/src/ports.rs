use async_trait::async_trait;
use pool_common::Result;
use pool_docker::{ContainerDescriptor, CreateSpec, DockerGateway};
use pool_proxy::{ProxyGateway, RouteInfo};
use std::collections::HashMap;

/// The Docker Gateway contract (C1) as seen by the pool. A trait, not a
/// concrete type, so the pool's concurrency and state-machine logic can be
/// exercised in tests against an in-process fake with no real daemon.
#[async_trait]
pub trait DockerPort: Send + Sync {
    async fn create(&self, spec: &CreateSpec, retries: u32) -> Result<String>;
    async fn start(&self, id: &str, retries: u32) -> Result<()>;
    async fn stop(&self, id: &str, retries: u32) -> Result<()>;
    async fn remove(&self, id: &str, retries: u32) -> Result<()>;
    async fn list(&self, all: bool, name_filter: &str, retries: u32) -> Result<Vec<ContainerDescriptor>>;
    async fn host_port(&self, id: &str, container_port: u16, retries: u32) -> Result<(String, u16)>;
}

#[async_trait]
impl DockerPort for DockerGateway {
    async fn create(&self, spec: &CreateSpec, retries: u32) -> Result<String> {
        DockerGateway::create(self, spec, retries).await
    }
    async fn start(&self, id: &str, retries: u32) -> Result<()> {
        DockerGateway::start(self, id, retries).await
    }
    async fn stop(&self, id: &str, retries: u32) -> Result<()> {
        DockerGateway::stop(self, id, retries).await
    }
    async fn remove(&self, id: &str, retries: u32) -> Result<()> {
        DockerGateway::remove(self, id, retries).await
    }
    async fn list(&self, all: bool, name_filter: &str, retries: u32) -> Result<Vec<ContainerDescriptor>> {
        DockerGateway::list(self, all, name_filter, retries).await
    }
    async fn host_port(&self, id: &str, container_port: u16, retries: u32) -> Result<(String, u16)> {
        DockerGateway::host_port(self, id, container_port, retries).await
    }
}

/// The Proxy Gateway contract (C2) as seen by the pool.
#[async_trait]
pub trait ProxyPort: Send + Sync {
    async fn register(&self, path: &str, upstream_url: &str, container_id: &str) -> Result<()>;
    async fn unregister(&self, path: &str) -> Result<()>;
    async fn list_routes(&self) -> Result<HashMap<String, RouteInfo>>;
}

#[async_trait]
impl ProxyPort for ProxyGateway {
    async fn register(&self, path: &str, upstream_url: &str, container_id: &str) -> Result<()> {
        ProxyGateway::register(self, path, upstream_url, container_id).await
    }
    async fn unregister(&self, path: &str) -> Result<()> {
        ProxyGateway::unregister(self, path).await
    }
    async fn list_routes(&self) -> Result<HashMap<String, RouteInfo>> {
        ProxyGateway::list_routes(self).await
    }
}
