use crate::error::EmptyPool;
use crate::ports::{DockerPort, ProxyPort};
use chrono::Utc;
use pool_common::naming::{random_alnum, random_token_hex, render_command};
use pool_common::{ContainerRecord, PoolConfig, PoolError};
use pool_docker::{parse_mem_limit, CreateSpec, MountSpec};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tracing::{info, instrument, warn};

/// Every Docker/proxy call at every step of a birth or cull gets one retry,
/// per spec §4.1's default.
const RETRIES: u32 = 1;

/// Path-suffix collisions are vanishingly unlikely at the default
/// `user_length`; this bounds the retry loop so a misbehaving proxy can't
/// spin a birth task forever.
const MAX_SUFFIX_ATTEMPTS: u32 = 5;

#[derive(Default)]
struct PoolInner {
    available: VecDeque<ContainerRecord>,
    /// Claimed containers, keyed by path, so the heartbeat can still observe
    /// and cull them after `acquire()` hands them out.
    claimed: HashMap<String, ContainerRecord>,
    in_flight_paths: HashSet<String>,
    in_flight_births: usize,
}

#[derive(Debug, Clone)]
pub struct PoolStats {
    pub capacity: usize,
    pub available: usize,
    pub claimed: usize,
    pub in_flight_births: usize,
    pub pool_name: String,
}

enum BirthStepError {
    /// The proxy rejected registration because the path is already taken;
    /// retry birth with a fresh suffix rather than surfacing a failure.
    PathConflict,
    Fatal(PoolError),
}

/// The spawn pool (C4): keeps `available ≈ capacity`, serves `acquire()`,
/// and runs the observe → cull → replenish heartbeat.
pub struct SpawnPool {
    docker: Arc<dyn DockerPort>,
    proxy: Arc<dyn ProxyPort>,
    config: PoolConfig,
    inner: Mutex<PoolInner>,
    /// Bounds concurrent Docker calls to `max_dock_workers`, standing in for
    /// the bounded worker pool of spec §4.1/§5 — bollard's client is
    /// natively async so there is no thread pool to size, but the daemon
    /// itself should not see unbounded concurrent requests.
    dock_workers: Semaphore,
}

impl SpawnPool {
    pub fn new(config: PoolConfig, docker: Arc<dyn DockerPort>, proxy: Arc<dyn ProxyPort>) -> Arc<Self> {
        let dock_workers = Semaphore::new(config.max_dock_workers.max(1));
        Arc::new(Self {
            docker,
            proxy,
            config,
            inner: Mutex::new(PoolInner::default()),
            dock_workers,
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Acquire one slot of the Docker worker budget. Held only across the
    /// single call it guards — proxy calls are not gated by this, since the
    /// proxy endpoint is a separate, stateless HTTP service (§5).
    async fn docker_permit(&self) -> tokio::sync::SemaphorePermit<'_> {
        self.dock_workers.acquire().await.expect("dock_workers semaphore is never closed")
    }

    pub async fn stats(&self) -> PoolStats {
        let inner = self.inner.lock().await;
        PoolStats {
            capacity: self.config.pool_size,
            available: inner.available.len(),
            claimed: inner.claimed.len(),
            in_flight_births: inner.in_flight_births,
            pool_name: self.config.pool_name.clone(),
        }
    }

    /// Removes and returns the head of `available`. Atomic with respect to
    /// concurrent callers; never waits. Schedules background replenishment
    /// regardless of outcome — on success to backfill the slot just taken,
    /// and the caller never sees that work.
    pub async fn acquire(self: &Arc<Self>) -> Result<ContainerRecord, EmptyPool> {
        let popped = {
            let mut inner = self.inner.lock().await;
            inner.available.pop_front()
        };

        match popped {
            Some(record) => {
                {
                    let mut inner = self.inner.lock().await;
                    inner.claimed.insert(record.path.clone(), record.clone());
                }
                let pool = self.clone();
                tokio::spawn(async move {
                    pool.spawn_replenish().await;
                });
                Ok(record)
            }
            None => Err(EmptyPool),
        }
    }

    /// Computes the deficit and reserves it against `in_flight_births` in
    /// the same critical section, so two concurrent callers (a heartbeat's
    /// replenish phase racing an `acquire()`'s background replenish) can
    /// never both read the same deficit and together overshoot `capacity`.
    async fn reserve_deficit(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let have = inner.available.len() + inner.in_flight_births;
        let deficit = self.config.pool_size.saturating_sub(have);
        inner.in_flight_births += deficit;
        deficit
    }

    async fn spawn_replenish(self: &Arc<Self>) {
        let deficit = self.reserve_deficit().await;
        for _ in 0..deficit {
            let pool = self.clone();
            tokio::spawn(async move {
                if let Err(e) = pool.birth().await {
                    warn!(error = %e, "birth failed, next heartbeat will retry");
                }
            });
        }
    }

    /// Periodic observe → cull → replenish cycle. Phases run strictly in
    /// order; the caller (a `tokio::time::interval` loop, or a test) is
    /// responsible for not invoking `heartbeat()` concurrently with itself.
    #[instrument(skip(self))]
    pub async fn heartbeat(self: &Arc<Self>) {
        if !self.observe().await {
            return;
        }
        self.cull().await;
        self.spawn_replenish().await;
    }

    /// Returns `false` if the proxy was unreachable, in which case the
    /// caller should skip cull/replenish this tick rather than act on stale
    /// activity data.
    async fn observe(&self) -> bool {
        let routes = match self.proxy.list_routes().await {
            Ok(routes) => routes,
            Err(e) => {
                warn!(error = %e, "proxy unreachable during heartbeat observe phase");
                return false;
            }
        };

        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        for record in inner.available.iter_mut().chain(inner.claimed.values_mut()) {
            let Some(info) = routes.get(&record.path) else { continue };
            record.last_activity = match info.last_activity {
                Some(reported) => {
                    let elapsed = (Utc::now() - reported).to_std().unwrap_or_default();
                    now.checked_sub(elapsed).unwrap_or(now)
                }
                // Never observed: treat as fresh so a brand-new, unclaimed
                // container isn't culled before anyone gets to it.
                None => now,
            };
        }
        true
    }

    async fn cull(&self) {
        let now = Instant::now();
        let max_idle = self.config.cull_timeout;
        let max_age = self.config.cull_max;

        let cullable: Vec<ContainerRecord> = {
            let mut inner = self.inner.lock().await;
            let mut out = Vec::new();

            let mut keep = VecDeque::new();
            while let Some(record) = inner.available.pop_front() {
                if record.is_cullable(now, max_idle, max_age) {
                    out.push(record);
                } else {
                    keep.push_back(record);
                }
            }
            inner.available = keep;

            let cullable_paths: Vec<String> = inner
                .claimed
                .iter()
                .filter(|(_, r)| r.is_cullable(now, max_idle, max_age))
                .map(|(p, _)| p.clone())
                .collect();
            for path in cullable_paths {
                if let Some(record) = inner.claimed.remove(&path) {
                    out.push(record);
                }
            }

            out
        };

        for record in cullable {
            self.cull_one(record).await;
        }
    }

    /// Best-effort: proxy unregister, then daemon stop, then daemon remove.
    /// Each step proceeds even if an earlier one failed, so a stale proxy
    /// route never pins a dead container and vice versa.
    async fn cull_one(&self, record: ContainerRecord) {
        if let Err(e) = self.proxy.unregister(&record.path).await {
            warn!(path = %record.path, error = %e, "unregister failed during cull, continuing");
        }
        {
            let _permit = self.docker_permit().await;
            if let Err(e) = self.docker.stop(&record.id, RETRIES).await {
                warn!(id = %record.id, error = %e, "stop failed during cull, continuing");
            }
        }
        {
            let _permit = self.docker_permit().await;
            if let Err(e) = self.docker.remove(&record.id, RETRIES).await {
                warn!(id = %record.id, error = %e, "remove failed during cull");
            }
        }
        info!(path = %record.path, id = %record.id, "culled container");
    }

    /// Startup reconciliation: wipe (`wipe_surviving_containers`), then run
    /// one heartbeat to populate `available` from scratch. Only appropriate
    /// when the pool is about to keep running — at shutdown, use
    /// `wipe_surviving_containers` directly so the process doesn't spawn a
    /// fresh batch of births it will never manage on its way out.
    #[instrument(skip(self))]
    pub async fn cleanout(self: &Arc<Self>) {
        self.wipe_surviving_containers().await;
        self.heartbeat().await;
    }

    /// Wipe every surviving pool-named container and any route under the
    /// pool's path prefix, with no replenishment afterward. A previous
    /// process's container cannot be safely re-attached because its token
    /// was never persisted. Used both by `cleanout()` at startup (followed
    /// by a heartbeat there) and directly at shutdown, where replenishing
    /// would only launch containers the exiting process can no longer
    /// manage.
    #[instrument(skip(self))]
    pub async fn wipe_surviving_containers(&self) {
        let pattern = self.config.name_pattern();
        let listed = {
            let _permit = self.docker_permit().await;
            self.docker.list(true, &pattern, RETRIES).await
        };
        match listed {
            Ok(containers) => {
                for c in containers {
                    let _permit = self.docker_permit().await;
                    if let Err(e) = self.docker.stop(&c.id, RETRIES).await {
                        warn!(id = %c.id, error = %e, "cleanout: stop failed");
                    }
                    if let Err(e) = self.docker.remove(&c.id, RETRIES).await {
                        warn!(id = %c.id, error = %e, "cleanout: remove failed");
                    }
                }
            }
            Err(e) => warn!(error = %e, "cleanout: docker list failed"),
        }

        match self.proxy.list_routes().await {
            Ok(routes) => {
                let prefix = format!("/{}/", self.config.pool_name);
                for path in routes.keys().filter(|p| p.starts_with(&prefix)) {
                    if let Err(e) = self.proxy.unregister(path).await {
                        warn!(%path, error = %e, "cleanout: unregister failed");
                    }
                }
            }
            Err(e) => warn!(error = %e, "cleanout: proxy list_routes failed"),
        }

        {
            let mut inner = self.inner.lock().await;
            *inner = PoolInner::default();
        }
    }

    /// Create → start → register → (probe) → enqueue one container,
    /// retrying with a fresh path suffix if the proxy reports a path
    /// conflict. On any other failure the partial container is unwound
    /// (stop+remove, unregister) and the slot is freed for the next
    /// heartbeat's replenish pass.
    ///
    /// The caller (`spawn_replenish`) has already reserved one slot of
    /// `in_flight_births` for this call before spawning it; that single
    /// reservation is released exactly once here, on every exit path,
    /// regardless of how many suffixes this attempt burns through. Births
    /// are never double-counted against the deficit that was computed
    /// atomically with the reservation.
    async fn birth(self: Arc<Self>) -> Result<(), PoolError> {
        let result = self.birth_retrying().await;
        let mut inner = self.inner.lock().await;
        inner.in_flight_births = inner.in_flight_births.saturating_sub(1);
        result
    }

    async fn birth_retrying(self: &Arc<Self>) -> Result<(), PoolError> {
        for _ in 0..MAX_SUFFIX_ATTEMPTS {
            let suffix = random_alnum(self.config.user_length);
            let path = format!("/{}/{}", self.config.pool_name, suffix);

            {
                let mut inner = self.inner.lock().await;
                if inner.available.iter().any(|r| r.path == path)
                    || inner.claimed.contains_key(&path)
                    || inner.in_flight_paths.contains(&path)
                {
                    continue;
                }
                inner.in_flight_paths.insert(path.clone());
            }

            let result = self.birth_one(&path, &suffix).await;

            {
                let mut inner = self.inner.lock().await;
                inner.in_flight_paths.remove(&path);
            }

            match result {
                Ok(record) => {
                    let mut inner = self.inner.lock().await;
                    inner.available.push_back(record);
                    return Ok(());
                }
                Err(BirthStepError::PathConflict) => continue,
                Err(BirthStepError::Fatal(e)) => return Err(e),
            }
        }

        Err(PoolError::PathCollision(format!(
            "exhausted {MAX_SUFFIX_ATTEMPTS} suffix attempts for pool {}",
            self.config.pool_name
        )))
    }

    async fn birth_one(&self, path: &str, suffix: &str) -> Result<ContainerRecord, BirthStepError> {
        let token = if self.config.use_tokens { random_token_hex() } else { String::new() };
        let name = format!("{}-{}", self.config.pool_name, suffix);
        let command = render_command(
            &self.config.command,
            path,
            self.config.container_port,
            &self.config.container_ip,
            &token,
        );

        let mounts: Vec<MountSpec> = self
            .config
            .host_directories
            .iter()
            .map(|h| MountSpec {
                src: h.src.clone(),
                dst: h.dst.clone(),
                read_only: h.mode.as_deref() == Some("ro"),
            })
            .collect();
        let extra_hosts: Vec<String> =
            self.config.extra_hosts.iter().map(|h| format!("{}:{}", h.host, h.ip)).collect();

        let spec = CreateSpec {
            name,
            image: self.config.image.clone(),
            command: vec!["/bin/sh".to_string(), "-c".to_string(), command],
            env: Vec::new(),
            container_port: self.config.container_port,
            mem_limit_bytes: parse_mem_limit(&self.config.mem_limit),
            cpu_shares: self.config.cpu_shares,
            cpu_quota: self.config.cpu_quota,
            mounts,
            network: self.config.docker_network.clone(),
            host_network: self.config.host_network,
            extra_hosts,
            container_user: self.config.container_user.clone(),
        };

        let id = {
            let _permit = self.docker_permit().await;
            self.docker.create(&spec, RETRIES).await.map_err(BirthStepError::Fatal)?
        };

        {
            let _permit = self.docker_permit().await;
            if let Err(e) = self.docker.start(&id, RETRIES).await {
                let _ = self.docker.remove(&id, RETRIES).await;
                return Err(BirthStepError::Fatal(e));
            }
        }

        let (host, port) = {
            let _permit = self.docker_permit().await;
            match self.docker.host_port(&id, self.config.container_port, RETRIES).await {
                Ok(hp) => hp,
                Err(e) => {
                    let _ = self.docker.stop(&id, RETRIES).await;
                    let _ = self.docker.remove(&id, RETRIES).await;
                    return Err(BirthStepError::Fatal(e));
                }
            }
        };

        let upstream = format!("http://{host}:{port}");
        if let Err(e) = self.proxy.register(path, &upstream, &id).await {
            let _permit = self.docker_permit().await;
            let _ = self.docker.stop(&id, RETRIES).await;
            let _ = self.docker.remove(&id, RETRIES).await;
            return Err(match &e {
                PoolError::Proxy { status, .. } if *status == 409 => BirthStepError::PathConflict,
                _ => BirthStepError::Fatal(e),
            });
        }

        self.probe_ready(&host, port).await;

        let now = Instant::now();
        Ok(ContainerRecord {
            id,
            path: path.to_string(),
            host,
            port,
            token,
            created_at: now,
            last_activity: now,
        })
    }

    /// Wait for in-flight births to finish, bounded by `timeout`. Called on
    /// shutdown (§5 "Cancellation") so `wipe_surviving_containers()` doesn't
    /// race a birth that is still registering its route.
    pub async fn drain_in_flight_births(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        loop {
            if self.inner.lock().await.in_flight_births == 0 {
                return;
            }
            if Instant::now() >= deadline {
                warn!("timed out waiting for in-flight births to drain");
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Best-effort readiness probe: a short connect+GET loop bounded by a
    /// timeout. The container is committed to `available` regardless of the
    /// outcome — the proxy will 5xx until the upstream warms up.
    async fn probe_ready(&self, host: &str, port: u16) {
        let url = format!("http://{host}:{port}/");
        let client = reqwest::Client::new();
        let deadline = Instant::now() + Duration::from_secs(10);

        while Instant::now() < deadline {
            if client.get(&url).timeout(Duration::from_millis(500)).send().await.is_ok() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pool_common::{ExtraHost, HostDirectory};
    use pool_docker::ContainerDescriptor;
    use pool_proxy::RouteInfo;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeDockerState {
        next_id: u32,
        containers: HashMap<String, Vec<String>>,
    }

    /// An in-process stand-in for the daemon (C1), so the pool's state
    /// machine and concurrency discipline can be exercised with no real
    /// Docker socket — grounded in the teacher's `SandboxExecutor` seam.
    #[derive(Default)]
    struct FakeDocker {
        state: StdMutex<FakeDockerState>,
        fail_start_for: StdMutex<HashSet<String>>,
    }

    impl FakeDocker {
        fn fail_start(&self, name: &str) {
            self.fail_start_for.lock().unwrap().insert(name.to_string());
        }
    }

    #[async_trait]
    impl DockerPort for FakeDocker {
        async fn create(&self, spec: &CreateSpec, _retries: u32) -> pool_common::Result<String> {
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let id = format!("c{}", state.next_id);
            state.containers.insert(id.clone(), vec![format!("/{}", spec.name)]);
            Ok(id)
        }

        async fn start(&self, id: &str, _retries: u32) -> pool_common::Result<()> {
            let names = self.state.lock().unwrap().containers.get(id).cloned().unwrap_or_default();
            let blocked = self.fail_start_for.lock().unwrap();
            let should_fail = names
                .iter()
                .any(|n| blocked.iter().any(|prefix| n.trim_start_matches('/').starts_with(prefix.as_str())));
            if should_fail {
                return Err(PoolError::Docker("start failed (test)".to_string()));
            }
            Ok(())
        }

        async fn stop(&self, _id: &str, _retries: u32) -> pool_common::Result<()> {
            Ok(())
        }

        async fn remove(&self, id: &str, _retries: u32) -> pool_common::Result<()> {
            self.state.lock().unwrap().containers.remove(id);
            Ok(())
        }

        async fn list(
            &self,
            _all: bool,
            name_filter: &str,
            _retries: u32,
        ) -> pool_common::Result<Vec<ContainerDescriptor>> {
            let re = regex::Regex::new(name_filter).unwrap();
            let state = self.state.lock().unwrap();
            Ok(state
                .containers
                .iter()
                .filter(|(_, names)| names.iter().any(|n| re.is_match(n.trim_start_matches('/'))))
                .map(|(id, names)| ContainerDescriptor { id: id.clone(), names: names.clone() })
                .collect())
        }

        async fn host_port(&self, id: &str, _container_port: u16, _retries: u32) -> pool_common::Result<(String, u16)> {
            if !self.state.lock().unwrap().containers.contains_key(id) {
                return Err(PoolError::Docker("no such container".to_string()));
            }
            Ok(("127.0.0.1".to_string(), 10000))
        }
    }

    #[derive(Default)]
    struct FakeProxy {
        routes: StdMutex<HashMap<String, RouteInfo>>,
        reject_all: std::sync::atomic::AtomicBool,
    }

    impl FakeProxy {
        fn set_last_activity(&self, path: &str, reported: Option<chrono::DateTime<Utc>>) {
            if let Some(info) = self.routes.lock().unwrap().get_mut(path) {
                info.last_activity = reported;
            }
        }
    }

    #[async_trait]
    impl ProxyPort for FakeProxy {
        async fn register(&self, path: &str, _upstream_url: &str, container_id: &str) -> pool_common::Result<()> {
            if self.reject_all.load(Ordering::SeqCst) {
                return Err(PoolError::Proxy { status: 500, body: "rejected (test)".to_string() });
            }
            self.routes.lock().unwrap().insert(
                path.to_string(),
                RouteInfo { container_id: Some(container_id.to_string()), last_activity: None },
            );
            Ok(())
        }

        async fn unregister(&self, path: &str) -> pool_common::Result<()> {
            self.routes.lock().unwrap().remove(path);
            Ok(())
        }

        async fn list_routes(&self) -> pool_common::Result<HashMap<String, RouteInfo>> {
            Ok(self.routes.lock().unwrap().clone())
        }
    }

    fn test_config(pool_size: usize) -> PoolConfig {
        PoolConfig {
            cull_period: Duration::from_secs(300),
            cull_timeout: Duration::from_secs(600),
            cull_max: Duration::from_secs(14400),
            container_ip: "0.0.0.0".to_string(),
            container_port: 8888,
            use_tokens: false,
            command: "run --base={base_path} --port={port} --ip={ip} --token={token}".to_string(),
            image: "jupyter/demo".to_string(),
            docker_version: "auto".to_string(),
            mem_limit: "512m".to_string(),
            cpu_shares: None,
            cpu_quota: None,
            container_user: None,
            host_network: false,
            docker_network: None,
            host_directories: Vec::<HostDirectory>::new(),
            extra_hosts: Vec::<ExtraHost>::new(),
            assert_hostname: false,
            pool_size,
            pool_name: "pool".to_string(),
            user_length: 12,
            max_dock_workers: 2,
            port: 9999,
            ip: "0.0.0.0".to_string(),
            admin_port: 10000,
            admin_ip: "127.0.0.1".to_string(),
            redirect_uri: "/tree".to_string(),
            static_files: None,
            allow_origin: None,
            expose_headers: None,
            max_age: None,
            allow_credentials: None,
            allow_methods: None,
            allow_headers: None,
            api_auth_token: None,
            proxy_auth_token: "proxytoken".to_string(),
            proxy_endpoint: "http://127.0.0.1:8001".to_string(),
            docker_host: None,
        }
    }

    fn new_pool(pool_size: usize) -> (Arc<SpawnPool>, Arc<FakeDocker>, Arc<FakeProxy>) {
        let docker = Arc::new(FakeDocker::default());
        let proxy = Arc::new(FakeProxy::default());
        let pool = SpawnPool::new(test_config(pool_size), docker.clone(), proxy.clone());
        (pool, docker, proxy)
    }

    /// S1 — cold start, capacity 2: after the first heartbeat two containers
    /// exist with distinct pool-named paths and routes.
    #[tokio::test]
    async fn cold_start_fills_available_to_capacity() {
        let (pool, _docker, proxy) = new_pool(2);
        pool.heartbeat().await;

        let stats = pool.stats().await;
        assert_eq!(stats.available, 2);
        assert_eq!(stats.in_flight_births, 0);

        let routes = proxy.routes.lock().unwrap();
        assert_eq!(routes.len(), 2);
        for path in routes.keys() {
            assert!(path.starts_with("/pool/"));
        }
    }

    /// S2 — single acquire: FIFO head is handed out, pool size drops by one,
    /// and a background replenish brings it back to capacity.
    #[tokio::test]
    async fn acquire_pops_fifo_head_and_replenishes() {
        let (pool, _docker, _proxy) = new_pool(2);
        pool.heartbeat().await;

        let first = pool.stats().await;
        assert_eq!(first.available, 2);

        let acquired = pool.acquire().await.expect("should have an available container");
        assert!(acquired.path.starts_with("/pool/"));

        let mid = pool.stats().await;
        assert_eq!(mid.available, 1);
        assert_eq!(mid.claimed, 1);

        // Let the background replenishment spawned by acquire() complete.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let after = pool.stats().await;
        assert_eq!(after.available, 2);
    }

    /// Boundary: capacity 0 never serves a container and heartbeat is a no-op.
    #[tokio::test]
    async fn zero_capacity_always_empty() {
        let (pool, _docker, proxy) = new_pool(0);
        pool.heartbeat().await;
        assert!(matches!(pool.acquire().await, Err(EmptyPool)));
        assert_eq!(proxy.routes.lock().unwrap().len(), 0);
    }

    /// Boundary: pool_size 1, two concurrent acquires — exactly one sees
    /// EmptyPool.
    #[tokio::test]
    async fn concurrent_acquire_hands_out_disjoint_containers() {
        let (pool, _docker, _proxy) = new_pool(1);
        pool.heartbeat().await;
        assert_eq!(pool.stats().await.available, 1);

        let a = pool.clone();
        let b = pool.clone();
        let (r1, r2) = tokio::join!(async move { a.acquire().await }, async move { b.acquire().await });

        let empties = [&r1, &r2].iter().filter(|r| r.is_err()).count();
        let oks = [&r1, &r2].iter().filter(|r| r.is_ok()).count();
        assert_eq!(empties, 1);
        assert_eq!(oks, 1);
    }

    /// Birth failure at the register step (step 6): the partial container is
    /// unwound (no leak on the daemon side), `available` stays at zero, and
    /// a later heartbeat (once the proxy recovers) creates a replacement.
    #[tokio::test]
    async fn birth_failure_at_register_is_unwound_and_retried() {
        let (pool, docker, proxy) = new_pool(1);

        proxy.reject_all.store(true, Ordering::SeqCst);
        pool.heartbeat().await;

        let stats = pool.stats().await;
        assert_eq!(stats.available, 0);
        assert_eq!(stats.in_flight_births, 0);
        assert!(docker.state.lock().unwrap().containers.is_empty(), "failed birth must not leak a container");

        proxy.reject_all.store(false, Ordering::SeqCst);
        pool.heartbeat().await;
        assert_eq!(pool.stats().await.available, 1);
    }

    /// Birth failure at the start step (step 5): the created-but-unstarted
    /// container is removed and the birth fails cleanly, leaving no trace on
    /// the daemon.
    #[tokio::test]
    async fn birth_failure_at_start_is_unwound() {
        let (pool, docker, _proxy) = new_pool(1);
        // The suffix is random, so block every container name under this
        // pool (matched by prefix in `FakeDocker::start`) rather than one
        // concrete name.
        docker.fail_start(&format!("{}-", pool.config().pool_name));

        pool.heartbeat().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Births keep retrying with fresh suffixes, none of which start
        // successfully, so nothing should remain available or leaked.
        assert_eq!(pool.stats().await.available, 0);
    }

    /// Idle cull (S5): a claimed container whose proxy-reported activity is
    /// older than `cull_timeout` is removed at the next heartbeat — proxy
    /// unregister then daemon stop+remove — and the replenish phase restores
    /// `available`.
    #[tokio::test]
    async fn idle_claimed_container_is_culled_and_replaced() {
        let docker = Arc::new(FakeDocker::default());
        let proxy = Arc::new(FakeProxy::default());
        let mut cfg = test_config(1);
        cfg.cull_timeout = Duration::from_millis(1);
        let pool = SpawnPool::new(cfg, docker.clone(), proxy.clone());

        pool.heartbeat().await;
        let record = pool.acquire().await.expect("one container available");
        assert_eq!(pool.stats().await.claimed, 1);

        proxy.set_last_activity(&record.path, Some(Utc::now() - chrono::Duration::seconds(2)));
        tokio::time::sleep(Duration::from_millis(5)).await;

        pool.heartbeat().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let after = pool.stats().await;
        assert_eq!(after.claimed, 0, "idle claimed container should have been culled");
        assert_eq!(after.available, 1, "replenish should restore the slot freed by culling");
        assert!(!proxy.routes.lock().unwrap().contains_key(&record.path));
    }

    /// `cleanout()` idempotence (property 5): running it twice leaves the
    /// daemon's pool-named containers exactly matching what the following
    /// heartbeat populates into `available`.
    #[tokio::test]
    async fn cleanout_is_idempotent() {
        let (pool, docker, _proxy) = new_pool(2);
        pool.cleanout().await;
        let after_first = docker.state.lock().unwrap().containers.len();

        pool.cleanout().await;
        let after_second = docker.state.lock().unwrap().containers.len();

        assert_eq!(after_first, after_second);
        assert_eq!(pool.stats().await.available, 2);
    }

    /// A `Names: null`-style entry (empty name list) is ignored rather than
    /// crashing `cleanout`.
    #[tokio::test]
    async fn list_ignores_entries_with_no_matching_name() {
        let (pool, docker, _proxy) = new_pool(0);
        docker.state.lock().unwrap().containers.insert("orphan".to_string(), vec![]);
        pool.cleanout().await;
        assert_eq!(pool.stats().await.available, 0);
    }
}
