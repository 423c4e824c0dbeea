mod cli;
mod cors;
mod handlers;
mod pages;
mod state;


use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use pool_core::SpawnPool;
use pool_docker::DockerGateway;
use pool_proxy::ProxyGateway;
use state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = cli::Cli::parse();
    let config = cli.into_config().context("invalid configuration")?;

    info!(
        pool_name = %config.pool_name,
        pool_size = config.pool_size,
        image = %config.image,
        "starting transient-container pool"
    );

    let docker = Arc::new(
        DockerGateway::connect(config.docker_host.as_deref(), &config.docker_version)
            .await
            .context("failed to connect to Docker daemon")?,
    );
    let proxy = Arc::new(ProxyGateway::new(
        config.proxy_endpoint.clone(),
        config.proxy_auth_token.clone(),
    ));

    let public_addr: SocketAddr = format!("{}:{}", config.ip, config.port)
        .parse()
        .context("invalid --ip/--port")?;
    let admin_addr: SocketAddr = format!("{}:{}", config.admin_ip, config.admin_port)
        .parse()
        .context("invalid --admin-ip/--admin-port")?;
    let cull_period = config.cull_period;

    let pool = SpawnPool::new(config.clone(), docker, proxy);

    info!("reconciling with any containers surviving a previous run");
    pool.cleanout().await;

    let heartbeat_pool = pool.clone();
    let heartbeat_task = tokio::spawn(async move {
        heartbeat_loop(heartbeat_pool, cull_period).await;
    });

    let state = AppState::new(config, pool.clone());

    let public_listener = tokio::net::TcpListener::bind(public_addr)
        .await
        .context("binding public listener")?;
    let admin_listener = tokio::net::TcpListener::bind(admin_addr)
        .await
        .context("binding admin listener")?;

    info!(%public_addr, "public dispatcher listening");
    info!(%admin_addr, "admin listener listening");

    let public_server = axum::serve(public_listener, build_public_router(state.clone()))
        .with_graceful_shutdown(shutdown_signal());
    let admin_server = axum::serve(admin_listener, build_admin_router(state))
        .with_graceful_shutdown(shutdown_signal());

    let (public_res, admin_res) = tokio::join!(public_server, admin_server);
    if let Err(e) = public_res {
        error!(error = %e, "public listener exited with error");
    }
    if let Err(e) = admin_res {
        error!(error = %e, "admin listener exited with error");
    }

    heartbeat_task.abort();
    info!("draining in-flight births before final reconcile");
    pool.drain_in_flight_births(Duration::from_secs(30)).await;
    // Wipe-only, not `cleanout()`: replenishing here would spawn a fresh
    // batch of births the exiting process could never manage.
    pool.wipe_surviving_containers().await;

    info!("shutdown complete");
    Ok(())
}

/// Runs heartbeat on a loop, re-arming the sleep only once the previous
/// cycle has fully completed (observe → cull → replenish), per spec §5 —
/// never a fixed wall-clock tick that could overlap a slow cycle.
async fn heartbeat_loop(pool: Arc<SpawnPool>, period: Duration) {
    loop {
        tokio::select! {
            _ = shutdown_signal() => {
                info!("heartbeat loop stopping on shutdown signal");
                return;
            }
            _ = tokio::time::sleep(period) => {
                pool.heartbeat().await;
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

fn build_public_router(state: AppState) -> Router {
    let mut router = Router::new();
    if let Some(dir) = &state.config.static_files {
        router = router.nest_service("/static", tower_http::services::ServeDir::new(dir));
    }
    router
        .route(
            "/",
            get(handlers::loading_handler).options(cors::cors_preflight),
        )
        .route(
            "/spawn",
            get(handlers::spawn_handler).options(cors::cors_preflight),
        )
        .route(
            "/spawn/*path",
            get(handlers::spawn_handler).options(cors::cors_preflight),
        )
        .route(
            "/api/spawn",
            post(handlers::api_spawn_handler).options(cors::cors_preflight),
        )
        .route(
            "/api/spawn/*path",
            post(handlers::api_spawn_handler).options(cors::cors_preflight),
        )
        .fallback(handlers::catch_all)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            cors::inject_cors_headers,
        ))
        .with_state(state)
}

fn build_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/stats", get(handlers::stats_handler))
        .fallback(handlers::not_found)
        .with_state(state)
}
