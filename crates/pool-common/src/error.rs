use thiserror::Error;

/// Errors that can surface from the Docker and proxy gateways, and from
/// configuration parsing. Infrastructure errors never reach an HTTP caller
/// directly; the pool absorbs them per spec (`heartbeat` logs and continues,
/// `acquire` only ever returns `EmptyPool`).
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("docker error: {0}")]
    Docker(String),

    #[error("proxy error ({status}): {body}")]
    Proxy { status: u16, body: String },

    #[error("proxy unreachable: {0}")]
    ProxyUnreachable(String),

    #[error("path collision: {0}")]
    PathCollision(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PoolError>;
