pub mod error;
pub mod ports;
pub mod pool;

pub use error::EmptyPool;
pub use ports::{DockerPort, ProxyPort};
pub use pool::{PoolStats, SpawnPool};
