use thiserror::Error;

/// The only error `acquire()` ever raises. The two-variant
/// `Acquired(record) | Empty` redesign from spec §9 is expressed here as
/// `Result<ContainerRecord, EmptyPool>` rather than an exception.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("no container currently available")]
pub struct EmptyPool;
