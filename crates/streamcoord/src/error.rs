//! Facade-level error type. Wraps the kernel's query/reply errors with the
//! handful of failure modes that only exist above the deterministic core
//! (config loading, a resize already in flight).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamCoordError {
    #[error(transparent)]
    Coordinator(#[from] streamcoord_kernel::CoordinatorError),

    #[error("configuration error: {0}")]
    Config(#[from] anyhow::Error),

    #[error("a cluster resize is already in flight")]
    ResizeInFlight,
}

pub type Result<T> = std::result::Result<T, StreamCoordError>;
