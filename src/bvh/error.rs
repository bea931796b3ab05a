use std::collections::TryReserveError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Failed to allocate BVH storage: {0}")]
    Allocation(#[from] TryReserveError),

    #[error("Too many triangles: {count}, at most {max} are supported")]
    TooManyTriangles { count: usize, max: usize },

    #[error("Invalid build settings: {0}")]
    InvalidSettings(&'static str),

    #[error("Failed to start build workers: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}
