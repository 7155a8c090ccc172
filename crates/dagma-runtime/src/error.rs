//! Runner-level errors: node-level failures, plus the worker-pool setup
//! failures only the thread runner can hit.

use dagma_core::DagmaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Node(#[from] DagmaError),

    /// The thread runner's worker pool failed to build (e.g. an
    /// unschedulable `num_workers`).
    #[error("failed to build worker pool: {0}")]
    Pool(String),
}
