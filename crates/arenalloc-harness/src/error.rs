//! Harness errors.

use arenalloc_core::HeapError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("heap: {0}")]
    Heap(#[from] HeapError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("scenario `{0}` failed")]
    ScenarioFailed(&'static str),
}
