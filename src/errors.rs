use thiserror::Error;

/// Run-fatal failure conditions.
///
/// Per-order problems (missing fields, drawer timeouts) never surface here;
/// they are absorbed into sentinel values on the order's record. Only startup
/// preconditions and the wedged-routing escalation abort a run.
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Orders table not found: {0}")]
    TableNotFound(String),

    #[error("Total order count not found: {0}")]
    TotalCountNotFound(String),

    #[error("Scrollable order list not found: {0}")]
    ScrollContainerNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Client-side routing is wedged: {0}")]
    RoutingWedged(String),

    #[error("Recovery snapshot rejected: {0}")]
    InvalidSnapshot(String),

    #[error("A run is already in progress")]
    RunInProgress,

    #[error("Page adapter error: {0}")]
    PageError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
