use thiserror::Error;

/// Deterministic business outcomes plus the one retryable infrastructure
/// failure. Validation rejections are surfaced to the caller as-is and never
/// retried internally.
#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("board not found")]
    NotFound,

    #[error("board is closed for writes")]
    BoardClosed,

    #[error("coordinates ({x}, {y}) are outside the board")]
    OutOfBounds { x: u32, y: u32 },

    #[error("cell is already painted and this board forbids redraw")]
    RedrawForbidden,

    #[error("cooldown active, retry in {retry_after_seconds}s")]
    CooldownActive { retry_after_seconds: i64 },

    #[error("invalid board spec: {reason}")]
    InvalidBoardSpec { reason: &'static str },

    /// Transient storage failure. History is appended before any projection
    /// write, so callers may retry; reconciliation can repair projections
    /// from the log.
    #[error("storage unavailable")]
    Storage(#[from] anyhow::Error),
}
