//! ============================================================================
//! Sync Module - Pending step delivery
//! ============================================================================
//! Flushes locally accumulated pending steps to the remote balance mutation
//! on a timer and on app-foreground. Local persistence carries the pending
//! amount across restarts between flushes.
//! ============================================================================

mod balance;
mod scheduler;
mod session;

pub use balance::{BalanceMutation, EarnStepsResponse, SupabaseBalanceClient};
pub use scheduler::{SkipReason, SyncOutcome, SyncScheduler};
pub use session::{SessionHandle, UserSession};

/// Errors from a failed flush. Pending steps are kept in every case.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Balance service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Balance service rejected sync: {0}")]
    Rejected(String),

    #[error("Invalid balance service response: {0}")]
    InvalidResponse(String),
}
