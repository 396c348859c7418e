use crate::context::Context;
use mockall::automock;
use thiserror::Error;

/// A check that compares the remote head of the trigger branch to the last processed commit.
pub mod commit;

/// A custom error for describing the error cases for checks
#[derive(Debug, Error)]
pub enum CheckError {
    /// Cannot run check, because the working copy has a misconfiguration.
    #[error("not configured correctly: {0}")]
    Misconfigured(String),
    /// Cannot read or persist the state of the check.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Refreshing the remote state failed.
    #[error("failed while running: {0}")]
    FailedUpdate(String),
}

/// A check is a process that decides whether the actions should run.
///
/// Checks may include:
///   - comparing the remote head commit to the last processed one ([commit::CommitCheck])
///   - etc.
#[automock]
pub trait Check: Send {
    /// Check if there are changes and record them as processed if necessary.
    fn check(&self, context: &mut Context) -> Result<bool, CheckError>;
}
