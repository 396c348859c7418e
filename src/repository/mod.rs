use crate::git::GitCommandError;
use mockall::automock;
use thiserror::Error;

/// A repository synced with `git clone`, `git fetch`, `git checkout` and `git pull`.
pub mod git;

/// A custom error for describing the error cases for repositories.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The working copy does not exist and cannot be cloned.
    #[error("failed to clone repository: {0}")]
    CloneFailed(GitCommandError),
    /// The working copy exists, but cannot be fetched.
    #[error("failed to fetch changes from the repository: {0}")]
    FetchFailed(GitCommandError),
    /// The trigger branch cannot be checked out.
    #[error("failed to checkout branch {0}: {1}")]
    CheckoutFailed(String, GitCommandError),
    /// The trigger branch cannot be pulled.
    #[error("failed to pull latest changes of branch {0}: {1}")]
    PullFailed(String, GitCommandError),
}

/// A repository is a local working copy that can be brought up to date with its remote.
#[automock]
pub trait Repository: Send {
    /// Create the working copy or update it, leaving it on the trigger branch.
    fn sync(&self) -> Result<(), RepositoryError>;
}
