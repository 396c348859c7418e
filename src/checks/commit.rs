use super::{Check, CheckError};
use crate::{
    context::Context,
    git::{log_failure, run_git, GitCommandError},
};
use git2::Repository;
use log::{debug, info};
use std::{
    fs,
    io::ErrorKind,
    path::PathBuf,
};
use thiserror::Error;

const CHECK_NAME: &str = "COMMIT";

/// The name of the file holding the last processed commit, next to the working copy.
pub const MARKER_FILE_NAME: &str = ".lastcommit";

/// A check comparing the remote head of the trigger branch to the last processed commit.
///
/// The remote is always fetched before comparing, because the working copy does not follow
/// the remote head by itself. If the head differs from the commit marker (or there is no
/// marker yet), the new head is written to the marker and the check passes.
pub struct CommitCheck {
    app_name: String,
    directory: PathBuf,
    marker: PathBuf,
    branch: String,
}

/// A custom error describing the error cases for the CommitCheck.
#[derive(Debug, Error)]
pub enum CommitError {
    /// The working copy cannot be opened as a git repository.
    #[error("{0} is not a valid git repository ({1})")]
    NotAGitRepository(String, String),
    /// There is no remote named origin, or it has no URL.
    #[error("no remote repository 'origin' found, the repository has to be cloned with a remote")]
    NoOrigin,
    /// Fetching the remote failed. This can be a network failure, authentication error or many other things.
    #[error("cannot fetch from remote repository ({0})")]
    FetchFailed(GitCommandError),
    /// Querying the remote head failed.
    #[error("cannot fetch remote commit hash for branch {0} ({1})")]
    RemoteQueryFailed(String, GitCommandError),
    /// The trigger branch does not exist on the remote.
    #[error("branch {0} does not exist on the remote")]
    BranchNotFound(String),
    /// The commit marker exists, but cannot be read.
    #[error("cannot read commit marker {0} ({1})")]
    MarkerUnreadable(String, std::io::Error),
    /// The commit marker cannot be written.
    #[error("cannot save commit marker {0} ({1})")]
    MarkerNotSaved(String, std::io::Error),
}

impl From<CommitError> for CheckError {
    fn from(value: CommitError) -> Self {
        match value {
            CommitError::NotAGitRepository(_, _)
            | CommitError::NoOrigin
            | CommitError::BranchNotFound(_) => CheckError::Misconfigured(value.to_string()),
            CommitError::MarkerUnreadable(_, _) | CommitError::MarkerNotSaved(_, _) => {
                CheckError::PermissionDenied(value.to_string())
            }
            CommitError::FetchFailed(_) | CommitError::RemoteQueryFailed(_, _) => {
                CheckError::FailedUpdate(value.to_string())
            }
        }
    }
}

/// Remove a single trailing line terminator (`\n` or `\r\n`).
pub fn trim_line_terminator(value: &str) -> &str {
    value
        .strip_suffix("\r\n")
        .or_else(|| value.strip_suffix('\n'))
        .unwrap_or(value)
}

/// Find the commit of the given reference in the output of `git ls-remote`.
fn parse_ls_remote(output: &str, reference: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (commit_sha, name) = line.split_once('\t')?;
        (name.trim() == reference).then(|| commit_sha.trim().to_string())
    })
}

fn shorthash(sha: &str) -> String {
    sha.chars().take(7).collect()
}

impl CommitCheck {
    pub fn new(app_name: String, directory: PathBuf, marker: PathBuf, branch: String) -> Self {
        CommitCheck {
            app_name,
            directory,
            marker,
            branch,
        }
    }

    fn verify_origin(&self) -> Result<(), CommitError> {
        let repo = Repository::open(&self.directory).map_err(|err| {
            CommitError::NotAGitRepository(self.directory.display().to_string(), err.to_string())
        })?;
        let remote = repo.find_remote("origin").map_err(|_| CommitError::NoOrigin)?;

        match remote.url() {
            Some(url) if !url.is_empty() => Ok(()),
            _ => Err(CommitError::NoOrigin),
        }
    }

    fn get_remote_head(&self) -> Result<String, CommitError> {
        let Self {
            directory, branch, ..
        } = self;
        let reference = format!("refs/heads/{branch}");
        let output = run_git(
            Some(directory.as_path()),
            &["ls-remote", "origin", reference.as_str()],
        )
        .map_err(|err| {
            log_failure(&self.app_name, &err);
            CommitError::RemoteQueryFailed(branch.clone(), err)
        })?;

        parse_ls_remote(&output, &reference)
            .ok_or_else(|| CommitError::BranchNotFound(branch.clone()))
    }

    fn read_marker(&self) -> Result<Option<String>, CommitError> {
        match fs::read_to_string(&self.marker) {
            Ok(commit_sha) => Ok(Some(trim_line_terminator(&commit_sha).to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(CommitError::MarkerUnreadable(
                self.marker.display().to_string(),
                err,
            )),
        }
    }

    fn write_marker(&self, commit_sha: &str) -> Result<(), CommitError> {
        fs::write(&self.marker, commit_sha)
            .map_err(|err| CommitError::MarkerNotSaved(self.marker.display().to_string(), err))
    }

    fn check_inner(&self, context: &mut Context) -> Result<bool, CommitError> {
        let Self {
            app_name,
            directory,
            ..
        } = self;
        context.insert("CHECK_NAME", CHECK_NAME.to_string());

        if !directory.exists() {
            info!("[{app_name}] Repository is not cloned, the steps will run to initialize it.");
            return Ok(true);
        }

        self.verify_origin()?;

        debug!("[{app_name}] Fetching the latest changes from the remote repository.");
        run_git(Some(directory.as_path()), &["fetch"]).map_err(|err| {
            log_failure(app_name, &err);
            CommitError::FetchFailed(err)
        })?;

        let latest_commit = self.get_remote_head()?;
        let latest_commit = trim_line_terminator(&latest_commit);
        let last_commit = self.read_marker()?;

        if last_commit.as_deref() == Some(latest_commit) {
            info!(
                "[{app_name}] Repository is up-to-date with commit {}, the steps will not run.",
                shorthash(latest_commit)
            );
            return Ok(false);
        }

        match &last_commit {
            Some(last_commit) => info!(
                "[{app_name}] Repository has a new commit {} (was {}), the steps will run.",
                shorthash(latest_commit),
                shorthash(last_commit)
            ),
            None => info!(
                "[{app_name}] No previous commit found, the steps will run on {}.",
                shorthash(latest_commit)
            ),
        }
        self.write_marker(latest_commit)?;

        context.insert("COMMIT_SHA", latest_commit.to_string());
        context.insert("COMMIT_SHORT_SHA", shorthash(latest_commit));
        if let Some(last_commit) = last_commit {
            context.insert("PREVIOUS_COMMIT_SHA", last_commit);
        }

        Ok(true)
    }

}

impl Check for CommitCheck {
    /// Fetch the remote and compare its trigger branch head to the commit marker.
    /// It returns true if the steps should run, and the marker is updated in this case.
    fn check(&self, context: &mut Context) -> Result<bool, CheckError> {
        let should_run = self.check_inner(context)?;

        Ok(should_run)
    }
}
