use super::{Repository, RepositoryError};
use crate::git::{log_failure, run_git, GitCommandError};
use log::{debug, info};
use std::path::{Path, PathBuf};

/// A working copy of a remote git repository, tracking one branch.
///
/// If the directory does not exist, the trigger branch is cloned. Otherwise the changes are fetched,
/// the trigger branch is checked out and pulled, so a working copy left on a different
/// branch returns to the trigger branch.
pub struct GitRepository {
    app_name: String,
    directory: PathBuf,
    url: String,
    branch: String,
}

impl GitRepository {
    pub fn new(app_name: String, directory: PathBuf, url: String, branch: String) -> Self {
        GitRepository {
            app_name,
            directory,
            url,
            branch,
        }
    }

    fn git(&self, directory: Option<&Path>, args: &[&str]) -> Result<String, GitCommandError> {
        run_git(directory, args).map_err(|err| {
            log_failure(&self.app_name, &err);
            err
        })
    }

    fn clone_repository(&self) -> Result<(), RepositoryError> {
        let Self {
            app_name,
            directory,
            url,
            branch,
        } = self;
        info!("[{app_name}] Cloning branch {branch} of repository {url}...");

        let directory = directory.to_string_lossy().to_string();
        let output = self
            .git(
                None,
                &[
                    "clone",
                    "--branch",
                    branch.as_str(),
                    url.as_str(),
                    directory.as_str(),
                ],
            )
            .map_err(RepositoryError::CloneFailed)?;
        debug!("[{app_name}] Git output: {output}");

        Ok(())
    }

    fn update_repository(&self) -> Result<(), RepositoryError> {
        let Self {
            app_name,
            directory,
            branch,
            ..
        } = self;
        info!("[{app_name}] Pulling latest changes from the repository...");

        self.git(Some(directory.as_path()), &["fetch"])
            .map_err(RepositoryError::FetchFailed)?;

        debug!("[{app_name}] Checking out branch {branch}.");
        self.git(Some(directory.as_path()), &["checkout", branch.as_str()])
            .map_err(|err| RepositoryError::CheckoutFailed(branch.clone(), err))?;

        let output = self
            .git(Some(directory.as_path()), &["pull", "origin", branch.as_str()])
            .map_err(|err| RepositoryError::PullFailed(branch.clone(), err))?;
        debug!("[{app_name}] Git output: {output}");

        Ok(())
    }
}

impl Repository for GitRepository {
    fn sync(&self) -> Result<(), RepositoryError> {
        if self.directory.exists() {
            self.update_repository()
        } else {
            self.clone_repository()
        }
    }
}
