use duct::cmd;
use log::{error, trace};
use std::path::Path;
use thiserror::Error;

/// A custom error describing a failed `git` invocation.
#[derive(Debug, Error)]
pub enum GitCommandError {
    /// The `git` binary cannot be started.
    #[error("git cannot run: {0}")]
    NotRunnable(#[from] std::io::Error),
    /// `git` returned a non-zero exit code. The parameters are the exit code and the combined output.
    #[error("git returned non-zero exit code {0}")]
    NonZeroExitcode(i32, String),
}

impl GitCommandError {
    /// The combined output of the failed command, if it ran at all.
    pub fn output(&self) -> Option<&str> {
        match self {
            GitCommandError::NotRunnable(_) => None,
            GitCommandError::NonZeroExitcode(_, output) => Some(output),
        }
    }
}

/// Log the output of a failed git command line by line, tagged with the application name.
pub fn log_failure(app_name: &str, err: &GitCommandError) {
    if let Some(output) = err.output() {
        output
            .lines()
            .for_each(|line| error!("[{app_name}] [git] {line}"));
    }
}

/// Run `git` with the given arguments, optionally inside a directory.
///
/// Stdout and stderr are captured together and returned with trailing whitespace removed.
/// Prompting for credentials is disabled, so a repository that needs them fails instead of hanging.
pub fn run_git(directory: Option<&Path>, args: &[&str]) -> Result<String, GitCommandError> {
    let mut expression = cmd("git", args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stderr_to_stdout()
        .stdout_capture()
        .unchecked();
    if let Some(directory) = directory {
        expression = expression.dir(directory);
    }

    trace!("Running git {}.", args.join(" "));
    let output = expression.run()?;
    let output_str = String::from_utf8_lossy(&output.stdout)
        .trim_end()
        .to_string();

    if output.status.success() {
        Ok(output_str)
    } else {
        Err(GitCommandError::NonZeroExitcode(
            output.status.code().unwrap_or(-1),
            output_str,
        ))
    }
}
