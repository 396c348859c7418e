use serde::Deserialize;
use std::{
    fs,
    path::{Component, Path, PathBuf},
};
use thiserror::Error;

/// The directory name of the working copy inside the application directory.
pub const WORKING_COPY_DIRECTORY: &str = "repo";

/// An application declared by one JSON file in the scripts directory.
///
/// The spec is read again on every pass, so edits take effect on the next one.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ApplicationSpec {
    /// Unique name, used as the directory of the working copy and in the logs.
    #[serde(rename = "appName")]
    pub name: String,
    /// The URL of the remote repository, anything `git clone` accepts.
    #[serde(rename = "gitRepo")]
    pub repository_url: String,
    /// The branch whose head decides whether the steps run.
    #[serde(rename = "triggerBranch")]
    pub trigger_branch: String,
    /// The steps to run in the working copy, in this order.
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

/// A named command inside an application spec.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct StepSpec {
    pub name: String,
    #[serde(flatten)]
    pub command: StepCommand,
}

/// The two supported shapes of a step command.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StepCommand {
    /// A single command line, e.g. `{"command": "npm ci"}`.
    ///
    /// It is split with shell quoting rules and run directly, unless `shell` is set,
    /// in which case it runs in a subshell (`/bin/sh` on *nix, `cmd.exe` on Windows).
    Line {
        command: String,
        #[serde(default)]
        shell: bool,
    },
    /// An executable with an explicit list of arguments,
    /// e.g. `{"executable": "/usr/bin/npm", "args": ["ci"]}`.
    Exec {
        executable: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

/// A custom error describing why an application spec cannot be used.
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// The spec file cannot be read.
    #[error("failed to read config file {0}: {1}")]
    Unreadable(String, std::io::Error),
    /// The spec file is not valid JSON or misses required fields.
    #[error("failed to parse JSON config in file {0}: {1}")]
    Malformed(String, serde_json::Error),
    /// The spec is valid JSON, but its values cannot be used.
    #[error("invalid config in file {0}: {1}")]
    Invalid(String, String),
}

impl ApplicationSpec {
    /// Read, parse and validate an application spec file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ApplicationError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let contents = fs::read_to_string(path)
            .map_err(|err| ApplicationError::Unreadable(display.clone(), err))?;
        let spec: ApplicationSpec = serde_json::from_str(&contents)
            .map_err(|err| ApplicationError::Malformed(display.clone(), err))?;
        spec.validate()
            .map_err(|reason| ApplicationError::Invalid(display, reason))?;

        Ok(spec)
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err(String::from("appName cannot be empty"));
        }
        let mut components = Path::new(&self.name).components();
        if !matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        ) {
            return Err(format!(
                "appName {:?} has to be a single directory name",
                self.name
            ));
        }
        if self.repository_url.trim().is_empty() {
            return Err(String::from("gitRepo cannot be empty"));
        }
        if self.trigger_branch.trim().is_empty() {
            return Err(String::from("triggerBranch cannot be empty"));
        }

        Ok(())
    }

    /// The private directory of the application, holding the working copy and the commit marker.
    pub fn app_directory(&self, apps_directory: &Path) -> PathBuf {
        apps_directory.join(&self.name)
    }

    /// The working copy of the repository.
    pub fn working_copy(&self, apps_directory: &Path) -> PathBuf {
        self.app_directory(apps_directory)
            .join(WORKING_COPY_DIRECTORY)
    }
}
