use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

/// The name of the log file inside the log directory.
pub const LOG_FILE_NAME: &str = "autocc.log";

/// Process-wide settings, loaded once at startup.
///
/// The settings are immutable for the lifetime of the process, changing them requires a restart.
/// Only the application specs in the scripts directory are reloaded on every pass.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// The directory containing one JSON spec per application.
    pub scripts_directory: PathBuf,
    /// The directory where the working copies and commit markers are stored.
    pub apps_directory: PathBuf,
    /// Seconds between two polls of the remote repositories.
    pub ticker: u64,
    /// Duplicate the logs into `<log_directory>/autocc.log`.
    pub log_enabled: bool,
    /// The directory of the log file.
    pub log_directory: PathBuf,
    /// Number of attempts to run the steps before giving up, 0 retries forever.
    pub max_attempts: u32,
    /// Seconds after which a running step is killed, 0 disables the timeout.
    pub step_timeout: u64,
    /// Address of the webhook server, e.g. "0.0.0.0:8000".
    pub http_address: Option<String>,
}

/// A custom error describing why the settings cannot be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file cannot be opened.
    #[error("unable to open settings file {0}: {1}")]
    Unreadable(String, std::io::Error),
    /// The settings file is not valid JSON or has invalid fields.
    #[error("unable to decode settings file {0}: {1}")]
    Malformed(String, serde_json::Error),
    /// The settings are syntactically correct, but cannot be used.
    #[error("invalid settings: {0}")]
    Invalid(String),
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            scripts_directory: PathBuf::from("./scripts"),
            apps_directory: PathBuf::from("./apps"),
            ticker: 60,
            log_enabled: false,
            log_directory: PathBuf::from("."),
            max_attempts: 5,
            step_timeout: 3600,
            http_address: None,
        }
    }
}

impl Settings {
    /// Load and validate the settings file at the given path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let contents =
            fs::read_to_string(path).map_err(|err| SettingsError::Unreadable(display.clone(), err))?;

        Settings::parse(&contents).map_err(|err| match err {
            SettingsError::Malformed(_, err) => SettingsError::Malformed(display, err),
            err => err,
        })
    }

    /// Parse and validate settings from a JSON string.
    pub fn parse(contents: &str) -> Result<Self, SettingsError> {
        let mut settings: Settings = serde_json::from_str(contents)
            .map_err(|err| SettingsError::Malformed(String::from("<inline>"), err))?;
        settings.replace_empty_directories();
        settings.validate()?;

        Ok(settings)
    }

    /// An empty directory is treated as if it was not set.
    fn replace_empty_directories(&mut self) {
        let defaults = Settings::default();
        if self.scripts_directory.as_os_str().is_empty() {
            self.scripts_directory = defaults.scripts_directory;
        }
        if self.apps_directory.as_os_str().is_empty() {
            self.apps_directory = defaults.apps_directory;
        }
        if self.log_directory.as_os_str().is_empty() {
            self.log_directory = defaults.log_directory;
        }
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.ticker == 0 {
            return Err(SettingsError::Invalid(String::from(
                "ticker has to be at least one second",
            )));
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.ticker)
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        (self.step_timeout > 0).then(|| Duration::from_secs(self.step_timeout))
    }

    pub fn max_attempts(&self) -> Option<u32> {
        (self.max_attempts > 0).then_some(self.max_attempts)
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_directory.join(LOG_FILE_NAME)
    }
}
