use crate::{
    actions::{
        steps::{StepsAction, OUTPUT_FILE_NAME},
        Action, ActionError,
    },
    application::ApplicationSpec,
    checks::{
        commit::{CommitCheck, MARKER_FILE_NAME},
        Check, CheckError,
    },
    context::Context,
    repository::{git::GitRepository, Repository, RepositoryError},
    settings::Settings,
};
use log::{debug, error, info};
use std::{fs, path::PathBuf};
use thiserror::Error;

/// A custom error describing the stage where a pipeline stopped.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The private directory of the application cannot be created.
    #[error("failed to create app directory {0}: {1}")]
    AppDirectory(String, std::io::Error),
    /// The repository cannot be synced.
    #[error("sync failed: {0}")]
    Sync(#[from] RepositoryError),
    /// The check cannot decide whether to run.
    #[error("check failed: {0}")]
    Check(#[from] CheckError),
    /// The steps did not succeed.
    #[error("steps failed: {0}")]
    Steps(#[from] ActionError),
}

/// The result of a pipeline that did not fail.
#[derive(Debug, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The check found a new commit and the steps ran.
    Executed,
    /// The check found nothing new.
    UpToDate,
}

/// The per-application composition of repository sync, commit check and steps.
///
/// The stages always run in this order and any failure stops the rest of this pipeline,
/// without affecting the pipelines of other applications.
pub struct Pipeline {
    name: String,
    app_directory: PathBuf,
    repository: Box<dyn Repository>,
    check: Box<dyn Check>,
    action: Box<dyn Action>,
}

impl Pipeline {
    pub fn new(
        name: String,
        app_directory: PathBuf,
        repository: Box<dyn Repository>,
        check: Box<dyn Check>,
        action: Box<dyn Action>,
    ) -> Self {
        Pipeline {
            name,
            app_directory,
            repository,
            check,
            action,
        }
    }

    /// Create the git based pipeline of an application spec.
    pub fn from_spec(spec: ApplicationSpec, settings: &Settings) -> Self {
        let app_directory = spec.app_directory(&settings.apps_directory);
        let working_copy = spec.working_copy(&settings.apps_directory);

        let repository = GitRepository::new(
            spec.name.clone(),
            working_copy.clone(),
            spec.repository_url,
            spec.trigger_branch.clone(),
        );
        let check = CommitCheck::new(
            spec.name.clone(),
            working_copy.clone(),
            app_directory.join(MARKER_FILE_NAME),
            spec.trigger_branch,
        );
        let action = StepsAction::new(
            spec.name.clone(),
            working_copy,
            app_directory.join(OUTPUT_FILE_NAME),
            spec.steps,
            settings.max_attempts(),
            settings.step_timeout(),
        );

        Pipeline::new(
            spec.name,
            app_directory,
            Box::new(repository),
            Box::new(check),
            Box::new(action),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn run_inner(&self, context: &mut Context) -> Result<PipelineOutcome, PipelineError> {
        fs::create_dir_all(&self.app_directory).map_err(|err| {
            PipelineError::AppDirectory(self.app_directory.display().to_string(), err)
        })?;

        self.repository.sync()?;

        if !self.check.check(context)? {
            return Ok(PipelineOutcome::UpToDate);
        }

        self.action.run(context)?;

        Ok(PipelineOutcome::Executed)
    }

    /// Sync the repository, check for a new commit and run the steps if there is one.
    pub fn run(&self, context: &mut Context) -> Result<PipelineOutcome, PipelineError> {
        let name = &self.name;
        context.insert("APP_NAME", name.clone());

        match self.run_inner(context) {
            Ok(PipelineOutcome::Executed) => {
                info!("[{name}] Pipeline finished.");
                Ok(PipelineOutcome::Executed)
            }
            Ok(PipelineOutcome::UpToDate) => {
                debug!("[{name}] There are no updates.");
                Ok(PipelineOutcome::UpToDate)
            }
            Err(err) => {
                error!("[{name}] Pipeline stopped, {err}.");
                Err(err)
            }
        }
    }
}
