use crate::{
    application::ApplicationSpec,
    context::Context,
    pipeline::{Pipeline, PipelineOutcome},
    settings::Settings,
};
use log::{debug, error, info};
use mockall::automock;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
};
use thiserror::Error;

/// A custom error describing why a pass cannot run at all.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scripts directory cannot be listed.
    #[error("failed to read scripts directory {0}: {1}")]
    UnreadableScripts(String, std::io::Error),
}

/// What happened to the applications in a pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Applications where the steps ran successfully.
    pub executed: usize,
    /// Applications without a new commit.
    pub up_to_date: usize,
    /// Spec files that were malformed or pipelines that stopped with an error.
    pub failed: usize,
}

/// A pass runs every application once, triggered by one event.
#[automock]
pub trait Pass {
    fn run_pass(&self, context: &Context) -> Result<PassSummary, SchedulerError>;
}

/// Locks keyed by application name, so two pipelines never touch the same working copy at once.
#[derive(Default)]
pub struct AppLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AppLocks {
    /// Get the lock of an application, creating it on the first use.
    pub fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Wait for the lock of an application. A poisoned lock only means an earlier pipeline panicked.
fn acquire(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The scheduler runs passes over every application spec in the scripts directory.
///
/// A pass lists the `*.json` files, loads them again from the disk and runs a pipeline
/// for each on its own thread. The pass returns when every pipeline finished.
pub struct Scheduler {
    settings: Arc<Settings>,
    locks: AppLocks,
}

impl Scheduler {
    pub fn new(settings: Arc<Settings>) -> Self {
        Scheduler {
            settings,
            locks: AppLocks::default(),
        }
    }

    fn list_spec_files(&self) -> Result<Vec<PathBuf>, SchedulerError> {
        let scripts_directory = &self.settings.scripts_directory;
        let entries = fs::read_dir(scripts_directory).map_err(|err| {
            SchedulerError::UnreadableScripts(scripts_directory.display().to_string(), err)
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| is_spec_file(path) && path.is_file())
            .collect();
        files.sort();

        Ok(files)
    }

    fn process_spec_file(&self, path: &Path, context: &Context) -> Option<PipelineOutcome> {
        let spec = match ApplicationSpec::load(path) {
            Ok(spec) => spec,
            Err(err) => {
                error!("{err}");
                return None;
            }
        };
        info!(
            "[{}] Processing configuration from file {}...",
            spec.name,
            path.display()
        );

        let pipeline = Pipeline::from_spec(spec, &self.settings);
        let lock = self.locks.lock_for(pipeline.name());
        let _guard = acquire(&lock);

        let mut context = context.clone();
        pipeline.run(&mut context).ok()
    }
}

/// Returns true for the files that should be read as application specs.
pub fn is_spec_file(path: &Path) -> bool {
    path.extension().is_some_and(|extension| extension == "json")
}

impl Pass for Scheduler {
    fn run_pass(&self, context: &Context) -> Result<PassSummary, SchedulerError> {
        let files = self.list_spec_files()?;
        debug!("Found {} application spec(s).", files.len());

        let outcomes: Vec<Option<PipelineOutcome>> = thread::scope(|scope| {
            let handles: Vec<_> = files
                .iter()
                .map(|path| scope.spawn(move || self.process_spec_file(path, context)))
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or(None))
                .collect()
        });

        let mut summary = PassSummary::default();
        for outcome in outcomes {
            match outcome {
                Some(PipelineOutcome::Executed) => summary.executed += 1,
                Some(PipelineOutcome::UpToDate) => summary.up_to_date += 1,
                None => summary.failed += 1,
            }
        }

        Ok(summary)
    }
}
