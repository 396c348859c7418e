use super::{Trigger, TriggerError};
use crate::{context::Context, scheduler::is_spec_file};
use log::{error, info};
use notify::{
    event::ModifyKind, recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode,
    Watcher,
};
use std::{
    collections::HashMap,
    path::Path,
    sync::{
        mpsc::{self, Receiver, Sender},
        Mutex,
    },
};

const TRIGGER_NAME: &str = "WATCH";

/// A trigger that runs when an application spec is created or modified.
///
/// Every change triggers a full pass over every spec, not only the changed one.
/// There is no debounce: saving a file may trigger more than one pass.
pub struct WatchTrigger {
    _watcher: Mutex<RecommendedWatcher>,
    events: Mutex<Receiver<notify::Result<Event>>>,
}

/// Returns true, if the event creates or changes the contents of a spec file.
fn is_spec_change(event: &Event) -> bool {
    let is_write = matches!(
        event.kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Any | ModifyKind::Data(_) | ModifyKind::Name(_))
    );

    is_write && event.paths.iter().any(|path| is_spec_file(path))
}

impl WatchTrigger {
    /// Start watching the directory. Fails if the directory cannot be watched.
    pub fn new(directory: &Path) -> Result<Self, TriggerError> {
        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = recommended_watcher(tx).map_err(|err| {
            TriggerError::Misconfigured(format!("cannot create watcher: {err}"))
        })?;
        watcher
            .watch(directory, RecursiveMode::NonRecursive)
            .map_err(|err| {
                TriggerError::Misconfigured(format!(
                    "failed to watch directory {}: {err}",
                    directory.display()
                ))
            })?;
        info!("Monitoring {} for changes...", directory.display());

        Ok(WatchTrigger {
            _watcher: Mutex::new(watcher),
            events: Mutex::new(rx),
        })
    }
}

impl Trigger for WatchTrigger {
    /// Forward the spec changes of the watched directory as passes.
    fn listen(&self, tx: Sender<Option<Context>>) -> Result<(), TriggerError> {
        let events = self
            .events
            .lock()
            .map_err(|_| TriggerError::FailedTrigger(String::from("watcher is poisoned")))?;

        for result in events.iter() {
            match result {
                Ok(event) if is_spec_change(&event) => {
                    for path in event.paths.iter().filter(|path| is_spec_file(path)) {
                        info!(
                            "Detected changes in {}. Reloading configuration...",
                            path.display()
                        );
                    }
                    let context: Context =
                        HashMap::from([("TRIGGER_NAME", TRIGGER_NAME.to_string())]);
                    tx.send(Some(context))?;
                }
                Ok(_) => {}
                Err(err) => error!("Watcher error: {err}."),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{cleanup_directory, create_test_directory};
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};
    use std::{error::Error, fs, path::PathBuf, thread, time::Duration};

    #[test]
    fn it_should_only_react_to_spec_writes() {
        let modified = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from("scripts/website.json"));
        let created = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("scripts/website.json"));
        let removed = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("scripts/website.json"));
        let chmod = Event::new(EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::Permissions,
        )))
        .add_path(PathBuf::from("scripts/website.json"));
        let other = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from("scripts/website.json.swp"));

        assert!(is_spec_change(&modified));
        assert!(is_spec_change(&created));
        assert!(!is_spec_change(&removed));
        assert!(!is_spec_change(&chmod));
        assert!(!is_spec_change(&other));
    }

    #[test]
    fn it_should_trigger_on_a_new_spec() -> Result<(), Box<dyn Error>> {
        let directory = create_test_directory()?;

        let trigger = WatchTrigger::new(Path::new(&directory))?;
        let (tx, rx) = mpsc::channel::<Option<Context>>();
        thread::spawn(move || {
            let _ = trigger.listen(tx);
        });

        fs::write(format!("{directory}/website.json"), "{}")?;

        let msg = rx.recv_timeout(Duration::from_secs(5))?;
        assert_eq!(
            Some(HashMap::from([("TRIGGER_NAME", String::from("WATCH"))])),
            msg
        );

        cleanup_directory(&directory)?;

        Ok(())
    }

    #[test]
    fn it_should_fail_on_a_missing_directory() {
        let result = WatchTrigger::new(Path::new("/path/to/nowhere"));

        assert!(
            matches!(result, Err(TriggerError::Misconfigured(_))),
            "should be Misconfigured"
        );
    }
}
