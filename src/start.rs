use crate::{
    context::Context,
    scheduler::Pass,
    triggers::{Trigger, TriggerError},
};
use log::{debug, error, info};
use std::{sync::mpsc, thread};
use thiserror::Error;

/// A custom error implementation for the start function
#[derive(Debug, Error)]
pub enum StartError {
    #[error("You have to define at least one trigger.")]
    NoTriggers,
    #[error("Trigger failed: {0}.")]
    MisconfiguredTrigger(#[from] TriggerError),
}

/// The main program loop, that runs the triggers and the passes infinitely.
///
/// Every trigger sends into the same channel, and the passes run one after the other:
/// an event received while a pass is running is handled after that pass finished.
pub fn start(triggers: Vec<Box<dyn Trigger>>, pass: &dyn Pass) -> Result<(), StartError> {
    let (tx, rx) = mpsc::channel::<Option<Context>>();

    if triggers.is_empty() {
        return Err(StartError::NoTriggers);
    }

    for trigger in triggers {
        let tx = tx.clone();
        thread::spawn(move || {
            let result = trigger.listen(tx);
            if let Err(err) = result {
                error!("Trigger failed: {err}.");
            }
        });
    }
    drop(tx);

    debug!("Waiting on triggers.");
    while let Ok(Some(context)) = rx.recv() {
        let trigger_name = context
            .get("TRIGGER_NAME")
            .map(String::as_str)
            .unwrap_or("UNKNOWN");
        debug!("Starting pass, triggered by {trigger_name}.");

        match pass.run_pass(&context) {
            Ok(summary) => {
                info!(
                    "Pass finished: {} executed, {} up-to-date, {} failed.",
                    summary.executed, summary.up_to_date, summary.failed
                );
            }
            Err(err) => {
                error!("Pass failed: {err}.");
            }
        }
    }

    debug!("Finished running.");

    Ok(())
}
