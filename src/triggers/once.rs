use super::{Trigger, TriggerError};
use crate::context::Context;
use std::{collections::HashMap, sync::mpsc::Sender};

const TRIGGER_NAME: &str = "ONCE";

/// A trigger that runs the pass once and then exits. Useful for cronjobs.
pub struct OnceTrigger;

impl Trigger for OnceTrigger {
    /// Starts a trigger that runs once and terminates after.
    fn listen(&self, tx: Sender<Option<Context>>) -> Result<(), TriggerError> {
        let context: Context = HashMap::from([("TRIGGER_NAME", TRIGGER_NAME.to_string())]);
        tx.send(Some(context))?;
        tx.send(None)?;
        Ok(())
    }
}
