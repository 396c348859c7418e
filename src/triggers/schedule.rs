use super::{Trigger, TriggerError};
use crate::context::Context;
use duration_string::DurationString;
use log::{debug, info};
use std::{
    collections::HashMap,
    sync::mpsc::Sender,
    thread::sleep,
    time::{Duration, Instant},
};

const TRIGGER_NAME: &str = "SCHEDULE";

/// A trigger that polls every application on a fixed interval.
///
/// The first pass is requested right away. The following ticks are anchored to the start
/// time, so slow wakeups do not add up. A pass that takes longer than the interval only
/// queues the next one in the channel.
pub struct ScheduleTrigger {
    interval: Duration,
    limit: Option<u32>,
}

impl ScheduleTrigger {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            limit: None,
        }
    }

    /// Stop after the given number of ticks instead of running forever.
    #[cfg(test)]
    fn with_limit(interval: Duration, limit: u32) -> Self {
        Self {
            interval,
            limit: Some(limit),
        }
    }

    fn tick(&self, tx: &Sender<Option<Context>>, tick: u32) -> Result<(), TriggerError> {
        debug!("Polling remote repositories for updates (tick {tick}).");
        let context: Context = HashMap::from([("TRIGGER_NAME", TRIGGER_NAME.to_string())]);
        tx.send(Some(context))?;

        Ok(())
    }
}

impl Trigger for ScheduleTrigger {
    fn listen(&self, tx: Sender<Option<Context>>) -> Result<(), TriggerError> {
        info!(
            "Polling remote repositories in every {}.",
            DurationString::new(self.interval)
        );

        let started = Instant::now();
        let mut tick: u32 = 0;
        while self.limit.map_or(true, |limit| tick < limit) {
            self.tick(&tx, tick)?;
            tick = tick.saturating_add(1);

            let next = started + self.interval.saturating_mul(tick);
            sleep(next.saturating_duration_since(Instant::now()));
        }

        Ok(())
    }
}
