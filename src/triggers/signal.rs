use super::{Trigger, TriggerError};
use crate::context::Context;
use log::{info, warn};
use std::{process, sync::mpsc::Sender};

/// What to do with a termination signal.
#[derive(Debug, PartialEq, Eq)]
enum Shutdown {
    /// Let the running pass finish, then leave the main loop.
    Graceful,
    /// Exit with the given code without waiting.
    Immediate(i32),
}

/// A trigger that stops the daemon on SIGINT, SIGTERM or SIGQUIT.
///
/// The first signal lets the running pass finish, the second exits right away.
#[derive(Default)]
pub struct SignalTrigger;

impl SignalTrigger {
    pub fn new() -> SignalTrigger {
        SignalTrigger
    }

    /// Decide on the signals in order, stopping at the first immediate exit.
    fn shutdowns<I>(tx: &Sender<Option<Context>>, signals: I) -> Option<Shutdown>
    where
        I: IntoIterator<Item = i32>,
    {
        for (index, signal) in signals.into_iter().enumerate() {
            let shutdown = if index == 0 && tx.send(None).is_ok() {
                info!("Received signal {signal}, stopping after the running pass.");
                Shutdown::Graceful
            } else {
                warn!("Received signal {signal} again, exiting now.");
                Shutdown::Immediate(128 + signal)
            };

            if let Shutdown::Immediate(_) = shutdown {
                return Some(shutdown);
            }
        }

        None
    }
}

impl Trigger for SignalTrigger {
    #[cfg(unix)]
    fn listen(&self, tx: Sender<Option<Context>>) -> Result<(), TriggerError> {
        use signal_hook::{consts::TERM_SIGNALS, iterator::Signals};

        let mut signals = Signals::new(TERM_SIGNALS).map_err(|err| {
            TriggerError::Misconfigured(format!("cannot register signal handlers: {err}"))
        })?;

        if let Some(Shutdown::Immediate(code)) = Self::shutdowns(&tx, signals.forever()) {
            process::exit(code);
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn listen(&self, _tx: Sender<Option<Context>>) -> Result<(), TriggerError> {
        log::debug!("Signal handlers are not supported on non-unix systems.");

        Ok(())
    }
}
