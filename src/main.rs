use args::parse_args;
use autocc_bin::{
    scheduler::Scheduler,
    settings::{Settings, SettingsError},
    start::{start, StartError},
    triggers::{
        http::HttpTrigger, once::OnceTrigger, schedule::ScheduleTrigger, signal::SignalTrigger,
        watch::WatchTrigger, Trigger, TriggerError,
    },
};
use log::info;
use logger::init_logger;
use std::{process, sync::Arc};
use thiserror::Error;

mod args;
mod logger;

#[derive(Debug, Error)]
pub enum MainError {
    #[error("Error loading global settings: {0}")]
    Settings(#[from] SettingsError),
    #[error("Timezones could not be loaded.")]
    FailedLoggerTimezones,
    #[error("Logger could not be set up: {0}")]
    FailedLogger(#[from] log::SetLoggerError),
    #[error("Error opening log file {0}: {1}")]
    FailedLogFile(String, std::io::Error),
    #[error("{0}")]
    FailedTrigger(#[from] TriggerError),
    #[error("{0}")]
    FailedStart(#[from] StartError),
}

fn main_inner() -> Result<(), MainError> {
    let args = parse_args();
    if args.version {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let settings = Arc::new(Settings::load(&args.settings)?);
    init_logger(&args, &settings)?;

    // Setup triggers.
    let mut triggers: Vec<Box<dyn Trigger>> = vec![Box::new(SignalTrigger::new())];
    if args.once {
        triggers.push(Box::new(OnceTrigger));
    } else {
        triggers.push(Box::new(WatchTrigger::new(&settings.scripts_directory)?));
        triggers.push(Box::new(ScheduleTrigger::new(settings.poll_interval())));
        if let Some(http) = &settings.http_address {
            triggers.push(Box::new(HttpTrigger::new(http.clone())));
        }
    }

    info!(
        "Daemon started. Applications are read from {} and cloned into {}.",
        settings.scripts_directory.display(),
        settings.apps_directory.display()
    );

    // Start the main loop.
    let scheduler = Scheduler::new(settings);
    start(triggers, &scheduler)?;

    Ok(())
}

fn main() {
    if let Err(err) = main_inner() {
        eprintln!("{err}");
        process::exit(1);
    }
}
