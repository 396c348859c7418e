use crate::{args::Args, MainError};
use autocc_bin::settings::Settings;
use log::{warn, Level, LevelFilter};
use simplelog::{
    format_description, Color, ColorChoice, CombinedLogger, Config, ConfigBuilder, LevelPadding,
    SharedLogger, TermLogger, TerminalMode, WriteLogger,
};
use std::fs::{self, OpenOptions};

// Use the same format as simple_logger
const TIMESTAMP_FORMAT_OFFSET: &[simplelog::FormatItem<'_>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3][offset_hour sign:mandatory]:[offset_minute]"
);

fn build_config() -> Result<Config, MainError> {
    Ok(ConfigBuilder::new()
        .set_level_color(Level::Debug, Some(Color::Magenta))
        .set_level_color(Level::Trace, None)
        .set_level_padding(LevelPadding::Right)
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .set_time_format_custom(TIMESTAMP_FORMAT_OFFSET)
        .set_time_offset_to_local()
        .map_err(|_| MainError::FailedLoggerTimezones)?
        .build())
}

/// Log to the terminal, and to the log file without colors if it is enabled.
pub fn init_logger(args: &Args, settings: &Settings) -> Result<(), MainError> {
    let level = match (args.quiet, args.verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    };

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    loggers.push(TermLogger::new(
        level,
        build_config()?,
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ));

    if settings.log_enabled {
        let log_file = settings.log_file();
        fs::create_dir_all(&settings.log_directory)
            .map_err(|err| MainError::FailedLogFile(log_file.display().to_string(), err))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .map_err(|err| MainError::FailedLogFile(log_file.display().to_string(), err))?;
        loggers.push(WriteLogger::new(level, build_config()?, file));
    }

    CombinedLogger::init(loggers)?;

    if args.verbose > 3 {
        warn!("Okay, it's time to stop. It won't get more verbose than this.")
    }

    Ok(())
}
