use gumdrop::Options;

/// Watch the repositories of the declared applications and run their steps on new commits.
#[derive(Debug, Options)]
pub struct Args {
    /// The global settings file.
    #[options(default = "settings.json", meta = "PATH")]
    pub settings: String,

    /// Run a single pass over every application and exit. Useful for cronjobs.
    #[options()]
    pub once: bool,

    /// Only print error messages.
    #[options()]
    pub quiet: bool,

    /// Increase verbosity, can be set multiple times (-v debug, -vv tracing)
    #[options(count)]
    pub verbose: u8,

    /// Print the current version.
    #[options(short = "V")]
    pub version: bool,

    /// Print this help.
    #[options()]
    pub help: bool,
}

pub fn parse_args() -> Args {
    Args::parse_args_default_or_exit()
}
