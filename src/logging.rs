use env_logger::{Builder, Env};
use log::LevelFilter;

use crate::constants::LOG_ENV_VAR;

/// Initialize logging, given a `verbosity_level`.
///
/// The `verbosity_level` is the result of `-v` and `-q` occurrences (see [`crate::cli::Cli`]).
/// If the environment variable [`LOG_ENV_VAR`] is set, it takes precedence.
pub fn init(verbosity_level: i8) {
    let default_log_level = match verbosity_level {
        i8::MIN..=-2 => LevelFilter::Off,
        -1 => LevelFilter::Error,
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        3..=i8::MAX => LevelFilter::Trace,
    };

    Builder::new()
        .filter_level(default_log_level)
        .parse_env(Env::new().filter(LOG_ENV_VAR))
        .format_timestamp_millis()
        .init();
}
