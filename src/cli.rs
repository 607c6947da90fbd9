//! Command-line interface for kv-session.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::path::PathBuf;

use thiserror::Error;

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Application name (overrides config file).
    pub app_name: Option<String>,
    /// Idle timeout in minutes (overrides config file).
    pub timeout_minutes: Option<u32>,
    /// Raise store failures instead of logging them.
    pub propagate_faults: bool,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('a') | Long("app-name") => {
                let value: String = parser.value()?.parse()?;
                if value.trim().is_empty() {
                    return Err(ArgsError::InvalidValue("app-name", value));
                }
                result.app_name = Some(value);
            }
            Short('t') | Long("timeout") => {
                let value: String = parser.value()?.parse()?;
                let minutes = value
                    .parse()
                    .ok()
                    .filter(|m: &u32| *m > 0)
                    .ok_or_else(|| ArgsError::InvalidValue("timeout", value))?;
                result.timeout_minutes = Some(minutes);
            }
            Long("propagate-faults") => {
                result.propagate_faults = true;
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"kv-session {version}
Lock-coordinated session persistence on a key-value store

Runs a two-request lock contention walkthrough against the in-memory
store and logs every outcome.

USAGE:
    kv-session [OPTIONS]

OPTIONS:
    -c, --config <FILE>      Path to configuration file (JSON)
    -a, --app-name <NAME>    Application name records are stamped with [default: /]
    -t, --timeout <MINUTES>  Session idle timeout [default: 20]
        --propagate-faults   Raise store failures instead of logging them
    -l, --log-level <LVL>    Log level (error, warn, info, debug, trace)
    -h, --help               Print help
    -V, --version            Print version

ENVIRONMENT VARIABLES:
    KV_SESSION_APP_NAME          Application name (overrides config)
    KV_SESSION_TIMEOUT_MINUTES   Idle timeout (overrides config)
    KV_SESSION_PROPAGATE_FAULTS  true/false (overrides config)
    KV_SESSION_LOG_LEVEL         Log level (overrides config)
    RUST_LOG                     Alternative log level setting

EXAMPLES:
    # Walkthrough with defaults
    kv-session

    # Named application, 5 minute sessions, verbose
    kv-session -a shop -t 5 -l trace
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("kv-session {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Error, Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    #[error(transparent)]
    Lexopt(#[from] lexopt::Error),
    /// Invalid argument value.
    #[error("invalid value for --{0}: '{1}'")]
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    #[error("unexpected argument: '{0}'")]
    UnexpectedArgument(String),
}
