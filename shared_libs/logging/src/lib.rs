/*
Logger setup shared by the processes on either end of the GUI link.

Binaries call init_logger once at startup with the directory their log files go in.
Everything goes to the console and to all_logs.log, warnings and errors are also
copied into error_and_warning_logs.log so a failed run can be triaged quickly.
Library crates only use the `log` macros and never initialise a logger themselves.
*/

use log::LevelFilter;
use log4rs::filter::threshold::ThresholdFilter;
use log4rs::{
    append::console::{ConsoleAppender, Target},
    append::file::FileAppender,
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
    Handle,
};
use thiserror::Error;

const FILE_PATTERN: &str = "{d} - {l} - {t} - {m}{n}";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("could not open log file: {0}")]
    File(#[from] std::io::Error),
    #[error("invalid logger configuration: {0}")]
    Config(String),
    #[error("a logger is already installed: {0}")]
    AlreadyInitialised(#[from] log::SetLoggerError),
}

fn configure_logger(
    console_log_level: LevelFilter,
    filtered_log_level: LevelFilter,
    log_path: &str,
) -> Result<Config, LoggingError> {
    // Console goes to stderr so a tool can still print results on stdout
    let console = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{h({l})} {m}{n}")))
        .build();

    let all_log_file = format!("{}/all_logs.log", log_path);
    let all_file = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(FILE_PATTERN)))
        .build(all_log_file)?;

    let filtered_log_file = format!("{}/error_and_warning_logs.log", log_path);
    let filtered_file = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(FILE_PATTERN)))
        .build(filtered_log_file)?;

    let console = Appender::builder()
        .filter(Box::new(ThresholdFilter::new(console_log_level)))
        .build("console", Box::new(console));
    let filtered_file = Appender::builder()
        .filter(Box::new(ThresholdFilter::new(filtered_log_level)))
        .build("filtered_file", Box::new(filtered_file));

    Config::builder()
        .appender(console)
        .appender(Appender::builder().build("all_file", Box::new(all_file)))
        .appender(filtered_file)
        .build(
            Root::builder()
                .appender("console")
                .appender("all_file")
                .appender("filtered_file")
                .build(LevelFilter::Trace),
        )
        .map_err(|e| LoggingError::Config(e.to_string()))
}

/// Initialise the process wide logger with console output at `console_log_level`.
pub fn init_logger_with_level(
    log_path: &str,
    console_log_level: LevelFilter,
) -> Result<Handle, LoggingError> {
    let config = configure_logger(console_log_level, LevelFilter::Warn, log_path)?;
    Ok(log4rs::init_config(config)?)
}

pub fn init_logger(log_path: &str) -> Result<Handle, LoggingError> {
    init_logger_with_level(log_path, LevelFilter::Info)
}
