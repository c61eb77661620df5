//! Logging backend for the `ardecoder` binary.
//!
//! The library only talks to the `log` facade; this installs a `fern`
//! dispatcher with colored stdout and an optional plain-text log file.

use std::io::stdout;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

use fern::colors::Color::{Blue, Green, Magenta, Red, Yellow};
use fern::colors::ColoredLevelConfig;
use fern::Dispatch;
use log::LevelFilter;

static INIT_LOGGER_ONCE: Once = Once::new();

/// Set once a dispatcher has actually been installed.
static LOGGER_ALREADY_CALLED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("Failed to create log file: {0}")]
    LogFile(#[from] std::io::Error),

    #[error("Failed to install logger: {0}")]
    Install(#[from] log::SetLoggerError),

    #[error("Logger installation failed earlier in this process")]
    Unavailable,
}

/// Install the global logger.
///
/// Safe to call more than once: later calls log a warning and return `Ok`.
/// A log file that cannot be created fails only that call; the dispatcher
/// itself is installed at most once per process.
pub fn initialize(level: LevelFilter, log_file: Option<&Path>) -> Result<(), LoggerError> {
    if LOGGER_ALREADY_CALLED.load(Ordering::SeqCst) {
        log::warn!("Logger already initialized");
        return Ok(());
    }

    let dispatch = build(level, log_file)?;

    let mut attempted = false;
    let mut result = Ok(());
    INIT_LOGGER_ONCE.call_once(|| {
        attempted = true;
        result = dispatch.apply().map_err(LoggerError::from);
        if result.is_ok() {
            LOGGER_ALREADY_CALLED.store(true, Ordering::SeqCst);
            log::info!("Logger initialized with level {}", level);
        }
    });

    if attempted {
        return result;
    }
    // Another caller ran the install while this one was building.
    if LOGGER_ALREADY_CALLED.load(Ordering::SeqCst) {
        log::warn!("Logger already initialized");
        Ok(())
    } else {
        Err(LoggerError::Unavailable)
    }
}

fn build(level: LevelFilter, log_file: Option<&Path>) -> Result<Dispatch, LoggerError> {
    let colors = ColoredLevelConfig::new()
        .debug(Blue)
        .info(Green)
        .warn(Yellow)
        .error(Red)
        .trace(Magenta);

    let stdout_dispatch = Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .chain(stdout());

    let mut dispatch = Dispatch::new().level(level).chain(stdout_dispatch);

    if let Some(path) = log_file {
        let file_dispatch = Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "[{} {} {}] {}",
                    chrono::Local::now().to_rfc3339(),
                    record.level(),
                    record.target(),
                    message
                ))
            })
            .chain(fern::log_file(path)?);
        dispatch = dispatch.chain(file_dispatch);
    }

    Ok(dispatch)
}
