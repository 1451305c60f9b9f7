use flexi_logger::{FlexiLoggerError, Logger, LoggerHandle, opt_format};

/// Start logging to stderr.
///
/// `RUST_LOG` takes precedence over `level`. The returned handle must be kept
/// alive for as long as logging is wanted.
pub fn setup_logging(level: &str) -> Result<LoggerHandle, FlexiLoggerError> {
    Logger::try_with_env_or_str(level)?
        .log_to_stderr()
        .format(opt_format)
        .start()
}
