use crate::config::LoggingConfig;
use flexi_logger::{DeferredNow, FileSpec, Logger, LoggerHandle, WriteMode};
use log::Record;
use std::io::Write;
use std::thread;

/// Starts the logger described by `[logging]`: stderr by default, a file in
/// `directory` when one is configured.
pub fn init_logger(cfg: &LoggingConfig) -> Result<LoggerHandle, Box<dyn std::error::Error>> {
    let logger = Logger::try_with_str(&cfg.level)?.format(log_format);
    let logger = match &cfg.directory {
        Some(dir) => logger
            .log_to_file(FileSpec::default().directory(dir.clone()).suppress_timestamp())
            .append()
            .write_mode(WriteMode::BufferAndFlush),
        None => logger.log_to_stderr(),
    };
    Ok(logger.start()?)
}

/// timestamp, level, file:line, thread name, message
fn log_format(w: &mut dyn Write, now: &mut DeferredNow, record: &Record) -> std::io::Result<()> {
    write!(
        w,
        "{} [{:<5}] [{}:{}] [{}] {}",
        now.format("%Y-%m-%d %H:%M:%S"),
        record.level(),
        record.file().unwrap_or("<unknown>"),
        record.line().unwrap_or(0),
        thread::current().name().unwrap_or("<unnamed>"),
        &record.args()
    )
}
