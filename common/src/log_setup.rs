use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, FlexiLoggerError, Logger, LoggerHandle, Naming,
};

/// Starts the process-wide logger.
///
/// Writes to a size-rotated file under `logs/` and mirrors everything to
/// stdout, warnings and above to stderr. Keep the returned handle alive for
/// the lifetime of the process; dropping it flushes and stops the file writer.
pub fn setup_logging(base_level: &str) -> Result<LoggerHandle, FlexiLoggerError> {
    Logger::try_with_str(base_level)?
        .log_to_file(
            FileSpec::default()
                .directory("logs")
                .basename("canny_edge"),
        )
        .duplicate_to_stderr(Duplicate::Warn)
        .duplicate_to_stdout(Duplicate::All)
        .rotate(
            Criterion::Size(1024 * 1024), //1MB
            Naming::Timestamps,
            Cleanup::KeepLogFiles(5),
        )
        .start()
}
