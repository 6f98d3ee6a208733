use crate::record::Level;

/// Severity string understood by the log ingestion pipeline.
///
/// Fatal and Panic both collapse onto `CRITICAL`.
pub fn severity(level: Level) -> &'static str {
    match level {
        Level::Debug => "DEBUG",
        Level::Info => "INFO",
        Level::Warn => "WARNING",
        Level::Error => "ERROR",
        Level::Fatal | Level::Panic => "CRITICAL",
    }
}

/// Whether entries at `level` are shaped as error-reporting events.
pub fn is_error_class(level: Level) -> bool {
    matches!(level, Level::Error | Level::Fatal | Level::Panic)
}
