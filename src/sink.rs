//! Optional external log sink

/// Error returned when parsing an unknown log level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLogLevelError(pub String);

impl std::fmt::Display for ParseLogLevelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown log level: {}", self.0)
    }
}

impl std::error::Error for ParseLogLevelError {}

define_wire_enum! {
    error_type: ParseLogLevelError,
    /// Severity passed to a [`LogSink`].
    pub enum LogLevel {
        Info => "INFO",
        Warn => "WARN",
        Error => "ERROR",
    }
}

/// Receiver for the adapter's debug log.
///
/// The adapter always logs through `tracing`; a sink additionally receives the
/// same lifecycle lines, e.g. to append them to a file. Buffering and
/// flushing are up to the implementation. `write` is called from the
/// connection task and must not block for long.
pub trait LogSink: Send + Sync {
    fn write(&self, level: LogLevel, text: &str);
}

impl<F> LogSink for F
where
    F: Fn(LogLevel, &str) + Send + Sync,
{
    fn write(&self, level: LogLevel, text: &str) {
        self(level, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn closure_is_a_sink() {
        let lines = Mutex::new(Vec::new());
        let sink = |level: LogLevel, text: &str| {
            lines
                .lock()
                .unwrap()
                .push(format!("[{}] {}", level, text));
        };
        sink.write(LogLevel::Warn, "DRAIN");
        assert_eq!(*lines.lock().unwrap(), vec!["[WARN] DRAIN".to_string()]);
    }

    #[test]
    fn level_names() {
        assert_eq!(LogLevel::Info.as_str(), "INFO");
        assert_eq!("error".parse::<LogLevel>(), Ok(LogLevel::Error));
    }
}
