use chrono::Utc;
use std::error::Error;
use std::fmt;
use std::io::{self, Write};
use std::panic::Location;
use std::sync::{Arc, Mutex};

use crate::formatter::{Formatter, JsonFormatter};
use crate::hook::Hook;
use crate::record::{FieldValue, Fields, Frame, Level, LogEntry};
use crate::request::RpcContext;
use crate::severity::is_error_class;

/// Key used by [`Entry::with_error`].
pub const ERROR_KEY: &str = "error";
/// Key used by [`Entry::with_ctx`].
pub const CONTEXT_KEY: &str = "context";
/// Key holding the call site of error-class entries.
pub const CALLER_KEY: &str = "caller";

/// Handle to a configured logger.
///
/// Configuration (formatter, minimum level, hooks, output) is fixed when
/// the logger is built. Clones share it, so a single logger is created at
/// startup and handed to whoever needs to log.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Inner>,
}

struct Inner {
    formatter: Box<dyn Formatter>,
    level: Level,
    hooks: Vec<Box<dyn Hook>>,
    report_caller: bool,
    out: Mutex<Box<dyn Write + Send>>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.inner.level)
            .field("hooks", &self.inner.hooks.len())
            .field("report_caller", &self.inner.report_caller)
            .finish()
    }
}

impl Logger {
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::default()
    }

    /// Minimum level written by this logger.
    pub fn level(&self) -> Level {
        self.inner.level
    }

    pub fn enabled(&self, level: Level) -> bool {
        level >= self.inner.level
    }

    pub fn reports_caller(&self) -> bool {
        self.inner.report_caller
    }

    /// An entry builder without fields.
    pub fn entry(&self) -> Entry {
        Entry {
            logger: self.clone(),
            fields: Fields::new(),
        }
    }

    pub fn with_field(&self, key: impl Into<String>, value: impl Into<FieldValue>) -> Entry {
        self.entry().with_field(key, value)
    }

    pub fn with_fields<I, K, V>(&self, fields: I) -> Entry
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.entry().with_fields(fields)
    }

    pub fn with_error<E>(&self, err: E) -> Entry
    where
        E: Error + Send + Sync + 'static,
    {
        self.entry().with_error(err)
    }

    pub fn with_ctx(&self, ctx: RpcContext) -> Entry {
        self.entry().with_ctx(ctx)
    }

    #[track_caller]
    pub fn debug(&self, message: impl Into<String>) {
        self.entry().log(Level::Debug, message)
    }

    #[track_caller]
    pub fn info(&self, message: impl Into<String>) {
        self.entry().log(Level::Info, message)
    }

    #[track_caller]
    pub fn warn(&self, message: impl Into<String>) {
        self.entry().log(Level::Warn, message)
    }

    #[track_caller]
    pub fn error(&self, message: impl Into<String>) {
        self.entry().log(Level::Error, message)
    }

    #[track_caller]
    pub fn fatal(&self, message: impl Into<String>) -> ! {
        self.entry().fatal(message)
    }

    #[track_caller]
    pub fn panic(&self, message: impl Into<String>) -> ! {
        self.entry().panic(message)
    }

    /// Fire hooks, format and write a complete entry.
    ///
    /// Entries below the minimum level are dropped. Formatting happens
    /// before the output lock is taken, so a formatter that logs does not
    /// deadlock.
    pub fn write_entry(&self, mut entry: LogEntry) {
        if !self.enabled(entry.level) {
            return;
        }

        for hook in &self.inner.hooks {
            if !hook.levels().contains(&entry.level) {
                continue;
            }
            if let Err(e) = hook.fire(&mut entry) {
                eprintln!("failed to fire log hook: {}", e);
            }
        }

        let line = match self.inner.formatter.format(&entry) {
            Ok(line) => line,
            Err(e) => {
                eprintln!("failed to format log entry: {}", e);
                return;
            }
        };

        let mut out = self
            .inner
            .out
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = out.write_all(&line).and_then(|_| out.flush()) {
            eprintln!("failed to write log entry: {}", e);
        }
    }
}

/// Builder for [`Logger`].
///
/// Defaults to [`JsonFormatter`] at `Info` on stdout, without hooks and
/// without caller reporting.
pub struct LoggerBuilder {
    formatter: Box<dyn Formatter>,
    level: Level,
    hooks: Vec<Box<dyn Hook>>,
    report_caller: bool,
    out: Box<dyn Write + Send>,
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        LoggerBuilder {
            formatter: Box::new(JsonFormatter::new()),
            level: Level::Info,
            hooks: Vec::new(),
            report_caller: false,
            out: Box::new(io::stdout()),
        }
    }
}

impl LoggerBuilder {
    pub fn formatter(mut self, formatter: impl Formatter + 'static) -> Self {
        self.formatter = Box::new(formatter);
        self
    }

    pub fn boxed_formatter(mut self, formatter: Box<dyn Formatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn hook(mut self, hook: impl Hook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Attach the call site to error-class entries.
    pub fn report_caller(mut self, enabled: bool) -> Self {
        self.report_caller = enabled;
        self
    }

    pub fn writer(mut self, out: impl Write + Send + 'static) -> Self {
        self.out = Box::new(out);
        self
    }

    pub fn build(self) -> Logger {
        Logger {
            inner: Arc::new(Inner {
                formatter: self.formatter,
                level: self.level,
                hooks: self.hooks,
                report_caller: self.report_caller,
                out: Mutex::new(self.out),
            }),
        }
    }
}

/// Fields collected for a log call.
///
/// Each `with_*` call returns a new builder, so a partially filled entry
/// can be kept around and reused for several calls.
#[derive(Clone)]
pub struct Entry {
    logger: Logger,
    fields: Fields,
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry").field("fields", &self.fields).finish()
    }
}

impl Entry {
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_fields<I, K, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.fields
            .extend(fields.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_error<E>(self, err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        self.with_field(ERROR_KEY, FieldValue::error(err))
    }

    pub fn with_ctx(self, ctx: RpcContext) -> Self {
        self.with_field(CONTEXT_KEY, ctx)
    }

    /// Write the entry at `level`. Unlike [`Entry::fatal`] and
    /// [`Entry::panic`] this never terminates the caller.
    #[track_caller]
    pub fn log(&self, level: Level, message: impl Into<String>) {
        if !self.logger.enabled(level) {
            return;
        }

        let mut fields = self.fields.clone();
        if self.logger.reports_caller() && is_error_class(level) {
            let location = Location::caller();
            fields
                .entry(CALLER_KEY.to_string())
                .or_insert_with(|| Frame::new(location.file(), "", location.line()).into());
        }

        self.logger.write_entry(LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            fields,
        });
    }

    #[track_caller]
    pub fn debug(&self, message: impl Into<String>) {
        self.log(Level::Debug, message)
    }

    #[track_caller]
    pub fn info(&self, message: impl Into<String>) {
        self.log(Level::Info, message)
    }

    #[track_caller]
    pub fn warn(&self, message: impl Into<String>) {
        self.log(Level::Warn, message)
    }

    #[track_caller]
    pub fn error(&self, message: impl Into<String>) {
        self.log(Level::Error, message)
    }

    /// Write at `Fatal`, then exit the process with status 1.
    #[track_caller]
    pub fn fatal(&self, message: impl Into<String>) -> ! {
        self.log(Level::Fatal, message);
        std::process::exit(1)
    }

    /// Write at `Panic`, then panic with the message.
    #[track_caller]
    pub fn panic(&self, message: impl Into<String>) -> ! {
        let message = message.into();
        self.log(Level::Panic, message.clone());
        panic!("{}", message)
    }
}
