use crate::logger::{Logger, CALLER_KEY};
use crate::record::{FieldValue, Fields, Frame, Level, LogEntry};
use crate::severity::is_error_class;
use chrono::Utc;
use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that turns events into [`LogEntry`]s and
/// writes them through a [`Logger`].
///
/// The logger decides the minimum level, the hooks and the output format,
/// so events emitted with the `tracing` macros and entries logged through
/// the [`Logger`] handle end up in the same stream with the same shape.
/// `TRACE` events are treated as `DEBUG`.
pub struct CloudLogLayer {
    logger: Logger,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Events below the logger's minimum level.
    pub filtered_events: Arc<AtomicU64>,
}

impl CloudLogLayer {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            total_events: Arc::new(AtomicU64::new(0)),
            filtered_events: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }
}

impl<S> Layer<S> for CloudLogLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        let meta = event.metadata();
        let level = Level::from(meta.level());
        if !self.logger.enabled(level) {
            self.filtered_events.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut fields = Fields::new();
        let mut message: Option<String> = None;

        let mut visitor = FieldVisitor { fields: &mut fields, message: &mut message };
        event.record(&mut visitor);

        if self.logger.reports_caller() && is_error_class(level) {
            if let (Some(file), Some(line)) = (meta.file(), meta.line()) {
                let function = meta.module_path().unwrap_or_default();
                fields
                    .entry(CALLER_KEY.to_string())
                    .or_insert_with(|| Frame::new(file, function, line).into());
            }
        }

        self.logger.write_entry(LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.unwrap_or_default(),
            fields,
        });
    }
}

use tracing::field::{Field, Visit};

/// Collects event fields into a [`Fields`] bag; the `message` field becomes
/// the entry message.
pub struct FieldVisitor<'a> {
    pub fields: &'a mut Fields,
    pub message: &'a mut Option<String>,
}

impl<'a> FieldVisitor<'a> {
    fn insert(&mut self, field: &Field, value: impl Into<FieldValue>) {
        self.fields.insert(field.name().to_string(), value.into());
    }
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.insert(field, value);
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value);
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value);
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.insert(field, format!("{:?}", value));
        }
    }
}
