use serde_json::{Map, Value};
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error_event::{format_time, ReportedErrorEvent, CONSUMED_KEYS};
use crate::normalize::{normalize, plain_string, prefix_field_clashes, Normalized};
use crate::record::LogEntry;
use crate::request::HttpRequest;
use crate::severity::{is_error_class, severity};

/// Turns a [`LogEntry`] into the bytes written for it.
///
/// Implementations must not keep per-entry state: a single formatter is
/// shared by every thread that logs.
pub trait Formatter: Send + Sync {
    /// Render one entry, including its trailing newline.
    ///
    /// **Returns**
    /// - `Ok(bytes)` ready to be written as one line.
    /// - `Err(FormatError)` if the entry could not be encoded; no partial
    ///   output is produced in that case.
    fn format(&self, entry: &LogEntry) -> Result<Vec<u8>, FormatError>;
}

/// Error returned when an entry cannot be rendered.
#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    #[error("failed to marshal fields to JSON: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid timestamp format: {0:?}")]
    TimestampFormat(String),
}

/// Counters for conditions the formatter recovers from.
///
/// Each occurrence is also reported as a `tracing` warning.
#[derive(Debug, Default)]
pub struct Diagnostics {
    metadata_misses: AtomicU64,
    projection_failures: AtomicU64,
}

impl Diagnostics {
    /// RPC contexts seen without incoming metadata.
    pub fn metadata_misses(&self) -> u64 {
        self.metadata_misses.load(Ordering::Relaxed)
    }

    /// Error events that could not be projected into the payload.
    pub fn projection_failures(&self) -> u64 {
        self.projection_failures.load(Ordering::Relaxed)
    }

    pub(crate) fn metadata_missing(&self) {
        self.metadata_misses.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(target: "tracing_cloud_log", "failed to retrieve metadata from rpc context");
    }

    pub(crate) fn projection_failed(&self, err: &serde_json::Error) {
        self.projection_failures.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(target: "tracing_cloud_log", error = %err, "error marshaling error reporting data");
    }
}

/// JSON formatter for cloud log ingestion.
///
/// Entries below `ERROR` become flat records with `time`, `message`,
/// `severity` and an optional `httpRequest`. Error-class entries are
/// additionally shaped as error-reporting events so they are picked up by
/// error reporting as well as by logging.
#[derive(Debug, Default, Clone)]
pub struct JsonFormatter {
    diagnostics: Arc<Diagnostics>,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    fn prepare_payload(
        &self,
        entry: &LogEntry,
        mut data: Map<String, Value>,
        http_request: Option<HttpRequest>,
    ) -> Map<String, Value> {
        let time = format_time(&entry.timestamp);
        data.insert("time".to_string(), Value::String(time.clone()));
        data.insert("message".to_string(), Value::String(entry.message.clone()));
        data.insert("severity".to_string(), Value::String(severity(entry.level).to_string()));

        if is_error_class(entry.level) {
            let event = ReportedErrorEvent::build(&time, &entry.message, &data, http_request.as_ref());
            match project(&event) {
                Ok(mut payload) => {
                    // Event members win; clashing fields move to `fields.<key>`.
                    for (key, value) in data {
                        if CONSUMED_KEYS.contains(&key.as_str()) {
                            continue;
                        }
                        if payload.contains_key(&key) {
                            payload.insert(format!("fields.{}", key), value);
                        } else {
                            payload.insert(key, value);
                        }
                    }
                    return payload;
                }
                Err(err) => self.diagnostics.projection_failed(&err),
            }
        }

        if let Some(req) = http_request {
            match serde_json::to_value(&req) {
                Ok(value) => {
                    data.insert("httpRequest".to_string(), value);
                }
                Err(err) => self.diagnostics.projection_failed(&err),
            }
        }
        data
    }
}

/// Round-trip the event through its serde encoding so member names follow
/// the schema exactly.
fn project(event: &ReportedErrorEvent) -> Result<Map<String, Value>, serde_json::Error> {
    serde_json::to_value(event).and_then(serde_json::from_value)
}

impl Formatter for JsonFormatter {
    fn format(&self, entry: &LogEntry) -> Result<Vec<u8>, FormatError> {
        let Normalized {
            mut fields,
            http_request,
        } = normalize(&entry.fields, &self.diagnostics);
        prefix_field_clashes(&mut fields);

        let payload = self.prepare_payload(entry, fields, http_request);
        let mut serialized = serde_json::to_vec(&payload)?;
        serialized.push(b'\n');
        Ok(serialized)
    }
}

/// Human readable formatter for local development.
///
/// Lines look like `INFO[15:04:05] message key=value`.
#[derive(Debug, Clone)]
pub struct TextFormatter {
    timestamp_format: String,
    diagnostics: Arc<Diagnostics>,
}

impl Default for TextFormatter {
    fn default() -> Self {
        TextFormatter {
            timestamp_format: "%H:%M:%S".to_string(),
            diagnostics: Arc::default(),
        }
    }
}

impl TextFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a `chrono` strftime pattern for the timestamp.
    pub fn with_timestamp_format(mut self, format: impl Into<String>) -> Self {
        self.timestamp_format = format.into();
        self
    }
}

impl Formatter for TextFormatter {
    fn format(&self, entry: &LogEntry) -> Result<Vec<u8>, FormatError> {
        let Normalized {
            fields,
            http_request,
        } = normalize(&entry.fields, &self.diagnostics);

        let level = entry.level.as_str().to_ascii_uppercase();
        let mut line = String::new();
        write!(
            line,
            "{}[{}] {}",
            &level[..4],
            entry.timestamp.format(&self.timestamp_format),
            entry.message
        )
        .map_err(|_| FormatError::TimestampFormat(self.timestamp_format.clone()))?;
        if let Some(req) = http_request {
            let request = format!("{} {}", req.request_method, req.request_url);
            push_pair(&mut line, "request", &request);
        }
        for (key, value) in &fields {
            push_pair(&mut line, key, &plain_string(value));
        }
        line.push('\n');
        Ok(line.into_bytes())
    }
}

fn push_pair(line: &mut String, key: &str, value: &str) {
    line.push(' ');
    line.push_str(key);
    line.push('=');
    let needs_quoting = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '=' || c.is_control());
    if needs_quoting {
        line.push_str(&Value::String(value.to_string()).to_string());
    } else {
        line.push_str(value);
    }
}
