use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use crate::request::{HttpRequest, RpcContext};

/// Field bag attached to a [`LogEntry`].
///
/// An ordered map keeps formatting deterministic: the same entry always
/// produces the same bytes.
pub type Fields = BTreeMap<String, FieldValue>;

/// Severity of a log entry, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Panic,
}

impl Level {
    /// Lower-case name of the level as it appears in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warning",
            Level::Error => "error",
            Level::Fatal => "fatal",
            Level::Panic => "panic",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&tracing::Level> for Level {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => Level::Error,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::INFO => Level::Info,
            _ => Level::Debug,
        }
    }
}

/// Error returned when a level name is not recognized.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("not a valid log level: {0:?}")]
pub struct ParseLevelError(pub String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            "panic" => Ok(Level::Panic),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

/// Call site descriptor used for the error report location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub file: String,
    pub function: String,
    pub line: u32,
}

impl Frame {
    pub fn new(file: impl Into<String>, function: impl Into<String>, line: u32) -> Self {
        Frame {
            file: file.into(),
            function: function.into(),
            line,
        }
    }
}

/// A value attached to a log entry.
///
/// Most values are plain JSON. The other variants are recognized by the
/// formatter and projected into dedicated schema fields.
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// Any JSON-compatible value, emitted as is.
    Plain(serde_json::Value),
    /// Emitted as the error's display message.
    Error(Arc<dyn Error + Send + Sync>),
    /// Snapshot of an inbound request, projected into an [`HttpRequest`].
    Request(Arc<http::Request<()>>),
    /// Already shaped request descriptor.
    HttpRequest(HttpRequest),
    /// In-flight RPC context carrying metadata and tags.
    Rpc(RpcContext),
    /// Call site, consumed as the report location of error events.
    Frame(Frame),
}

impl FieldValue {
    /// Wrap an error so it is rendered through its message.
    pub fn error<E>(err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        FieldValue::Error(Arc::new(err))
    }

    /// Encode any serializable value through its serde representation.
    pub fn serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(FieldValue::Plain)
    }

    /// Take a snapshot of an inbound request.
    ///
    /// Only the head is kept (method, URI, version, headers) plus the peer
    /// address when the server stored it as a `SocketAddr` extension.
    pub fn request<B>(req: &http::Request<B>) -> Self {
        let mut snapshot = http::Request::new(());
        *snapshot.method_mut() = req.method().clone();
        *snapshot.uri_mut() = req.uri().clone();
        *snapshot.version_mut() = req.version();
        *snapshot.headers_mut() = req.headers().clone();
        if let Some(addr) = req.extensions().get::<SocketAddr>() {
            snapshot.extensions_mut().insert(*addr);
        }
        FieldValue::Request(Arc::new(snapshot))
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        FieldValue::Plain(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Plain(value.into())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Plain(value.into())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Plain(value.into())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Plain(value.into())
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Plain(value.into())
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Plain(value.into())
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Plain(value.into())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Plain(value.into())
    }
}

impl From<HttpRequest> for FieldValue {
    fn from(value: HttpRequest) -> Self {
        FieldValue::HttpRequest(value)
    }
}

impl From<RpcContext> for FieldValue {
    fn from(value: RpcContext) -> Self {
        FieldValue::Rpc(value)
    }
}

impl From<Frame> for FieldValue {
    fn from(value: Frame) -> Self {
        FieldValue::Frame(value)
    }
}

/// One structured log event handed to a formatter.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    pub fields: Fields,
}

impl LogEntry {
    /// Create an entry stamped with the current time and no fields.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            fields: Fields::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}
