//! Structured JSON logging for cloud log ingestion and error reporting.
//!
//! Entries are enriched with deployment metadata (service and version from
//! the pod name) and request metadata (caller identity and correlation id
//! from RPC contexts), then shaped as line-delimited JSON. Error-class
//! entries are emitted as error-reporting events.

pub mod record;
pub mod request;
pub mod severity;
pub mod normalize;
pub mod error_event;
pub mod formatter;

pub mod hook;
pub mod logger;
pub mod layer;

pub mod env;
pub mod init;

pub use formatter::{FormatError, Formatter, JsonFormatter, TextFormatter};
pub use logger::{Entry, Logger};
pub use record::{FieldValue, Fields, Frame, Level, LogEntry};
pub use request::{HttpRequest, RpcContext};
