//! Error-reporting event schema.
//!
//! Mirrors the `ReportedErrorEvent` JSON accepted by the error reporting
//! ingestion: member names are case-sensitive and empty strings are left
//! out, while `serviceContext` and `context` are always written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::normalize::plain_string;
use crate::record::Frame;
use crate::request::HttpRequest;

/// Bag keys consumed by the event itself and never merged back.
///
/// Must follow the fields read in [`ReportedErrorEvent::build`].
pub const CONSUMED_KEYS: [&str; 6] = ["service", "version", "caller", "user", "stack", "message"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedErrorEvent {
    pub event_time: String,
    pub message: String,
    pub service_context: ServiceContext,
    pub context: ErrorContext,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceContext {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_request: Option<HttpRequestContext>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_location: Option<SourceLocation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestContext {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub method: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub referrer: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub remote_ip: String,
}

impl From<&HttpRequest> for HttpRequestContext {
    fn from(req: &HttpRequest) -> Self {
        HttpRequestContext {
            method: req.request_method.clone(),
            url: req.request_url.clone(),
            user_agent: req.user_agent.clone(),
            referrer: req.referer.clone(),
            remote_ip: req.remote_ip.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file_path: String,
    pub line_number: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub function_name: String,
}

impl From<Frame> for SourceLocation {
    fn from(frame: Frame) -> Self {
        SourceLocation {
            file_path: frame.file,
            line_number: frame.line,
            function_name: frame.function,
        }
    }
}

impl ReportedErrorEvent {
    /// Build the event for an entry from its normalized field bag.
    ///
    /// `caller` only becomes the report location when it decodes as a
    /// [`Frame`]. A `stack` field is appended to the message on its own line.
    pub fn build(
        timestamp: &str,
        message: &str,
        fields: &Map<String, Value>,
        http_request: Option<&HttpRequest>,
    ) -> Self {
        let text = |key: &str| fields.get(key).map(plain_string).unwrap_or_default();

        let mut message = message.to_string();
        if let Some(stack) = fields.get("stack") {
            message.push('\n');
            message.push_str(&plain_string(stack));
        }

        let report_location = fields
            .get("caller")
            .and_then(|caller| serde_json::from_value::<Frame>(caller.clone()).ok())
            .map(SourceLocation::from);

        ReportedErrorEvent {
            event_time: timestamp.to_string(),
            message,
            service_context: ServiceContext {
                service: text("service"),
                version: text("version"),
            },
            context: ErrorContext {
                http_request: http_request.map(HttpRequestContext::from),
                user: text("user"),
                report_location,
            },
        }
    }
}

/// Format a timestamp the way `time` and `eventTime` expect it.
pub fn format_time(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
