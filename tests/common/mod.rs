#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use tracing_cloud_log::{Formatter, JsonFormatter, Level, LogEntry};

/// In-memory writer shared between a logger and the test.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    /// Every written line parsed as a JSON object.
    pub fn json_lines(&self) -> Vec<Map<String, Value>> {
        self.contents()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap()
}

pub fn entry(level: Level, message: &str) -> LogEntry {
    LogEntry::new(level, message).with_timestamp(fixed_time())
}

/// Format with a fresh [`JsonFormatter`] and parse the single line back.
pub fn format_json(entry: &LogEntry) -> Map<String, Value> {
    let bytes = JsonFormatter::new().format(entry).unwrap();
    assert_eq!(bytes.last(), Some(&b'\n'));
    serde_json::from_slice(&bytes[..bytes.len() - 1]).unwrap()
}
