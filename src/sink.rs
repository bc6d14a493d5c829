//! Log sinks for flow output
//!
//! The manager renders every flow log line (tree prefix included) and hands it
//! to a [`LogSink`]. The hosting application decides where lines go: the
//! `tracing` subscriber, JSON lines on stdout, or nowhere but errors.

use crate::workflow::TreeKind;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Output mode for flow logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Console,
    Json,
    Quiet,
}

/// Severity of a flow log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One rendered flow log line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: LogLevel,
    /// Flow depth the line was logged at
    pub depth: i32,
    pub kind: TreeKind,
    /// Flow that logged the line, if any
    pub flow: Option<String>,
    /// Message without the tree prefix
    pub message: String,
    /// Message with the tree prefix
    pub line: String,
}

/// Receiver for flow log lines
pub trait LogSink: Send + Sync {
    fn emit(&self, record: &LogRecord);
}

/// Forwards lines to the `tracing` subscriber
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, record: &LogRecord) {
        match record.level {
            LogLevel::Info => tracing::info!("{}", record.line),
            LogLevel::Warn => tracing::warn!("{}", record.line),
            LogLevel::Error => tracing::error!("{}", record.line),
        }
    }
}

/// Prints one JSON object per line on stdout
pub struct JsonSink;

impl JsonSink {
    fn render(record: &LogRecord) -> serde_json::Result<String> {
        serde_json::to_string(record)
    }
}

impl LogSink for JsonSink {
    fn emit(&self, record: &LogRecord) {
        if let Ok(line) = Self::render(record) {
            println!("{}", line);
        }
    }
}

/// Drops everything except errors
pub struct QuietSink;

impl LogSink for QuietSink {
    fn emit(&self, record: &LogRecord) {
        if record.level == LogLevel::Error {
            tracing::error!("{}", record.line);
        }
    }
}

/// Keeps every record in memory
#[derive(Default, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Rendered lines, in emission order
    pub fn lines(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.line).collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.records().iter().any(|r| r.line.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn emit(&self, record: &LogRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}

/// Create a sink for the given output mode
pub fn create_sink(mode: OutputMode) -> Arc<dyn LogSink> {
    match mode {
        OutputMode::Console => Arc::new(TracingSink),
        OutputMode::Json => Arc::new(JsonSink),
        OutputMode::Quiet => Arc::new(QuietSink),
    }
}
