//! Depth-bound handle for emitting flow log lines

use super::tree::{TreeKind, tree_prefix};
use crate::sink::{LogLevel, LogRecord, LogSink};
use std::sync::Arc;

/// Emits tree-prefixed lines at a fixed depth.
///
/// Cheap to clone and `'static`, so background tasks spawned by a flow can
/// keep logging after the flow itself has returned.
#[derive(Clone)]
pub struct FlowLogger {
    sink: Arc<dyn LogSink>,
    depth: i32,
    flow: Option<Arc<str>>,
}

impl FlowLogger {
    pub fn new(sink: Arc<dyn LogSink>, depth: i32, flow: Option<&str>) -> Self {
        Self {
            sink,
            depth,
            flow: flow.map(Arc::from),
        }
    }

    pub fn depth(&self) -> i32 {
        self.depth
    }

    pub fn log_as(&self, kind: TreeKind, level: LogLevel, message: impl AsRef<str>) {
        let message = message.as_ref();
        let record = LogRecord {
            level,
            depth: self.depth,
            kind,
            flow: self.flow.as_deref().map(str::to_string),
            message: message.to_string(),
            line: format!("{}{}", tree_prefix(self.depth, kind), message),
        };
        self.sink.emit(&record);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log_as(TreeKind::Mid, LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log_as(TreeKind::Mid, LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log_as(TreeKind::Mid, LogLevel::Error, message);
    }
}
