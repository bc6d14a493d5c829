//! Tree-drawing prefixes for nested flow logs

use serde::{Deserialize, Serialize};

/// Indent added per nesting level below the first
pub const TREE_INDENT: &str = "  ";

pub const TREE_START: &str = "┏━";
pub const TREE_MID: &str = "┣━";
pub const TREE_END: &str = "┗━";

/// Position of a log line within its flow's block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeKind {
    Start,
    #[default]
    Mid,
    End,
}

impl TreeKind {
    pub fn glyph(self) -> &'static str {
        match self {
            TreeKind::Start => TREE_START,
            TreeKind::Mid => TREE_MID,
            TreeKind::End => TREE_END,
        }
    }
}

/// Prefix for a line logged at `depth`.
///
/// Depth 0 (the root flow) and below get no prefix; deeper flows get
/// `depth - 1` indents followed by the glyph for `kind`.
pub fn tree_prefix(depth: i32, kind: TreeKind) -> String {
    if depth <= 0 {
        return String::new();
    }
    let mut prefix = TREE_INDENT.repeat((depth - 1) as usize);
    prefix.push_str(kind.glyph());
    prefix
}

pub fn flow_start_message(name: &str) -> String {
    format!("[flow start]: {}", name)
}

pub fn flow_end_message(name: &str) -> String {
    format!("[flow end]: {}", name)
}
