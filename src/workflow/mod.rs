//! Workflow execution engine for flowtree
//!
//! This module handles:
//! - The flow contract ([`WorkflowUnit`], [`Flow`]) and the [`FlowContext`]
//!   a running flow works through
//! - Name → flow lookup ([`FlowRegistry`])
//! - Recursive execution with scope, call-stack and depth tracking
//!   ([`WorkflowManager`])
//! - Tree-prefixed flow logging
//! - Top-level invocations from parameter maps or flow-data files
//! - The poll-and-dispatch loop behind trigger flows
//!
//! # Example
//!
//! ```ignore
//! use flowtree::workflow::{FlowRegistry, Invocation};
//! use flowtree::sink::{create_sink, OutputMode};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(FlowRegistry::builtin());
//! let invocation = Invocation::from_params(params)?;
//! let result = invocation
//!     .run(registry, create_sink(OutputMode::Console), Params::new())
//!     .await?;
//! ```

mod error;
mod invocation;
mod logger;
mod manager;
mod registry;
mod tree;
pub mod trigger;
mod unit;

pub use error::FlowError;
pub use invocation::{FLOW_DATA_KEY, FLOW_KEY, Invocation};
pub use logger::FlowLogger;
pub use manager::{FlowFuture, WorkflowManager};
pub use registry::{FlowDefinition, FlowRegistry, UnitFactory, normalize_flow_name};
pub use tree::{TREE_END, TREE_INDENT, TREE_MID, TREE_START, TreeKind, tree_prefix};
pub use unit::{Completion, Flow, FlowContext, WorkflowUnit};
