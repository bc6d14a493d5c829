//! flowtree: tree-shaped workflow orchestration
//!
//! Flows are small async units that call each other as sub-flows. Each call
//! runs in a parameter scope chained to its caller's, so values set near the
//! root reach every descendant and `{{placeholders}}` resolve against the
//! whole chain. The manager tracks the call stack to reject cycles, logs the
//! call tree with depth prefixes, and contains failures so a broken sub-flow
//! never takes its siblings down.

pub mod cli;
pub mod config;
pub mod flows;
pub mod logging;
pub mod process;
pub mod retry;
pub mod settings;
pub mod signals;
pub mod sink;
pub mod suggest;
pub mod workflow;
