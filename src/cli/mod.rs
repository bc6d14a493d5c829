//! CLI module for flowtree
//!
//! This module provides:
//! - Command implementations (run, file, list, show)
//! - Parsing of `--key value` flow parameters
//!
//! # Example
//!
//! ```ignore
//! use flowtree::cli::{CommandContext, run_flow};
//!
//! let code = run_flow("system.shell_flow", &["--cmd".into(), "ls".into()], &ctx).await?;
//! ```

pub mod args;
pub mod commands;

pub use args::{CliError, parse_flow_args};
pub use commands::{
    CommandContext, EXIT_INTERRUPTED, EXIT_USAGE, list_flows, run_file, run_flow, show_flow,
};
