//! Built-in flows
//!
//! | Namespace | Flows |
//! |-----------|-------|
//! | `system`  | shell command, parameter printer, version check, flow-data runner |
//! | `git`     | status, fetch, pull, push, commit, reset, branch, clone, switch + update |
//! | `file`    | copy |
//! | `net`     | download |
//! | `trigger` | interval, at |
//! | `demo`    | nesting, parameters, shared context, background work, main tour |

pub mod copy;
pub mod demo;
pub mod download;
pub mod git;
pub mod shell;
pub mod status;
pub mod system;
pub mod trigger;

use crate::workflow::FlowRegistry;

/// Register every built-in flow
pub fn register_builtin(registry: &mut FlowRegistry) {
    registry
        .register::<shell::ShellFlow>()
        .register::<system::ParamPrinterFlow>()
        .register::<system::VersionCheckFlow>()
        .register::<system::FlowDataFlow>();

    registry
        .register::<git::GitStatusFlow>()
        .register::<git::GitFetchFlow>()
        .register::<git::GitPullFlow>()
        .register::<git::GitPushFlow>()
        .register::<git::GitCommitFlow>()
        .register::<git::GitResetFlow>()
        .register::<git::GitBranchFlow>()
        .register::<git::GitCloneFlow>()
        .register::<git::GitSwitchUpdateFlow>();

    registry
        .register::<copy::CopyFlow>()
        .register::<download::DownloadFlow>();

    registry
        .register::<trigger::IntervalTriggerFlow>()
        .register::<trigger::AtTriggerFlow>();

    registry
        .register::<demo::NestFlow>()
        .register::<demo::ParameterFlow>()
        .register::<demo::SharedContextFlow>()
        .register::<demo::AsyncFlow>()
        .register::<demo::MainTestFlow>();
}
