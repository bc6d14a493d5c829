//! `git.*` flows: thin wrappers around the git CLI
//!
//! Every flow validates `repository_path` (except clone), runs one git
//! command with `git -C <repo>`, logs its output and returns a status record
//! carrying `output` and `returncode`. `git.switch_update_flow` composes the
//! others as sub-flows.

use super::status;
use crate::config::{DefaultParams, to_params};
use crate::process::run_captured;
use crate::workflow::{Flow, FlowContext, WorkflowUnit};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};

/// Defaults shared by every repository flow
pub fn git_defaults() -> DefaultParams {
    DefaultParams::base().extend(json!({
        "repository_path": ".",
        "quiet": false,
    }))
}

/// Resolve and validate `repository_path`; the error is a failure record
fn repository(ctx: &FlowContext<'_>) -> Result<PathBuf, Value> {
    let raw = ctx
        .param_str("repository_path")
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| ".".to_string());
    let path = PathBuf::from(shellexpand::tilde(&raw).as_ref());

    if !path.exists() {
        let message = format!("repository path does not exist: {}", path.display());
        ctx.error(&message);
        return Err(status::failure(message));
    }
    // `.git` is a file in worktrees and submodules
    if !path.join(".git").exists() {
        let message = format!("{} is not a git repository", path.display());
        ctx.error(&message);
        return Err(status::failure(message));
    }
    Ok(path)
}

/// Run git with `args`, inside `repo` when given, and log its output
async fn run_git(ctx: &FlowContext<'_>, repo: Option<&Path>, args: &[String]) -> Value {
    let mut full: Vec<String> = Vec::with_capacity(args.len() + 2);
    if let Some(repo) = repo {
        full.push("-C".into());
        full.push(repo.to_string_lossy().into_owned());
    }
    full.extend(args.iter().cloned());

    ctx.log(format!("$ git {}", full.join(" ")));

    let arg_refs: Vec<&str> = full.iter().map(String::as_str).collect();
    let output = match run_captured("git", &arg_refs, None).await {
        Ok(output) => output,
        Err(e) => {
            ctx.error(format!("git failed to run: {}", e));
            return status::failure(format!("git failed to run: {}", e));
        }
    };

    let combined = output.combined();
    for line in combined.lines().filter(|l| !l.trim().is_empty()) {
        ctx.log(line.trim_end());
    }

    let returncode = output.exit_code.unwrap_or(-1);
    let record = if output.success() {
        status::success("git command succeeded")
    } else {
        status::failure(format!("git command failed with exit code {}", returncode))
    };
    status::with_fields(
        record,
        json!({
            "output": output.stdout.trim_end(),
            "returncode": returncode,
        }),
    )
}

fn push_flag(args: &mut Vec<String>, enabled: bool, flag: &str) {
    if enabled {
        args.push(flag.to_string());
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Run a sub-flow and treat a missing result as a failure
async fn step<F: Flow>(ctx: &mut FlowContext<'_>, params: Value) -> Value {
    match ctx.run::<F>(to_params(params)).await {
        Some(record) => record,
        None => status::failure(format!("{} produced no result", F::NAME)),
    }
}

// ----------------------------------------------------------------------
// status
// ----------------------------------------------------------------------

#[derive(Default)]
pub struct GitStatusFlow;

fn status_args(porcelain: bool, branch: bool, verbose: bool, ignore_submodules: bool) -> Vec<String> {
    let mut args = strings(&["status"]);
    push_flag(&mut args, porcelain, "--porcelain");
    push_flag(&mut args, branch, "--branch");
    push_flag(&mut args, verbose, "--verbose");
    push_flag(&mut args, ignore_submodules, "--ignore-submodules");
    args
}

#[async_trait]
impl WorkflowUnit for GitStatusFlow {
    async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
        let repo = match repository(ctx) {
            Ok(repo) => repo,
            Err(record) => return Ok(Some(record)),
        };
        let args = status_args(
            ctx.param_bool("porcelain", false),
            ctx.param_bool("branch", false),
            ctx.param_bool("verbose", false),
            ctx.param_bool("ignore_submodules", false),
        );

        let record = run_git(ctx, Some(&repo), &args).await;
        if status::is_success(&record) {
            ctx.set_shared_value("status_repository", repo.to_string_lossy().into_owned());
            ctx.set_shared_value("status_result", record["output"].clone());
        }
        Ok(Some(record))
    }
}

impl Flow for GitStatusFlow {
    const NAME: &'static str = "git.status_flow";
    const DESCRIPTION: &'static str = "Show the working tree status of a repository";

    fn defaults() -> DefaultParams {
        git_defaults().extend(json!({
            "porcelain": false,
            "branch": false,
            "verbose": false,
            "ignore_submodules": false,
        }))
    }
}

// ----------------------------------------------------------------------
// fetch
// ----------------------------------------------------------------------

#[derive(Default)]
pub struct GitFetchFlow;

#[async_trait]
impl WorkflowUnit for GitFetchFlow {
    async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
        let repo = match repository(ctx) {
            Ok(repo) => repo,
            Err(record) => return Ok(Some(record)),
        };

        let mut args = strings(&["fetch"]);
        if ctx.param_bool("all", false) {
            args.push("--all".into());
        } else {
            args.push(ctx.param_str("remote").unwrap_or_else(|| "origin".into()));
        }
        push_flag(&mut args, ctx.param_bool("quiet", false), "--quiet");

        Ok(Some(run_git(ctx, Some(&repo), &args).await))
    }
}

impl Flow for GitFetchFlow {
    const NAME: &'static str = "git.fetch_flow";
    const DESCRIPTION: &'static str = "Fetch updates from a remote";

    fn defaults() -> DefaultParams {
        git_defaults().extend(json!({"remote": "origin", "all": false}))
    }
}

// ----------------------------------------------------------------------
// pull / push
// ----------------------------------------------------------------------

#[derive(Default)]
pub struct GitPullFlow;

fn pull_args(branch: Option<&str>, rebase: bool, ff_only: bool, quiet: bool) -> Vec<String> {
    let mut args = strings(&["pull"]);
    if let Some(branch) = branch {
        args.push("origin".into());
        args.push(branch.into());
    }
    push_flag(&mut args, rebase, "--rebase");
    push_flag(&mut args, ff_only, "--ff-only");
    push_flag(&mut args, quiet, "--quiet");
    args
}

#[async_trait]
impl WorkflowUnit for GitPullFlow {
    async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
        let repo = match repository(ctx) {
            Ok(repo) => repo,
            Err(record) => return Ok(Some(record)),
        };
        let branch = ctx.param_str("branch").filter(|b| !b.is_empty());
        let args = pull_args(
            branch.as_deref(),
            ctx.param_bool("rebase", false),
            ctx.param_bool("ff_only", false),
            ctx.param_bool("quiet", false),
        );

        let record = run_git(ctx, Some(&repo), &args).await;
        if status::is_success(&record) {
            ctx.set_shared_value("pulled_repository", repo.to_string_lossy().into_owned());
            if let Some(branch) = branch {
                ctx.set_shared_value("pulled_branch", branch);
            }
        }
        Ok(Some(record))
    }
}

impl Flow for GitPullFlow {
    const NAME: &'static str = "git.pull_flow";
    const DESCRIPTION: &'static str = "Pull the current or a named branch";

    fn defaults() -> DefaultParams {
        git_defaults().extend(json!({"branch": null, "rebase": false, "ff_only": false}))
    }
}

#[derive(Default)]
pub struct GitPushFlow;

fn push_args(
    remote: &str,
    branch: Option<&str>,
    force: bool,
    set_upstream: bool,
    quiet: bool,
) -> Vec<String> {
    let mut args = strings(&["push"]);
    push_flag(&mut args, force, "--force");
    push_flag(&mut args, set_upstream, "--set-upstream");
    push_flag(&mut args, quiet, "--quiet");
    args.push(remote.into());
    if let Some(branch) = branch {
        args.push(branch.into());
    }
    args
}

#[async_trait]
impl WorkflowUnit for GitPushFlow {
    async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
        let repo = match repository(ctx) {
            Ok(repo) => repo,
            Err(record) => return Ok(Some(record)),
        };
        let remote = ctx.param_str("remote").unwrap_or_else(|| "origin".into());
        let branch = ctx.param_str("branch").filter(|b| !b.is_empty());
        let args = push_args(
            &remote,
            branch.as_deref(),
            ctx.param_bool("force", false),
            ctx.param_bool("set_upstream", false),
            ctx.param_bool("quiet", false),
        );

        let record = run_git(ctx, Some(&repo), &args).await;
        if status::is_success(&record) {
            ctx.set_shared_value("pushed_repository", repo.to_string_lossy().into_owned());
            ctx.set_shared_value("pushed_remote", remote);
            if let Some(branch) = branch {
                ctx.set_shared_value("pushed_branch", branch);
            }
        }
        Ok(Some(record))
    }
}

impl Flow for GitPushFlow {
    const NAME: &'static str = "git.push_flow";
    const DESCRIPTION: &'static str = "Push to a remote";

    fn defaults() -> DefaultParams {
        git_defaults().extend(json!({
            "branch": null,
            "remote": "origin",
            "force": false,
            "set_upstream": false,
        }))
    }
}

// ----------------------------------------------------------------------
// commit
// ----------------------------------------------------------------------

#[derive(Default)]
pub struct GitCommitFlow;

struct CommitOptions<'a> {
    message: Option<&'a str>,
    amend: bool,
    quiet: bool,
    allow_empty: bool,
    no_verify: bool,
}

fn commit_args(options: &CommitOptions<'_>) -> Result<Vec<String>, String> {
    if options.message.is_none() && !options.amend {
        return Err("a commit message is required unless amending".into());
    }

    let mut args = strings(&["commit"]);
    push_flag(&mut args, options.amend, "--amend");
    push_flag(&mut args, options.quiet, "--quiet");
    push_flag(&mut args, options.allow_empty, "--allow-empty");
    push_flag(&mut args, options.no_verify, "--no-verify");
    match options.message {
        Some(message) => {
            args.push("-m".into());
            args.push(message.into());
        }
        None => args.push("--no-edit".into()),
    }
    Ok(args)
}

#[async_trait]
impl WorkflowUnit for GitCommitFlow {
    async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
        let repo = match repository(ctx) {
            Ok(repo) => repo,
            Err(record) => return Ok(Some(record)),
        };
        let message = ctx.param_str("message").filter(|m| !m.trim().is_empty());
        let options = CommitOptions {
            message: message.as_deref(),
            amend: ctx.param_bool("amend", false),
            quiet: ctx.param_bool("quiet", false),
            allow_empty: ctx.param_bool("allow_empty", false),
            no_verify: ctx.param_bool("no_verify", false),
        };
        let args = match commit_args(&options) {
            Ok(args) => args,
            Err(message) => {
                ctx.error(&message);
                return Ok(Some(status::failure(message)));
            }
        };

        if ctx.param_bool("add_all", false) {
            ctx.log("staging all changes");
            let added = run_git(ctx, Some(&repo), &strings(&["add", "--all"])).await;
            if !status::is_success(&added) {
                ctx.error("failed to stage changes");
                return Ok(Some(added));
            }
        }

        let record = run_git(ctx, Some(&repo), &args).await;
        if status::is_success(&record) {
            ctx.set_shared_value("committed_repository", repo.to_string_lossy().into_owned());
            if let Some(message) = &message {
                ctx.set_shared_value("commit_message", message.clone());
            }
        }
        Ok(Some(record))
    }
}

impl Flow for GitCommitFlow {
    const NAME: &'static str = "git.commit_flow";
    const DESCRIPTION: &'static str = "Commit staged (or all) changes";

    fn defaults() -> DefaultParams {
        git_defaults().extend(json!({
            "message": "",
            "add_all": false,
            "amend": false,
            "allow_empty": false,
            "no_verify": false,
        }))
    }
}

// ----------------------------------------------------------------------
// reset
// ----------------------------------------------------------------------

#[derive(Default)]
pub struct GitResetFlow;

const RESET_TYPES: &[&str] = &["soft", "mixed", "hard", "merge", "keep"];

#[async_trait]
impl WorkflowUnit for GitResetFlow {
    async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
        let repo = match repository(ctx) {
            Ok(repo) => repo,
            Err(record) => return Ok(Some(record)),
        };
        let reset_type = ctx.param_str("reset_type").unwrap_or_else(|| "hard".into());
        if !RESET_TYPES.contains(&reset_type.as_str()) {
            let message = format!("unsupported reset type '{}'", reset_type);
            ctx.error(&message);
            return Ok(Some(status::failure(message)));
        }
        let target = ctx.param_str("target").unwrap_or_else(|| "HEAD".into());

        let mut args = vec!["reset".to_string(), format!("--{}", reset_type), target];
        push_flag(&mut args, ctx.param_bool("quiet", false), "--quiet");

        Ok(Some(run_git(ctx, Some(&repo), &args).await))
    }
}

impl Flow for GitResetFlow {
    const NAME: &'static str = "git.reset_flow";
    const DESCRIPTION: &'static str = "Reset the current branch to a target";

    fn defaults() -> DefaultParams {
        git_defaults().extend(json!({"reset_type": "hard", "target": "HEAD"}))
    }
}

// ----------------------------------------------------------------------
// branch
// ----------------------------------------------------------------------

#[derive(Default)]
pub struct GitBranchFlow;

#[derive(Debug, Default)]
struct BranchOptions {
    operation: String,
    branch_name: Option<String>,
    remote: bool,
    track_remote: bool,
    remote_branch: Option<String>,
    force: bool,
}

fn branch_args(options: &BranchOptions) -> Result<Vec<String>, String> {
    let name = || {
        options
            .branch_name
            .clone()
            .ok_or_else(|| format!("operation '{}' needs 'branch_name'", options.operation))
    };

    let args = match options.operation.as_str() {
        "list" => {
            let mut args = strings(&["branch"]);
            push_flag(&mut args, options.remote, "-r");
            args.push("--list".into());
            if let Some(name) = &options.branch_name {
                args.push(name.clone());
            }
            args
        }
        "check" => {
            let name = name()?;
            if options.remote {
                vec!["branch".into(), "-r".into(), "--list".into(), format!("origin/{}", name)]
            } else {
                vec!["branch".into(), "--list".into(), name]
            }
        }
        "create" => {
            let mut args = vec!["checkout".into(), "-b".into(), name()?];
            if options.track_remote {
                if let Some(remote_branch) = &options.remote_branch {
                    args.push(remote_branch.clone());
                }
            }
            args
        }
        "delete" => {
            let flag = if options.force { "-D" } else { "-d" };
            vec!["branch".into(), flag.into(), name()?]
        }
        "checkout" | "switch" => vec!["checkout".into(), name()?],
        other => return Err(format!("unsupported branch operation '{}'", other)),
    };
    Ok(args)
}

#[async_trait]
impl WorkflowUnit for GitBranchFlow {
    async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
        let repo = match repository(ctx) {
            Ok(repo) => repo,
            Err(record) => return Ok(Some(record)),
        };
        let options = BranchOptions {
            operation: ctx.param_str("operation").unwrap_or_else(|| "list".into()),
            branch_name: ctx.param_str("branch_name").filter(|b| !b.is_empty()),
            remote: ctx.param_bool("remote", false),
            track_remote: ctx.param_bool("track_remote", false),
            remote_branch: ctx.param_str("remote_branch").filter(|b| !b.is_empty()),
            force: ctx.param_bool("force", false),
        };

        match branch_args(&options) {
            Ok(args) => Ok(Some(run_git(ctx, Some(&repo), &args).await)),
            Err(message) => {
                ctx.error(&message);
                Ok(Some(status::failure(message)))
            }
        }
    }
}

impl Flow for GitBranchFlow {
    const NAME: &'static str = "git.branch_flow";
    const DESCRIPTION: &'static str = "List, check, create, delete or check out branches";

    fn defaults() -> DefaultParams {
        git_defaults().extend(json!({
            "operation": "list",
            "branch_name": null,
            "remote": false,
            "track_remote": false,
            "remote_branch": null,
            "force": false,
        }))
    }
}

// ----------------------------------------------------------------------
// clone
// ----------------------------------------------------------------------

#[derive(Default)]
pub struct GitCloneFlow;

/// Directory name git would pick for `url`
fn default_clone_dir(url: &str) -> String {
    let name = url
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(url);
    name.strip_suffix(".git").unwrap_or(name).to_string()
}

#[async_trait]
impl WorkflowUnit for GitCloneFlow {
    async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
        let Some(url) = ctx.param_str("repository_url").filter(|u| !u.trim().is_empty()) else {
            ctx.error("'repository_url' is required");
            return Ok(Some(status::failure("missing 'repository_url' parameter")));
        };
        let target = match ctx.param_str("target_directory").filter(|d| !d.is_empty()) {
            Some(dir) => shellexpand::tilde(&dir).into_owned(),
            None => {
                let dir = default_clone_dir(&url);
                ctx.log(format!("no target directory given, using {}", dir));
                dir
            }
        };
        let branch = ctx.param_str("branch").filter(|b| !b.is_empty());

        let mut args = strings(&["clone"]);
        if let Some(branch) = &branch {
            args.push("--branch".into());
            args.push(branch.clone());
        }
        if let Some(depth) = ctx.get_param("depth").and_then(|d| crate::config::value_as_i64(&d)) {
            if depth > 0 {
                args.push("--depth".into());
                args.push(depth.to_string());
            }
        }
        push_flag(&mut args, ctx.param_bool("quiet", false), "--quiet");
        args.push(url.clone());
        args.push(target.clone());

        if Path::new(&target).exists() {
            ctx.warn(format!("target directory {} already exists", target));
            ctx.set_shared_value("clone_warning", format!("{} already exists", target));
        }

        let record = run_git(ctx, None, &args).await;
        if status::is_success(&record) {
            ctx.set_shared_value("cloned_repository", url.clone());
            ctx.set_shared_value("cloned_directory", target.clone());
            if let Some(branch) = &branch {
                ctx.set_shared_value("cloned_branch", branch.clone());
            }
        }
        Ok(Some(status::with_fields(
            record,
            json!({"repository_url": url, "target_directory": target}),
        )))
    }
}

impl Flow for GitCloneFlow {
    const NAME: &'static str = "git.clone_flow";
    const DESCRIPTION: &'static str = "Clone a repository";

    fn defaults() -> DefaultParams {
        DefaultParams::base().extend(json!({
            "repository_url": "",
            "target_directory": "",
            "branch": null,
            "depth": null,
            "quiet": false,
        }))
    }
}

// ----------------------------------------------------------------------
// switch + update
// ----------------------------------------------------------------------

/// Discard local changes, switch to `target_branch` and hard-reset it to
/// its remote counterpart.
#[derive(Default)]
pub struct GitSwitchUpdateFlow;

/// Whether a `git status --porcelain` line concerns submodule bookkeeping
fn is_submodule_change(line: &str) -> bool {
    let Some(path) = line.get(3..).map(str::trim) else {
        return false;
    };
    path == ".gitmodules" || path.ends_with("/.git") || path.to_lowercase().contains("submodule")
}

impl GitSwitchUpdateFlow {
    async fn discard_changes(
        ctx: &mut FlowContext<'_>,
        repo: &str,
        preserve_submodules: bool,
        quiet: bool,
    ) -> Value {
        let record = step::<GitStatusFlow>(
            ctx,
            json!({"repository_path": repo, "porcelain": true, "quiet": quiet}),
        )
        .await;
        if !status::is_success(&record) {
            return record;
        }

        let output = record["output"].as_str().unwrap_or_default().to_string();
        let changes: Vec<&str> = output
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter(|l| !preserve_submodules || !is_submodule_change(l))
            .collect();

        if changes.is_empty() {
            ctx.log("working tree clean, nothing to discard");
            return status::success("working tree clean");
        }

        ctx.log(format!("discarding {} local change(s)", changes.len()));
        for change in &changes {
            ctx.log(format!("  - {}", change));
        }

        step::<GitResetFlow>(
            ctx,
            json!({
                "repository_path": repo,
                "reset_type": "hard",
                "target": "HEAD",
                "quiet": quiet,
            }),
        )
        .await
    }

    async fn switch_branch(ctx: &mut FlowContext<'_>, repo: &str, branch: &str, quiet: bool) -> Value {
        let local = step::<GitBranchFlow>(
            ctx,
            json!({
                "repository_path": repo,
                "operation": "check",
                "branch_name": branch,
                "remote": false,
                "quiet": quiet,
            }),
        )
        .await;
        if !status::is_success(&local) {
            return local;
        }

        let exists_locally = local["output"]
            .as_str()
            .is_some_and(|out| out.lines().any(|l| l.trim_start_matches(['*', ' ']) == branch));

        let checkout = if exists_locally {
            ctx.log(format!("local branch {} exists, checking it out", branch));
            json!({
                "repository_path": repo,
                "operation": "checkout",
                "branch_name": branch,
                "quiet": quiet,
            })
        } else {
            let remote = step::<GitBranchFlow>(
                ctx,
                json!({
                    "repository_path": repo,
                    "operation": "check",
                    "branch_name": branch,
                    "remote": true,
                    "quiet": quiet,
                }),
            )
            .await;
            if !status::is_success(&remote) {
                return remote;
            }
            let remote_name = format!("origin/{}", branch);
            let exists_remotely = remote["output"]
                .as_str()
                .is_some_and(|out| out.lines().any(|l| l.trim() == remote_name));
            if !exists_remotely {
                let message = format!("branch {} does not exist", branch);
                ctx.error(&message);
                return status::failure(message);
            }

            ctx.log(format!("creating local branch {} tracking {}", branch, remote_name));
            json!({
                "repository_path": repo,
                "operation": "create",
                "branch_name": branch,
                "track_remote": true,
                "remote_branch": remote_name,
                "quiet": quiet,
            })
        };

        step::<GitBranchFlow>(ctx, checkout).await
    }

    async fn update(ctx: &mut FlowContext<'_>, repo: &str, branch: &str, quiet: bool) -> Value {
        let fetched = step::<GitFetchFlow>(
            ctx,
            json!({"repository_path": repo, "remote": "origin", "all": false, "quiet": quiet}),
        )
        .await;
        if !status::is_success(&fetched) {
            return fetched;
        }

        step::<GitResetFlow>(
            ctx,
            json!({
                "repository_path": repo,
                "reset_type": "hard",
                "target": format!("origin/{}", branch),
                "quiet": quiet,
            }),
        )
        .await
    }
}

#[async_trait]
impl WorkflowUnit for GitSwitchUpdateFlow {
    async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
        let repo = match repository(ctx) {
            Ok(repo) => repo.to_string_lossy().into_owned(),
            Err(record) => return Ok(Some(record)),
        };
        let branch = ctx.param_str("target_branch").unwrap_or_else(|| "main".into());
        let preserve_submodules = ctx.param_bool("preserve_submodules", true);
        let update_after_switch = ctx.param_bool("update_after_switch", true);
        let quiet = ctx.param_bool("quiet", false);

        ctx.log("step 1: discard local changes");
        let discarded = Self::discard_changes(ctx, &repo, preserve_submodules, quiet).await;
        if !status::is_success(&discarded) {
            return Ok(Some(discarded));
        }

        ctx.log(format!("step 2: switch to {}", branch));
        let switched = Self::switch_branch(ctx, &repo, &branch, quiet).await;
        if !status::is_success(&switched) {
            return Ok(Some(switched));
        }

        if update_after_switch {
            ctx.log("step 3: update to the remote head");
            let updated = Self::update(ctx, &repo, &branch, quiet).await;
            if !status::is_success(&updated) {
                return Ok(Some(updated));
            }
        }

        Ok(Some(status::with_fields(
            status::success(format!("switched to {}", branch)),
            json!({
                "operation": "switch_update",
                "target_branch": branch,
                "preserved_submodules": preserve_submodules,
                "updated": update_after_switch,
                "repository_path": repo,
            }),
        )))
    }
}

impl Flow for GitSwitchUpdateFlow {
    const NAME: &'static str = "git.switch_update_flow";
    const DESCRIPTION: &'static str = "Discard changes, switch branch and update it";

    fn defaults() -> DefaultParams {
        git_defaults().extend(json!({
            "target_branch": "main",
            "preserve_submodules": true,
            "update_after_switch": true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Params;
    use crate::sink::MemorySink;
    use crate::workflow::{FlowRegistry, WorkflowManager};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn manager(sink: &MemorySink) -> WorkflowManager {
        WorkflowManager::new(Arc::new(FlowRegistry::builtin()), Params::new())
            .with_sink(Arc::new(sink.clone()))
    }

    #[test]
    fn test_status_args() {
        assert_eq!(status_args(false, false, false, false), vec!["status"]);
        assert_eq!(
            status_args(true, true, false, true),
            vec!["status", "--porcelain", "--branch", "--ignore-submodules"]
        );
    }

    #[test]
    fn test_pull_and_push_args() {
        assert_eq!(
            pull_args(Some("dev"), true, false, false),
            vec!["pull", "origin", "dev", "--rebase"]
        );
        assert_eq!(
            push_args("origin", Some("main"), false, true, false),
            vec!["push", "--set-upstream", "origin", "main"]
        );
        assert_eq!(push_args("upstream", None, true, false, false), vec!["push", "--force", "upstream"]);
    }

    #[test]
    fn test_commit_args() {
        let options = CommitOptions {
            message: Some("fix: things"),
            amend: false,
            quiet: false,
            allow_empty: true,
            no_verify: false,
        };
        assert_eq!(
            commit_args(&options).unwrap(),
            vec!["commit", "--allow-empty", "-m", "fix: things"]
        );

        let amend = CommitOptions {
            message: None,
            amend: true,
            quiet: false,
            allow_empty: false,
            no_verify: true,
        };
        assert_eq!(
            commit_args(&amend).unwrap(),
            vec!["commit", "--amend", "--no-verify", "--no-edit"]
        );

        let neither = CommitOptions {
            message: None,
            amend: false,
            quiet: false,
            allow_empty: false,
            no_verify: false,
        };
        assert!(commit_args(&neither).is_err());
    }

    #[test]
    fn test_branch_args() {
        let check_remote = BranchOptions {
            operation: "check".into(),
            branch_name: Some("dev".into()),
            remote: true,
            ..Default::default()
        };
        assert_eq!(
            branch_args(&check_remote).unwrap(),
            vec!["branch", "-r", "--list", "origin/dev"]
        );

        let create = BranchOptions {
            operation: "create".into(),
            branch_name: Some("dev".into()),
            track_remote: true,
            remote_branch: Some("origin/dev".into()),
            ..Default::default()
        };
        assert_eq!(
            branch_args(&create).unwrap(),
            vec!["checkout", "-b", "dev", "origin/dev"]
        );

        let delete = BranchOptions {
            operation: "delete".into(),
            branch_name: Some("old".into()),
            force: true,
            ..Default::default()
        };
        assert_eq!(branch_args(&delete).unwrap(), vec!["branch", "-D", "old"]);

        let list = BranchOptions {
            operation: "list".into(),
            ..Default::default()
        };
        assert_eq!(branch_args(&list).unwrap(), vec!["branch", "--list"]);

        let missing_name = BranchOptions {
            operation: "checkout".into(),
            ..Default::default()
        };
        assert!(branch_args(&missing_name).is_err());

        let unknown = BranchOptions {
            operation: "rename".into(),
            ..Default::default()
        };
        assert!(branch_args(&unknown).is_err());
    }

    #[test]
    fn test_default_clone_dir() {
        assert_eq!(default_clone_dir("https://github.com/a/tool.git"), "tool");
        assert_eq!(default_clone_dir("git@github.com:a/tool.git"), "tool");
        assert_eq!(default_clone_dir("https://example.com/repo/"), "repo");
    }

    #[test]
    fn test_submodule_detection() {
        assert!(is_submodule_change(" M .gitmodules"));
        assert!(is_submodule_change(" M libs/submodule-a"));
        assert!(!is_submodule_change(" M src/main.rs"));
        assert!(!is_submodule_change("M"));
    }

    #[tokio::test]
    async fn test_missing_repository_is_error_record() {
        let sink = MemorySink::new();
        let mut manager = manager(&sink);

        let result = manager
            .run_named(
                "git.status_flow",
                crate::config::to_params(json!({"repository_path": "/definitely/not/here"})),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(status::status_of(&result), Some(status::ERROR));
        assert!(sink.contains("repository path does not exist"));
    }

    #[tokio::test]
    async fn test_plain_directory_is_not_repository() {
        let dir = TempDir::new().unwrap();
        let sink = MemorySink::new();
        let mut manager = manager(&sink);

        let result = manager
            .run_named(
                "git.reset_flow",
                crate::config::to_params(json!({"repository_path": dir.path().to_string_lossy()})),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(status::status_of(&result), Some(status::ERROR));
        assert!(sink.contains("is not a git repository"));
    }

    #[tokio::test]
    async fn test_status_in_fresh_repository() {
        let dir = TempDir::new().unwrap();
        let init = run_captured("git", &["init", "--quiet"], Some(dir.path())).await;
        if !init.map(|o| o.success()).unwrap_or(false) {
            // git not installed
            return;
        }
        std::fs::write(dir.path().join("new.txt"), "hi").unwrap();

        let sink = MemorySink::new();
        let mut manager = manager(&sink);
        let result = manager
            .run_named(
                "git.status_flow",
                crate::config::to_params(json!({
                    "repository_path": dir.path().to_string_lossy(),
                    "porcelain": true,
                })),
            )
            .await
            .unwrap()
            .unwrap();

        assert!(status::is_success(&result));
        assert!(result["output"].as_str().unwrap().contains("?? new.txt"));
        assert!(manager.shared().get("status_result").is_some());
    }
}
