//! `file.copy_flow`: collect recently modified files of given types into one
//! directory

use super::status;
use crate::config::{DefaultParams, duration_from_secs};
use crate::workflow::{Flow, FlowContext, WorkflowUnit};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Walks `source_dir` recursively and copies every file whose extension is
/// listed in `file_type` into the flat `target_dir`.
///
/// Files older than `max_age_hours` are skipped (a negative value or null
/// disables the age filter). Files already present in the target are left
/// alone but still counted as handled.
#[derive(Default)]
pub struct CopyFlow;

#[derive(Debug)]
enum CopyEvent {
    Copied { from: PathBuf, to: PathBuf },
    Existing(PathBuf),
    Failed { from: PathBuf, error: String },
}

#[derive(Debug)]
struct CopyJob {
    source: PathBuf,
    target: PathBuf,
    extensions: Vec<String>,
    max_age: Option<Duration>,
}

impl CopyJob {
    fn matches(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let ext = ext.to_lowercase();
        self.extensions.iter().any(|wanted| *wanted == ext)
    }

    fn is_recent(&self, path: &Path, now: SystemTime) -> bool {
        let Some(max_age) = self.max_age else {
            return true;
        };
        let modified = match path.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => return false,
        };
        // Modification times in the future count as recent
        now.duration_since(modified).map_or(true, |age| age <= max_age)
    }

    fn collect(&self, dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.collect(&path, files)?;
            } else if path.is_file() && self.matches(&path) {
                files.push(path);
            }
        }
        Ok(())
    }

    fn execute(&self) -> std::io::Result<Vec<CopyEvent>> {
        std::fs::create_dir_all(&self.target)?;

        let mut files = Vec::new();
        self.collect(&self.source, &mut files)?;
        files.sort();

        let now = SystemTime::now();
        let mut events = Vec::new();
        for file in files.into_iter().filter(|f| self.is_recent(f, now)) {
            let Some(name) = file.file_name() else {
                continue;
            };
            let dest = self.target.join(name);
            if dest.exists() {
                events.push(CopyEvent::Existing(dest));
                continue;
            }
            match std::fs::copy(&file, &dest) {
                Ok(_) => events.push(CopyEvent::Copied { from: file, to: dest }),
                Err(e) => events.push(CopyEvent::Failed {
                    from: file,
                    error: e.to_string(),
                }),
            }
        }
        Ok(events)
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

#[async_trait]
impl WorkflowUnit for CopyFlow {
    async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
        let (Some(source), Some(target)) = (
            ctx.param_str("source_dir").filter(|s| !s.is_empty()),
            ctx.param_str("target_dir").filter(|s| !s.is_empty()),
        ) else {
            ctx.error("both 'source_dir' and 'target_dir' are required");
            return Ok(Some(status::failure("missing 'source_dir' or 'target_dir'")));
        };
        let source = PathBuf::from(shellexpand::tilde(&source).as_ref());
        let target = PathBuf::from(shellexpand::tilde(&target).as_ref());

        if !source.is_dir() {
            let message = format!("source directory {} does not exist", source.display());
            ctx.error(&message);
            return Ok(Some(status::failure(message)));
        }

        let extensions: Vec<String> = ctx
            .param_list("file_type")
            .iter()
            .map(|e| normalize_extension(e))
            .filter(|e| !e.is_empty())
            .collect();
        let max_age_hours = ctx.param_f64("max_age_hours", -1.0);
        let max_age = if max_age_hours < 0.0 {
            None
        } else {
            let Some(max_age) = duration_from_secs(max_age_hours * 3600.0) else {
                ctx.error(format!("'max_age_hours' of {} is out of range", max_age_hours));
                return Ok(Some(status::failure("invalid 'max_age_hours' parameter")));
            };
            Some(max_age)
        };

        ctx.log(format!("scanning {}", source.display()));
        ctx.log(format!("copying into {}", target.display()));
        ctx.log(format!("file types: {}", extensions.join(", ")));
        if max_age.is_some() {
            ctx.log(format!("only files modified in the last {} hours", max_age_hours));
        }

        let job = CopyJob {
            source,
            target: target.clone(),
            extensions,
            max_age,
        };
        let events = tokio::task::spawn_blocking(move || job.execute()).await??;

        let mut handled = 0usize;
        let mut failed = 0usize;
        for event in &events {
            match event {
                CopyEvent::Copied { from, to } => {
                    handled += 1;
                    ctx.log(format!("- copied {} -> {}", from.display(), to.display()));
                }
                CopyEvent::Existing(dest) => {
                    handled += 1;
                    ctx.log(format!("- skipped (already exists): {}", dest.display()));
                }
                CopyEvent::Failed { from, error } => {
                    failed += 1;
                    ctx.warn(format!("- failed to copy {}: {}", from.display(), error));
                }
            }
        }

        ctx.log(format!("copy finished, {} file(s) handled", handled));
        let record = if failed == 0 {
            status::success(format!("{} file(s) handled", handled))
        } else {
            status::failure(format!("{} file(s) failed to copy", failed))
        };
        Ok(Some(status::with_fields(
            record,
            json!({
                "handled": handled,
                "failed": failed,
                "target_dir": target.to_string_lossy(),
            }),
        )))
    }
}

impl Flow for CopyFlow {
    const NAME: &'static str = "file.copy_flow";
    const DESCRIPTION: &'static str = "Copy recent files of given types into one directory";

    fn defaults() -> DefaultParams {
        DefaultParams::base().extend(json!({
            "source_dir": null,
            "target_dir": null,
            "file_type": [".mp4", ".avi"],
            "max_age_hours": 24,
        }))
    }
}
