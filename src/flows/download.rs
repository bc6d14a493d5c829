//! `net.download_flow`: fetch a URL to a file with retries

use super::status;
use crate::config::{DefaultParams, duration_from_secs};
use crate::retry::RetryPolicy;
use crate::workflow::{Flow, FlowContext, FlowLogger, WorkflowUnit};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
enum DownloadError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server answered {0}")]
    Status(StatusCode),

    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            DownloadError::Status(code) => {
                code.is_server_error() || *code == StatusCode::TOO_MANY_REQUESTS
            }
            DownloadError::Io { .. } => false,
        }
    }
}

/// Last non-empty path segment of `url`, without query or fragment
fn file_name_from_url(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let after_scheme = without_query
        .split_once("://")
        .map_or(without_query, |(_, rest)| rest);
    let (_, path) = after_scheme.split_once('/')?;
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Where to save: `output_path` itself, or the URL's file name inside it when
/// it is a directory (or ends with a separator)
fn resolve_target(url: &str, output_path: Option<&str>) -> Option<PathBuf> {
    let name = file_name_from_url(url);
    match output_path.filter(|p| !p.is_empty()) {
        None => name.map(PathBuf::from),
        Some(raw) => {
            let path = PathBuf::from(shellexpand::tilde(raw).as_ref());
            if path.is_dir() || raw.ends_with('/') || raw.ends_with('\\') {
                name.map(|n| path.join(n))
            } else {
                Some(path)
            }
        }
    }
}

fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("flowtree/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Stream `url` into `target` through a `.part` file; returns bytes written
async fn download_once(
    client: &reqwest::Client,
    url: &str,
    token: Option<&str>,
    target: &Path,
) -> Result<u64, DownloadError> {
    let mut request = client.get(url);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    let mut response = request.send().await?;
    if !response.status().is_success() {
        return Err(DownloadError::Status(response.status()));
    }

    let partial = target.with_extension(match target.extension() {
        Some(ext) => format!("{}.part", ext.to_string_lossy()),
        None => "part".to_string(),
    });
    let io_err = |source| DownloadError::Io {
        path: partial.clone(),
        source,
    };

    let mut file = tokio::fs::File::create(&partial).await.map_err(io_err)?;
    let streamed = async {
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_err)?;
        Ok::<_, DownloadError>(written)
    }
    .await;
    drop(file);

    let finished = match streamed {
        Ok(written) => tokio::fs::rename(&partial, target)
            .await
            .map(|()| written)
            .map_err(|source| DownloadError::Io {
                path: target.to_path_buf(),
                source,
            }),
        Err(e) => Err(e),
    };
    if finished.is_err() {
        let _ = tokio::fs::remove_file(&partial).await;
    }
    finished
}

async fn download(
    client: &reqwest::Client,
    policy: &RetryPolicy,
    url: &str,
    token: Option<&str>,
    target: &Path,
    logger: &FlowLogger,
) -> Result<u64, DownloadError> {
    policy
        .run(
            |attempt| {
                if attempt > 0 {
                    logger.warn(format!("retrying download ({}/{})", attempt, policy.max_retries));
                }
                download_once(client, url, token, target)
            },
            DownloadError::is_retryable,
        )
        .await
}

/// Downloads `url` into `output_path`.
///
/// Transient failures (timeouts, connection errors, 5xx and 429) are retried
/// `max_retries` times with exponential backoff starting at `retry_delay`
/// milliseconds. An existing target is kept unless `overwrite` is set.
#[derive(Default)]
pub struct DownloadFlow;

#[async_trait]
impl WorkflowUnit for DownloadFlow {
    async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
        let Some(url) = ctx.param_str("url").filter(|u| !u.trim().is_empty()) else {
            ctx.error("download flow needs a 'url' parameter");
            return Ok(Some(status::failure("missing 'url' parameter")));
        };
        let output_path = ctx.param_str("output_path");
        let Some(target) = resolve_target(&url, output_path.as_deref()) else {
            ctx.error(format!("cannot derive a file name from {}", url));
            return Ok(Some(status::failure("cannot determine output path")));
        };

        if target.exists() && !ctx.param_bool("overwrite", false) {
            ctx.log(format!("{} already exists, skipping", target.display()));
            return Ok(Some(status::with_fields(
                status::success("already downloaded"),
                json!({"path": target.to_string_lossy(), "skipped": true}),
            )));
        }
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let policy = RetryPolicy::from_params(
            ctx.param_i64("max_retries", 3),
            ctx.param_i64("retry_delay", 1000),
        );
        let Some(timeout) = duration_from_secs(ctx.param_f64("timeout", 300.0).max(1.0)) else {
            ctx.error("'timeout' is out of range");
            return Ok(Some(status::failure("invalid 'timeout' parameter")));
        };
        let client = http_client(timeout)?;
        let token = ctx.param_str("bearer_token").filter(|t| !t.is_empty());
        let logger = ctx.logger();

        ctx.log(format!("downloading {} -> {}", url, target.display()));
        match download(&client, &policy, &url, token.as_deref(), &target, &logger).await {
            Ok(bytes) => {
                ctx.log(format!("downloaded {} bytes", bytes));
                Ok(Some(status::with_fields(
                    status::success("download finished"),
                    json!({"path": target.to_string_lossy(), "bytes": bytes}),
                )))
            }
            Err(e) => {
                ctx.error(format!("download failed: {}", e));
                Ok(Some(status::failure(format!("download failed: {}", e))))
            }
        }
    }
}

impl Flow for DownloadFlow {
    const NAME: &'static str = "net.download_flow";
    const DESCRIPTION: &'static str = "Download a URL to a file, retrying transient failures";

    fn defaults() -> DefaultParams {
        DefaultParams::base().extend(json!({
            "url": null,
            "output_path": null,
            "bearer_token": null,
            "overwrite": false,
            "max_retries": 3,
            "retry_delay": 1000,
            "timeout": 300,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Serve each canned response to one connection, in order
    async fn serve(responses: Vec<&'static str>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}/files/data.bin", addr)
    }

    fn local_client() -> reqwest::Client {
        reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap()
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            jitter: false,
            ..Default::default()
        }
    }

    fn logger(sink: &MemorySink) -> FlowLogger {
        FlowLogger::new(Arc::new(sink.clone()), 0, Some("net.download_flow"))
    }

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name_from_url("https://host/a/b/video.mp4?x=1"),
            Some("video.mp4".into())
        );
        assert_eq!(file_name_from_url("https://host/a/dir/"), Some("dir".into()));
        assert_eq!(file_name_from_url("https://host"), None);
    }

    #[test]
    fn test_resolve_target() {
        let dir = TempDir::new().unwrap();
        let into_dir = resolve_target(
            "https://host/f.zip",
            Some(dir.path().to_str().unwrap()),
        )
        .unwrap();
        assert_eq!(into_dir, dir.path().join("f.zip"));

        let explicit = resolve_target("https://host/f.zip", Some("/tmp/out.zip")).unwrap();
        assert_eq!(explicit, PathBuf::from("/tmp/out.zip"));

        assert!(resolve_target("https://host", None).is_none());
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(DownloadError::Status(StatusCode::BAD_GATEWAY).is_retryable());
        assert!(DownloadError::Status(StatusCode::TOO_MANY_REQUESTS).is_retryable());
        assert!(!DownloadError::Status(StatusCode::NOT_FOUND).is_retryable());
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let url = serve(vec![
            "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
        ])
        .await;
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("data.bin");
        let sink = MemorySink::new();

        let bytes = download(&local_client(), &fast_policy(0), &url, None, &target, &logger(&sink))
            .await
            .unwrap();

        assert_eq!(bytes, 5);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello");
        assert!(!dir.path().join("data.bin.part").exists());
    }

    #[tokio::test]
    async fn test_truncated_body_leaves_no_partial_file() {
        let url = serve(vec![
            "HTTP/1.1 200 OK\r\nContent-Length: 10\r\nConnection: close\r\n\r\nhel",
        ])
        .await;
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("data.bin");
        let sink = MemorySink::new();

        let err = download(&local_client(), &fast_policy(0), &url, None, &target, &logger(&sink))
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Request(_)));
        assert!(!target.exists());
        assert!(!dir.path().join("data.bin.part").exists());
    }

    #[tokio::test]
    async fn test_out_of_range_timeout_is_a_failure() {
        use crate::config::{Params, to_params};
        use crate::workflow::{FlowRegistry, WorkflowManager};

        let dir = TempDir::new().unwrap();
        let sink = MemorySink::new();
        let mut manager = WorkflowManager::new(Arc::new(FlowRegistry::builtin()), Params::new())
            .with_sink(Arc::new(sink.clone()));
        let result = manager
            .run_named(
                "net.download_flow",
                to_params(json!({
                    "url": "http://127.0.0.1:9/file.txt",
                    "output_path": dir.path().join("file.txt").to_string_lossy(),
                    "timeout": "inf",
                })),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(status::status_of(&result), Some(status::ERROR));
        assert!(sink.contains("'timeout' is out of range"));
    }

    #[tokio::test]
    async fn test_download_retries_server_errors() {
        let url = serve(vec![
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
        ])
        .await;
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("data.bin");
        let sink = MemorySink::new();

        download(&local_client(), &fast_policy(2), &url, None, &target, &logger(&sink))
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "ok");
        assert!(sink.contains("retrying download (1/2)"));
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let url = serve(vec![
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        ])
        .await;
        let dir = TempDir::new().unwrap();
        let sink = MemorySink::new();

        let err = download(
            &local_client(),
            &fast_policy(3),
            &url,
            None,
            &dir.path().join("data.bin"),
            &logger(&sink),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DownloadError::Status(StatusCode::NOT_FOUND)));
        assert!(!sink.contains("retrying"));
    }

    #[tokio::test]
    async fn test_existing_target_is_skipped() {
        use crate::config::{Params, to_params};
        use crate::workflow::{FlowRegistry, WorkflowManager};

        let dir = TempDir::new().unwrap();
        let target = dir.path().join("have.txt");
        std::fs::write(&target, "x").unwrap();

        let sink = MemorySink::new();
        let mut manager = WorkflowManager::new(Arc::new(FlowRegistry::builtin()), Params::new())
            .with_sink(Arc::new(sink.clone()));
        let result = manager
            .run_named(
                "net.download_flow",
                to_params(json!({
                    "url": "http://127.0.0.1:9/have.txt",
                    "output_path": target.to_string_lossy(),
                })),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result["skipped"], json!(true));
        assert!(sink.contains("already exists, skipping"));
    }
}
