use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging options collected from flags and settings
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub debug: bool,
    pub quiet: bool,
    /// Level from the settings file, used when neither flag is given
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

impl LogOptions {
    fn filter(&self) -> EnvFilter {
        let level = if self.debug {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.level.as_deref().unwrap_or("info")
        };
        EnvFilter::try_new(format!("flowtree={}", level)).unwrap_or_else(|e| {
            eprintln!("invalid log level '{}': {}, using info", level, e);
            EnvFilter::new("flowtree=info")
        })
    }
}

/// Initialize logging.
///
/// The returned guard flushes the log file when dropped, so keep it alive
/// for the life of the process.
pub fn init_logging(options: &LogOptions) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter = options.filter();

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(options.debug)
        .with_file(options.debug)
        .with_writer(std::io::stderr);

    if let Some(log_path) = &options.file {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;
        let (writer, guard) = tracing_appender::non_blocking(file);

        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
            .with_target(true)
            .with_line_number(true)
            .with_file(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(file_layer)
            .try_init()?;

        Ok(Some(guard))
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;

        Ok(None)
    }
}

/// Default log file path for a flow run
pub fn default_log_path(flow_name: &str) -> anyhow::Result<PathBuf> {
    let log_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("flowtree")
        .join("logs");

    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let filename = format!("{}-{}.log", flow_name, timestamp);

    Ok(log_dir.join(filename))
}
