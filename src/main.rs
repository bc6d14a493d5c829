use anyhow::Result;
use clap::{Parser, Subcommand};
use flowtree::cli::{self, CommandContext, EXIT_INTERRUPTED};
use flowtree::logging::{LogOptions, default_log_path, init_logging};
use flowtree::settings::Settings;
use flowtree::signals::{CancellationToken, setup_signal_handlers, with_cancellation};
use flowtree::sink::{OutputMode, create_sink};
use flowtree::workflow::FlowRegistry;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "flowtree")]
#[command(about = "Run tree-shaped workflows with inheriting parameters")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory for .flowtree/config.toml (defaults to current)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Only log errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Write logs to the default log directory
    #[arg(long, global = true, conflicts_with = "log_file")]
    save_log: bool,

    /// Where flow log lines go
    #[arg(long, global = true, value_enum)]
    output: Option<OutputMode>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a registered flow
    Run {
        /// Flow name, e.g. system.shell_flow
        flow: String,

        /// Flow parameters as --key value pairs
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Run the flow described by a flow-data JSON file
    File {
        /// Path to the flow-data file
        path: PathBuf,

        /// Parameters overriding the file's values
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// List registered flows
    List,

    /// Show a flow's default parameters
    Show {
        /// Flow name
        flow: String,
    },
}

impl Commands {
    /// Name used for the default log file
    fn log_name(&self) -> String {
        match self {
            Commands::Run { flow, .. } => flow.clone(),
            Commands::File { path, .. } => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "file".to_string()),
            Commands::List => "list".to_string(),
            Commands::Show { .. } => "show".to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.dir.as_deref())?;

    let log_file = match (&cli.log_file, cli.save_log) {
        (Some(path), _) => Some(path.clone()),
        (None, true) => Some(default_log_path(&cli.command.log_name())?),
        (None, false) => settings.logging.file.clone(),
    };
    let _guard = init_logging(&LogOptions {
        debug: cli.debug,
        quiet: cli.quiet,
        level: settings.logging.level.clone(),
        file: log_file,
    })?;

    let output = cli
        .output
        .or(settings.logging.output)
        .unwrap_or_default();
    let registry = Arc::new(FlowRegistry::builtin());
    let ctx = CommandContext {
        registry: registry.clone(),
        sink: create_sink(output),
        output,
        base_params: settings.params,
    };

    let token = CancellationToken::new();
    tokio::spawn(setup_signal_handlers(token.clone()));

    let code = match cli.command {
        Commands::List => {
            cli::list_flows(&registry, output)?;
            0
        }
        Commands::Show { flow } => cli::show_flow(&registry, &flow)?,
        Commands::Run { flow, args } => {
            match with_cancellation(token, cli::run_flow(&flow, &args, &ctx)).await {
                Some(result) => result?,
                None => EXIT_INTERRUPTED,
            }
        }
        Commands::File { path, args } => {
            match with_cancellation(token, cli::run_file(&path, &args, &ctx)).await {
                Some(result) => result?,
                None => EXIT_INTERRUPTED,
            }
        }
    };

    if code != 0 {
        drop(_guard);
        std::process::exit(code);
    }
    Ok(())
}
