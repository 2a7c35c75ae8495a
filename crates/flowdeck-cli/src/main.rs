use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "flowdeck",
    about = "flowdeck — workload topology composer for containerized workflow platforms",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Log at debug level (RUST_LOG still takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize the deployment topology from flowdeck.toml.
    ///
    /// Composes task definitions, attaches capability grants, binds
    /// services and registers on-demand tasks. Nothing is printed unless
    /// every stage succeeds.
    Synth {
        #[arg(short, long, default_value = "flowdeck.toml")]
        config: String,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
        /// Write the JSON topology to this file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Check that flowdeck.toml synthesizes without errors
    Validate {
        #[arg(short, long, default_value = "flowdeck.toml")]
        config: String,
    },
    /// Write a flowdeck.toml scaffold
    Init {
        #[arg(short, long, default_value = ".")]
        path: String,
        /// Deployment name
        #[arg(long, default_value = "airflow")]
        name: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose, std::env::var("RUST_LOG").ok())?)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Synth { config, format, output } => {
            commands::synth::synth(&config, &format, output.as_deref())
        }
        Commands::Validate { config } => commands::validate::validate(&config),
        Commands::Init { path, name } => commands::init::init(&path, &name),
    }
}

/// RUST_LOG wins when set; otherwise `flowdeck=info`, or debug with `--verbose`.
fn log_filter(verbose: bool, rust_log: Option<String>) -> anyhow::Result<EnvFilter> {
    match rust_log.filter(|spec| !spec.trim().is_empty()) {
        Some(spec) => Ok(EnvFilter::try_new(spec)?),
        None => {
            let directive = if verbose { "flowdeck=debug" } else { "flowdeck=info" };
            Ok(EnvFilter::new(directive))
        }
    }
}
