use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "scriptlet",
    about = "Validate and dry-run instance placement scriptlets",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a placement scriptlet without running it
    Validate {
        /// Path to the scriptlet source
        script: PathBuf,
    },
    /// Run a placement scriptlet against a cluster fixture.
    ///
    /// The fixture is a JSON document with a `cluster` (local member name,
    /// leader address, metadata and the candidate members with their
    /// resources and state) and a placement `request`. The chosen member is
    /// printed as JSON.
    Run {
        /// Path to the scriptlet source
        #[arg(short, long)]
        script: PathBuf,
        /// Path to the cluster fixture
        #[arg(short, long)]
        fixture: PathBuf,
        /// Path to scriptlet.toml (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override placement.timeout, e.g. 500ms or 5s
        #[arg(short, long)]
        timeout: Option<String>,
    },
    /// Print the effective configuration as TOML
    Config {
        /// Path to scriptlet.toml (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("scriptlet=info".parse()?);
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Validate { script } => commands::validate::validate(&script),
        Commands::Run {
            script,
            fixture,
            config,
            timeout,
        } => {
            commands::run::run(&script, &fixture, config.as_deref(), timeout.as_deref()).await
        }
        Commands::Config { config } => commands::load_config(config.as_deref())
            .and_then(|config| config.to_toml_string())
            .map(|toml| print!("{toml}")),
    }
}
