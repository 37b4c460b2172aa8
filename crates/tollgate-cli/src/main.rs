//! Tollgate CLI entrypoint.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod executor;
mod handlers;


use commands::{Commands, ConfigCommands};
use config::CliConfig;

#[derive(Parser)]
#[command(name = "tollgate")]
#[command(author, version, about = "Change-gated matrix job runner", long_about = None)]
struct Cli {
    /// Log at debug level and echo task output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config = CliConfig::load().unwrap_or_default();

    let success = match cli.command {
        Commands::Init => handlers::init().await?,
        Commands::Validate { path } => handlers::validate(&path).await?,
        Commands::Expand { path } => handlers::expand(&path).await?,
        Commands::Detect {
            path,
            changes,
            output,
        } => handlers::detect(&config, &path, &changes, output).await?,
        Commands::Run {
            path,
            changes,
            workspace,
            store_dir,
            keep_store,
            max_parallel,
            output,
        } => {
            let options = handlers::RunOptions {
                changes,
                workspace,
                store_dir,
                keep_store,
                max_parallel,
                output,
                verbose: cli.verbose,
            };
            handlers::run_workflow(&config, &path, options).await?
        }
        Commands::Schema => handlers::schema()?,
        Commands::Config { command } => match command {
            ConfigCommands::Show => handlers::show_config(&config)?,
            ConfigCommands::Set { key, value } => handlers::set_config(&key, &value)?,
        },
    };

    if !success {
        std::process::exit(1);
    }

    Ok(())
}
