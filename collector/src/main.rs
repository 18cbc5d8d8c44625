use clap::{Parser, Subcommand};
use collector::app::App;
use collector::checkpoint::CheckpointStore;
use collector::client::HttpSourceFactory;
use collector::emit::StdoutSink;
use collector::secrets::EnvSecretResolver;
use collector_core::{telemetry, timestamp, Config};
use std::process;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[clap(name = "collector")]
#[clap(about = "Incremental phishing message collector", version)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one polling pass over all configured inputs
    Run,

    /// Load and validate the configuration, then exit
    Validate,

    /// Print the stored checkpoint time for an input
    Checkpoint {
        /// Input identity, e.g. cisco_phishing://prod
        input: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // The subscriber may not be installed yet when config loading
        // fails, so report on stderr rather than through tracing.
        eprintln!("Fatal error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    // Parse the CLI before touching configuration so --help and --version
    // keep working with a broken config file.
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    // Initialize telemetry
    telemetry::init(&config.telemetry)?;

    match cli.command {
        Commands::Validate => {
            info!(inputs = config.inputs.len(), "Configuration is valid");
        }

        Commands::Checkpoint { input } => {
            let store = CheckpointStore::new(config.checkpoint_dir.clone())?;
            match store.read(&input)? {
                Some(ts) => println!("{}", timestamp::format(ts)),
                None => println!("no checkpoint"),
            }
        }

        Commands::Run => {
            let app = App::new(config, Arc::new(EnvSecretResolver), Arc::new(HttpSourceFactory))?;
            let mut sink = StdoutSink;

            let summary = app.run(&mut sink).await;
            info!(
                inputs = summary.inputs,
                failed = summary.failed,
                "Polling pass finished"
            );

            if summary.failed > 0 {
                anyhow::bail!("{} of {} inputs failed", summary.failed, summary.inputs);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
