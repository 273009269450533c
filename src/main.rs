use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use my_butler::{telemetry, Config, Deployment, Handler};

/// Slack-driven air-conditioner control handlers.
#[derive(Parser, Debug)]
#[command(name = "my-butler", version, about)]
struct Cli {
    /// Which handler to run (ac-control or labor-service)
    #[arg(long, env = "DEPLOYMENT", global = true, default_value = "ac-control")]
    deployment: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve AWS Lambda invocations (default)
    Lambda,

    /// Serve the same handler over local HTTP
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Lambda);
    telemetry::init(matches!(command, Commands::Lambda));

    let deployment: Deployment = cli.deployment.parse()?;
    let config = Config::from_env(deployment)
        .with_context(|| format!("invalid configuration for {deployment}"))?;
    let handler = Arc::new(Handler::from_config(&config).await?);

    match command {
        Commands::Lambda => my_butler::lambda::run(handler).await,
        Commands::Serve { host, port } => my_butler::gateway::run_gateway(&host, port, handler).await,
    }
}
