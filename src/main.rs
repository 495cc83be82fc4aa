use anyhow::Result;
use clap::{Parser, Subcommand};
use dora::collector::{self, Source};
use dora::config::Config;
use dora::{bus, db, telemetry};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "dora",
    about = "Tool to discover and collect inventory data from all types of BMCs and chassis",
    long_about = "Discovers and collects inventory data from HP, Dell and Supermicro \
                  management controllers, stores the normalized records, and serves \
                  them over a JSON:API HTTP interface."
)]
struct Cli {
    /// Config file (default is /etc/bmc-toolbox/dora.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the JSON:API HTTP server
    Server,
    /// Collect the given IPs, or every known host with `all`
    Collect {
        /// IP addresses or hostnames, or the single word `all`
        #[arg(required = true)]
        ips: Vec<String>,
        /// Collect blades directly instead of leaving them to the chassis walk
        #[arg(long)]
        force: bool,
    },
    /// Subscribe to the message bus and collect requested hosts
    Worker,
    /// Configuration helpers
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a sample config file to $HOME/.bmc-toolbox if none exists
    Create,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::Config {
        command: ConfigCommand::Create,
    } = cli.command
    {
        telemetry::init_tracing(false);
        let path = Config::write_sample()?;
        println!("sample configuration written to {}", path.display());
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref())?;
    telemetry::init_tracing(config.debug);

    match cli.command {
        Command::Server => dora::serve(config).await,
        Command::Collect { ips, force } => {
            let source = if force { Source::CliWithForce } else { Source::Cli };
            let config = Arc::new(config);
            let pool = db::connect_pool(&config).await?;
            // Per-host failures live in the logs; a drained run exits 0.
            collector::data_collection(&ips, source, config, pool).await
        }
        Command::Worker => {
            let config = Arc::new(config);
            let pool = db::connect_pool(&config).await?;
            bus::run_worker(config, pool).await
        }
        Command::Config { .. } => unreachable!("handled above"),
    }
}
