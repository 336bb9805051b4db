mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use enrichd::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            let mut config = Config::load()?;
            if let Some(address) = args.address {
                config.server.bind_addr = address;
            }
            enrichd::service::run(config).await?;
        }
        Commands::Drain => {
            let config = Config::load()?;
            enrichd::service::drain(config).await?;
        }
    }

    Ok(())
}
