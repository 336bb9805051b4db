use clap::{Parser, Subcommand};
use std::net::SocketAddr;

#[derive(Parser, Debug)]
#[command(name = "enrichd")]
#[command(about = "Company enrichment worker", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the enrichment worker service
    Serve(ServeArgs),

    /// Process every queued job once, then exit
    Drain,
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Address override for the HTTP server
    #[arg(long)]
    pub address: Option<SocketAddr>,
}
