mod inspect;
mod open;
mod query;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tilecache")]
#[command(about = "Vector tile inspection tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode one tile and summarize its layers
    Inspect(inspect::Args),
    /// List the features under a geographic point
    Query(query::Args),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Example: RUST_LOG=debug tilecache inspect ...
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect(args) => inspect::run(args).await,
        Commands::Query(args) => query::run(args).await,
    }
}
