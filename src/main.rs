// Flood ledger node - CLI

use clap::Parser;
use flood_ledger::{Cli, CliHandler};

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let handler = CliHandler::new();

    if let Err(e) = handler.handle(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
