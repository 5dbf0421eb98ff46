use clap::Parser;
use tracing_subscriber::EnvFilter;

use wayfarer::cli::{Cli, execute};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wayfarer=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if let Err(err) = execute(cli).await {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}
