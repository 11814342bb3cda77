//! Stackwarden - keeps a host's docker compose stack healthy

use clap::Parser;
use stackwarden::cli::Cli;
use stackwarden::domain::error::is_already_in_progress;
use stackwarden::output::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json_mode = cli.json;
    if let Err(e) = cli.run().await {
        match json::format_error(&format!("{e:#}"), json::error_code(&e)) {
            Ok(body) if json_mode => println!("{body}"),
            _ => eprintln!("Error: {e:#}"),
        }
        let code = if is_already_in_progress(&e) { 2 } else { 1 };
        std::process::exit(code);
    }
}
