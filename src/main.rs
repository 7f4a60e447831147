//! Command-line entry point.

use std::path::PathBuf;

use clap::Parser;
use env_logger::Env;
use log::info;

use microserve::server::use_port_on;
use microserve::{HttpServer, Options, ServerConfig};

/// Serve a directory over HTTP.
#[derive(Debug, Parser)]
#[command(name = "microserve", version, about)]
struct Cli {
    /// JSON options file; `-c` alone reads microserve.json from the working directory
    #[arg(short, long, value_name = "FILE", num_args = 0..=1, default_missing_value = "microserve.json")]
    config: Option<PathBuf>,

    /// Listen on exactly this port instead of searching for a free one
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let options = match &cli.config {
        Some(path) => {
            info!("Loading options from {}", path.display());
            Options::from_file(path)?
        }
        None => Options::default(),
    };
    let mut config = ServerConfig::from_options(options)?;

    config.port = match cli.port {
        Some(port) => port,
        None => {
            let port = use_port_on(config.host, config.port).await?;
            if port != config.port {
                info!("Port {} is in use, using {port} instead", config.port);
            }
            port
        }
    };

    let server = HttpServer::new(config)?;
    server.start().await?;
    Ok(())
}
