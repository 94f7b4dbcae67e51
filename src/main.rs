#![warn(clippy::all, clippy::pedantic)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use helmsman::Config;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "helmsman", about = "Streaming agent gateway with retrieval-augmented chat and bridged API tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the chat gateway.
    Serve {
        /// Override the configured bind host.
        #[arg(long)]
        host: Option<String>,
        /// Override the configured bind port.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run the demo resource API the bridge targets.
    ResourceApi {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8001)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install the default crypto provider for rustls before any TLS client
    // is built.
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("Warning: failed to install default crypto provider: {e:?}");
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let cli = Cli::parse();
    let mut config = Config::from_env();

    match cli.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            helmsman::gateway::run_gateway(config).await
        }
        Command::ResourceApi { host, port } => {
            if config.shared_secret.is_empty() {
                anyhow::bail!("SHARED_SECRET must be set to run the resource API");
            }
            helmsman::resource::run_resource_api(&host, port, &config.shared_secret).await
        }
    }
}
