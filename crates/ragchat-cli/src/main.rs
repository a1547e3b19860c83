//! `ragchat` binary entry point.

use clap::Parser;
use tracing::info;

use ragchat_core::Config;
use ragchat_core::tracing_init;

use ragchat_cli::{ChatClient, ChatSession};

/// Filter used when `RUST_LOG` is unset and debug mode is off.
const DEFAULT_FILTER: &str = "ragchat=warn";

#[derive(Parser, Debug)]
#[command(name = "ragchat")]
#[command(version, about = "Retrieval-augmented chat over the relay network", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.ragchat/config.json)
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Relay URL (repeatable; overrides the configured relay set)
    #[arg(long = "relay")]
    relays: Vec<String>,

    /// Chat-completion model
    #[arg(short, long)]
    model: Option<String>,

    /// Provider public key (x-only hex) used when encryption is toggled on
    #[arg(long)]
    provider: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "OPENAI_API_BASE")]
    api_base: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let filter = tracing_init::init_tracing(DEFAULT_FILTER);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting ragchat");

    let mut config = cli
        .config
        .as_deref()
        .map_or_else(Config::load, Config::load_from);
    if !cli.relays.is_empty() {
        config.relays = cli.relays;
    }
    if let Some(model) = cli.model {
        config.model = model;
    }
    if let Some(provider) = cli.provider {
        config.provider = provider;
    }
    if let Some(api_base) = cli.api_base {
        config.api_base = api_base;
    }

    let client = ChatClient::new(config.api_base.clone(), config.model.clone())?;
    let mut session = ChatSession::new(config, client, filter, DEFAULT_FILTER.to_string());
    session.run().await
}
