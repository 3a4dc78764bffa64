//! TicketBridge webhook server binary

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use ticketbridge::config::AppConfig;
use ticketbridge::credentials::{AesGcmCipher, Cipher, CredentialStore, MemoryCredentialStore};
use ticketbridge::factory::{OAuthTokenRefresher, ProviderFactory};
use ticketbridge::notify::{NotificationDispatcher, NullMessenger};
use ticketbridge::webhook::{WebhookIngestor, WebhookServer};

#[derive(Debug, Parser)]
#[command(name = "ticketbridge", about = "Ticketing provider bridge and webhook pipeline")]
struct Cli {
    /// Path to config.yaml (defaults to ~/.config/ticketbridge/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the bind address from the config file
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ticketbridge::logging::init()?;

    let cli = Cli::parse();
    let config =
        AppConfig::load_or_default(cli.config.as_deref()).context("Failed to load config")?;

    let cipher: Arc<dyn Cipher> = Arc::new(AesGcmCipher::new(&config.encryption.key()?));
    let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
    let refresher = Arc::new(OAuthTokenRefresher::new(&config.oauth)?);

    let factory = Arc::new(ProviderFactory::new(
        store.clone(),
        cipher.clone(),
        refresher,
        config.cache.clone(),
    ));

    let dispatcher = Arc::new(NotificationDispatcher::new(Arc::new(NullMessenger)));
    let ingestor = WebhookIngestor::new(factory, store.clone(), dispatcher);

    let server = WebhookServer::new(ingestor, store, cipher, config.webhook.default_secret());

    let bind = cli.bind.unwrap_or(config.bind);
    server.run(&bind).await?;
    Ok(())
}
