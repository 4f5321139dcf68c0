use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use wallet_keyring::account::{AccountManager, MemorySecretStore, SledRecordStore};
use wallet_keyring::cli::{self, Cli};
use wallet_keyring::config::KeyringConfig;
use wallet_keyring::error::Result;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match KeyringConfig::load_or_default(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.storage.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli, config).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: KeyringConfig) -> Result<()> {
    let records = Arc::new(SledRecordStore::open(&config.storage.db_path)?);
    let manager = AccountManager::from_config(&config, records, Arc::new(MemorySecretStore::new()))?;
    let result = cli::account::handle_command(&manager, cli.command).await;
    manager.end_session();
    result
}
