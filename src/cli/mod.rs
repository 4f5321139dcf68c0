pub mod account;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "wallet_keyring")]
#[command(about = "Wallet account keyring CLI", long_about = None)]
pub struct Cli {
    /// Path to the TOML config; created with defaults if missing
    #[arg(long, default_value = "keyring.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new mnemonic-derived account
    New {
        #[arg(long)]
        password: String,
        #[arg(long, default_value_t = 0)]
        index: u32,
    },
    /// Restore a mnemonic-derived account from a backup phrase
    Restore {
        #[arg(long)]
        phrase: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value_t = 0)]
        index: u32,
    },
    /// Import a raw ed25519 private key (hex)
    Import {
        #[arg(long)]
        key: String,
        #[arg(long)]
        password: String,
    },
    /// Register a custodial wallet by its address
    AddQredo {
        #[arg(long)]
        connection: String,
        #[arg(long)]
        wallet: String,
        #[arg(long)]
        address: String,
    },
    /// Register a zk-login identity
    AddZk {
        #[arg(long)]
        provider: String,
        #[arg(long)]
        subject: String,
        /// Salt as hex
        #[arg(long)]
        salt: String,
    },
    /// List all accounts
    List,
    /// Print one account's display record as JSON
    Show { id: String },
    /// Unlock with a password, sign, and lock again
    Sign {
        id: String,
        #[arg(long)]
        password: String,
        /// Treat the message as hex rather than UTF-8 text
        #[arg(long)]
        hex: bool,
        message: String,
    },
    /// Lock an account
    Lock {
        id: String,
        /// Also hide the public key
        #[arg(long)]
        hide: bool,
    },
    /// Check a password without unlocking
    VerifyPassword {
        id: String,
        #[arg(long)]
        password: String,
    },
    /// Print the raw private key (hex)
    ExportKey {
        id: String,
        #[arg(long)]
        password: String,
    },
    /// Mark an account as selected
    Select { id: String },
    /// Set or clear an account nickname
    Nickname { id: String, name: Option<String> },
    /// Delete an account record
    Remove { id: String },
}
