pub mod account;
pub mod cli;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;

pub use account::{Account, AccountManager, AccountType, DisplayRecord, SignatureBundle};
pub use error::{KeyringError, Result};
