use super::Commands;
use crate::account::{Account, AccountManager, KeyPairExportable, PasswordUnlockable, UnlockCredential};
use crate::error::{KeyringError, Result};

pub async fn handle_command(manager: &AccountManager, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::New { password, index } => {
            let (account, phrase) = manager.create_mnemonic_account(&password, index).await?;
            println!("Account {} created.", account.id());
            println!("Address: {}", account.address().await?);
            println!("Mnemonic: {}", phrase.as_str());
            println!("KEEP THIS SAFE!");
        }
        Commands::Restore { phrase, password, index } => {
            let account = manager.restore_mnemonic_account(&phrase, &password, index).await?;
            print_added(&account).await?;
        }
        Commands::Import { key, password } => {
            let key = zeroize::Zeroizing::new(decode_hex(&key)?);
            let account = manager.import_private_key(&key, &password).await?;
            print_added(&account).await?;
        }
        Commands::AddQredo {
            connection,
            wallet,
            address,
        } => {
            let account = manager.add_qredo_account(&connection, &wallet, &address).await?;
            print_added(&account).await?;
        }
        Commands::AddZk {
            provider,
            subject,
            salt,
        } => {
            let account = manager.add_zk_account(&provider, &subject, &decode_hex(&salt)?).await?;
            print_added(&account).await?;
        }
        Commands::List => {
            for d in manager.list().await? {
                let marker = if d.selected { "*" } else { " " };
                let state = if d.is_locked { "locked" } else { "unlocked" };
                println!(
                    "{} {}\t{}\t{}\t{}\t{}",
                    marker,
                    d.id,
                    d.account_type,
                    d.address,
                    state,
                    d.nickname.unwrap_or_default()
                );
            }
        }
        Commands::Show { id } => {
            let display = manager.account(&id).await?.to_display_record().await?;
            let json = serde_json::to_string_pretty(&display)
                .map_err(|e| KeyringError::Serialization(e.to_string()))?;
            println!("{}", json);
        }
        Commands::Sign {
            id,
            password,
            hex,
            message,
        } => {
            let message = if hex { decode_hex(&message)? } else { message.into_bytes() };
            let account = manager.account(&id).await?;
            account.unlock(UnlockCredential::Password(password)).await?;
            let signed = account.sign(&message).await;
            account.lock(true).await?;
            println!("{}", signed?.to_hex());
        }
        Commands::Lock { id, hide } => {
            manager.lock(&id, !hide).await?;
            println!("Account {} locked.", id);
        }
        Commands::VerifyPassword { id, password } => {
            let account = manager.account(&id).await?;
            password_unlockable(&account)?.verify_password(&password).await?;
            println!("Password OK.");
        }
        Commands::ExportKey { id, password } => {
            let account = manager.account(&id).await?;
            let exportable = account.as_key_pair_exportable().ok_or_else(|| {
                KeyringError::AuthFailed(format!("{} accounts have no exportable key", account.account_type()))
            })?;
            let key = exportable.export_key_pair(&password).await?;
            println!("{}", hex::encode(&key[..]));
        }
        Commands::Select { id } => {
            manager.select(&id).await?;
            println!("Account {} selected.", id);
        }
        Commands::Nickname { id, name } => {
            manager.set_nickname(&id, name).await?;
        }
        Commands::Remove { id } => {
            manager.remove(&id).await?;
            println!("Account {} removed.", id);
        }
    }
    Ok(())
}

fn password_unlockable(account: &Account) -> Result<&dyn PasswordUnlockable> {
    account.as_password_unlockable().ok_or_else(|| {
        KeyringError::AuthFailed(format!("{} accounts are not unlocked with a password", account.account_type()))
    })
}

async fn print_added(account: &Account) -> Result<()> {
    println!("Account {} added ({}).", account.id(), account.account_type());
    println!("Address: {}", account.address().await?);
    Ok(())
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    hex::decode(s.trim_start_matches("0x")).map_err(|e| KeyringError::AuthFailed(format!("Invalid hex: {}", e)))
}
