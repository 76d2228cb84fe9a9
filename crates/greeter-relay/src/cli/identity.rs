use super::commands::OutputFormat;
use super::utils::print_json;
use greeter_crypto::{IdentityManager, LocalWallet};

pub fn show_identity(private_key: &str, format: &OutputFormat) -> anyhow::Result<()> {
    let wallet = LocalWallet::from_hex(private_key)?;
    let identity = IdentityManager::derive_with(&wallet)?;
    let address = wallet.address().to_checksum();

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "address": address,
            "commitment": identity.commitment(),
        }))?,
        OutputFormat::Text => {
            println!("\x1b[38;5;46m[+]\x1b[0m Identity derived");
            println!("    Wallet:     \x1b[38;5;51m{}\x1b[0m", address);
            println!("    Commitment: \x1b[38;5;226m{}\x1b[0m", identity.commitment());
            println!();
            println!("\x1b[38;5;245mAdd the commitment to the group snapshot to be able to greet.\x1b[0m");
        }
    }

    Ok(())
}
