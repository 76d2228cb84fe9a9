use super::commands::OutputFormat;
use super::utils::print_json;
use greeter_crypto::{CircuitArtifacts, SledNullifierRegistry, Signal};
use greeter_relay::{CommitmentSnapshot, GreeterConfig, GreeterRelay};
use std::path::Path;
use std::sync::Arc;

pub async fn verify_greeting(
    config: &GreeterConfig,
    signal_path: &Path,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(signal_path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", signal_path.display(), e))?;
    let signal = Signal::from_json(&contents)?;

    let artifacts = CircuitArtifacts::load_verifier(&config.keys_dir)?;
    let registry = Arc::new(SledNullifierRegistry::open(&config.registry_path)?);
    let relay = GreeterRelay::new(config, &artifacts, registry)?;
    relay.refresh_snapshot(&CommitmentSnapshot::load(&config.commitments_path)?)?;

    let rejection = match relay.submit(signal).await {
        Ok(receipt) => {
            let event = relay.events_since(receipt.sequence).into_iter().next();
            match format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "accepted": true,
                    "receipt": receipt,
                    "event": event,
                }))?,
                OutputFormat::Text => {
                    println!("\x1b[38;5;46m[+]\x1b[0m Greeting accepted");
                    if let Some(event) = event {
                        println!("    \"{}\"", event.message);
                    }
                    println!("    Nullifier hash: {}", receipt.nullifier_hash);
                    println!("    Scope:          {}", receipt.external_nullifier);
                    println!("    Root:           {}", receipt.root);
                }
            }
            return Ok(());
        }
        Err(rejection) => rejection,
    };

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "accepted": false,
            "code": rejection.code(),
            "rejection": rejection,
        }))?,
        OutputFormat::Text => {
            println!("\x1b[38;5;196m[-]\x1b[0m Greeting rejected: {}", rejection);
        }
    }

    Err(rejection.into())
}

pub fn show_root(config: &GreeterConfig, format: &OutputFormat) -> anyhow::Result<()> {
    let snapshot = CommitmentSnapshot::load(&config.commitments_path)?;
    let tree = snapshot.build_tree(config.tree_depth)?;
    let root = tree.root();
    let scope = config.external_nullifier.resolve(root);

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "root": root,
            "depth": tree.depth(),
            "leaves": tree.len(),
            "external_nullifier": scope,
        }))?,
        OutputFormat::Text => {
            println!("Root:               {}", root);
            println!("Depth:              {}", tree.depth());
            println!("Members:            {} / {}", tree.len(), tree.capacity());
            println!("External nullifier: {} ({})", scope, config.external_nullifier);
        }
    }

    Ok(())
}
