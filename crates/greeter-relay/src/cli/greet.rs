use super::commands::OutputFormat;
use super::utils::print_json;
use greeter_crypto::{CircuitArtifacts, FieldElement, IdentityManager, LocalWallet, SignalProver};
use greeter_relay::{prove_greeting, CommitmentSnapshot, GreeterConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub async fn create_greeting(
    config: &GreeterConfig,
    private_key: &str,
    message: String,
    topic: Option<String>,
    output: Option<PathBuf>,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let wallet = LocalWallet::from_hex(private_key)?;
    let identity = IdentityManager::derive_with(&wallet)?;

    let snapshot = CommitmentSnapshot::load(&config.commitments_path)?;
    let tree = Arc::new(snapshot.build_tree(config.tree_depth)?);
    let root = tree.root();

    let external_nullifier = match topic {
        Some(topic) => topic.parse::<FieldElement>()?,
        None => config.external_nullifier.resolve(root),
    };

    let artifacts = CircuitArtifacts::load(&config.keys_dir)?;
    if artifacts.tree_depth() != config.tree_depth {
        anyhow::bail!(
            "Keys in {} were generated for depth {}, config uses {}",
            config.keys_dir.display(),
            artifacts.tree_depth(),
            config.tree_depth
        );
    }
    let prover = Arc::new(SignalProver::new(&artifacts)?);

    info!(root = %root, leaves = tree.len(), "Proving greeting");
    let signal = prove_greeting(prover, &identity, tree, message, external_nullifier).await?;
    let json = signal.to_json()?;

    let Some(path) = output else {
        println!("{}", json);
        return Ok(());
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, &json)?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "output": path,
            "root": signal.root,
            "nullifier_hash": signal.nullifier_hash,
            "external_nullifier": external_nullifier,
        }))?,
        OutputFormat::Text => {
            println!("\x1b[38;5;46m[+]\x1b[0m Greeting signed anonymously");
            println!("    Message:        {}", signal.message_text());
            println!("    Root:           {}", signal.root);
            println!("    Nullifier hash: {}", signal.nullifier_hash);
            println!("    Written to:     {}", path.display());
        }
    }

    Ok(())
}
