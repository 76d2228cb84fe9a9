//! Groth16 key generation for the greeter signal circuit.
//!
//! Usage:
//!   greeter-keygen generate --output ./keys --depth 20
//!   greeter-keygen verify --vk ./keys/signal.vk.bin
//!   greeter-keygen info --keys-dir ./keys

use anyhow::{bail, Context, Result};
use ark_bn254::Bn254;
use ark_groth16::VerifyingKey;
use ark_serialize::CanonicalDeserialize;
use clap::{Parser, Subcommand};
use greeter_crypto::artifacts::{vk_hash, METADATA_FILE, PROVING_KEY_FILE, VERIFYING_KEY_FILE};
use greeter_crypto::{ArtifactMetadata, CircuitArtifacts, DEFAULT_TREE_DEPTH};
use std::fs;
use std::path::{Path, PathBuf};

/// Key generation tool for greeter signal proofs.
#[derive(Parser)]
#[command(name = "greeter-keygen")]
#[command(about = "Generate Groth16 proving and verifying keys for the greeter signal circuit")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate new proving and verifying keys.
    Generate {
        /// Output directory for keys.
        #[arg(short, long, default_value = "./greeter-keys")]
        output: PathBuf,

        /// Membership tree depth the circuit is built for.
        #[arg(short, long, default_value_t = DEFAULT_TREE_DEPTH)]
        depth: usize,
    },

    /// Check a verifying key against an expected hash.
    Verify {
        /// Path to verifying key file.
        #[arg(short, long)]
        vk: PathBuf,

        /// Expected VK hash (hex).
        #[arg(short, long)]
        expected_hash: Option<String>,
    },

    /// Show information about existing keys.
    Info {
        /// Directory containing keys.
        #[arg(short, long, default_value = "./greeter-keys")]
        keys_dir: PathBuf,
    },
}

fn generate_keys(output_dir: &Path, depth: usize) -> Result<()> {
    println!("Greeter key generator");
    println!("=====================");
    println!("Tree depth: {}", depth);
    println!();
    println!("Running circuit-specific setup, this can take a while...");

    let artifacts = CircuitArtifacts::setup(depth, &mut rand::thread_rng())?;
    artifacts
        .save(output_dir)
        .with_context(|| format!("writing keys to {}", output_dir.display()))?;

    println!();
    println!("Proving key:   {} ({} bytes)", output_dir.join(PROVING_KEY_FILE).display(), artifacts.metadata.pk_size);
    println!("Verifying key: {} ({} bytes)", output_dir.join(VERIFYING_KEY_FILE).display(), artifacts.metadata.vk_size);
    println!("VK hash:       {}", artifacts.vk_hash());
    println!();
    println!("Distribute {} to relays and {} to clients.", VERIFYING_KEY_FILE, PROVING_KEY_FILE);

    Ok(())
}

fn verify_key(vk_path: &Path, expected_hash: Option<String>) -> Result<()> {
    println!("Verifying key: {}", vk_path.display());

    let vk_bytes = fs::read(vk_path).with_context(|| format!("reading {}", vk_path.display()))?;
    let actual_hash = vk_hash(&vk_bytes);
    println!("VK hash: {}", actual_hash);
    println!("Size: {} bytes", vk_bytes.len());

    let vk = VerifyingKey::<Bn254>::deserialize_compressed(&vk_bytes[..])
        .context("verifying key does not deserialize")?;
    println!("Deserialization: OK ({} public inputs)", vk.gamma_abc_g1.len().saturating_sub(1));

    if let Some(expected) = expected_hash {
        if actual_hash != expected.trim().to_lowercase() {
            bail!("hash mismatch: expected {}, actual {}", expected, actual_hash);
        }
        println!("Hash match: OK");
    }

    Ok(())
}

fn show_info(keys_dir: &Path) -> Result<()> {
    println!("Greeter keys");
    println!("============");
    println!("Directory: {}", keys_dir.display());
    println!();

    let meta_path = keys_dir.join(METADATA_FILE);
    if !meta_path.exists() {
        println!("No keys found. Run 'greeter-keygen generate' first.");
        return Ok(());
    }

    let metadata: ArtifactMetadata = serde_json::from_str(&fs::read_to_string(&meta_path)?)
        .with_context(|| format!("parsing {}", meta_path.display()))?;
    println!("Circuit:       {} v{}", metadata.circuit, metadata.version);
    println!("Tree depth:    {}", metadata.tree_depth);
    println!("Public inputs: {}", metadata.public_inputs.join(", "));
    println!("VK hash:       {}", metadata.vk_hash);
    println!("PK size:       {} bytes", metadata.pk_size);
    println!("VK size:       {} bytes", metadata.vk_size);
    println!("Generated:     {}", metadata.generated_at.to_rfc3339());

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate { output, depth } => generate_keys(&output, depth),
        Commands::Verify { vk, expected_hash } => verify_key(&vk, expected_hash),
        Commands::Info { keys_dir } => show_info(&keys_dir),
    }
}
