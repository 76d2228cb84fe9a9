use greeter_relay::{CommitmentSnapshot, GreeterConfig};
use std::path::Path;

pub fn init_greeter(config_path: &Path, data_dir: &Path, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "Configuration already exists at {} (use --force to overwrite)",
            config_path.display()
        );
    }

    let config = GreeterConfig::with_data_dir(data_dir.to_path_buf());
    config.save(config_path)?;

    if !config.commitments_path.exists() {
        CommitmentSnapshot::from_commitments(Vec::new()).save(&config.commitments_path)?;
    }
    std::fs::create_dir_all(&config.keys_dir)?;

    println!("\x1b[38;5;46m[+]\x1b[0m Configuration written to {}", config_path.display());
    println!("    Commitments: {}", config.commitments_path.display());
    println!("    Keys:        {}", config.keys_dir.display());
    println!();
    println!(
        "Run '\x1b[38;5;51mgreeter-keygen generate --output {}\x1b[0m' to create circuit keys",
        config.keys_dir.display()
    );

    Ok(())
}
