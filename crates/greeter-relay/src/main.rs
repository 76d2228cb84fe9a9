mod cli;

use clap::Parser;
use cli::{
    create_greeting, init_greeter, init_logging, resolve_data_dir, show_identity, show_root,
    verify_greeting, Cli, Commands,
};
use greeter_relay::GreeterConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = resolve_data_dir(&cli);
    let config_path = cli.config.clone().unwrap_or_else(|| data_dir.join("config.toml"));
    let config = GreeterConfig::load_in(&config_path, &data_dir)?;

    init_logging(&cli, &config.logging)?;

    match cli.command {
        Commands::Init { force } => {
            init_greeter(&config_path, &data_dir, force)?;
        }
        Commands::Identity { ref private_key } => {
            show_identity(private_key, &cli.format)?;
        }
        Commands::Greet { ref private_key, ref message, ref topic, ref output } => {
            create_greeting(
                &config,
                private_key,
                message.clone(),
                topic.clone(),
                output.clone(),
                &cli.format,
            )
            .await?;
        }
        Commands::Verify { ref signal } => {
            verify_greeting(&config, signal, &cli.format).await?;
        }
        Commands::Root => {
            show_root(&config, &cli.format)?;
        }
    }

    Ok(())
}
