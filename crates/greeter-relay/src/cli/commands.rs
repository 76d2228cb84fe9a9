use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "greeter")]
#[command(version = BUILD_VERSION)]
#[command(about = "Greeter - Anonymous greetings from members of a group")]
#[command(long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(short, long, global = true, value_name = "FILE", help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[arg(short = 'd', long, global = true, value_name = "DIR", env = "GREETER_DATA_DIR", help = "Data directory path")]
    pub data_dir: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Increase verbosity (-v, -vv, -vvv)")]
    pub verbose: u8,

    #[arg(short, long, global = true, help = "Suppress non-error output")]
    pub quiet: bool,

    #[arg(long, global = true, value_name = "FILE", help = "Write logs to file")]
    pub log_file: Option<PathBuf>,

    #[arg(long, global = true, default_value = "text", help = "Output format")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Write a default configuration")]
    Init {
        #[arg(short, long, help = "Overwrite existing configuration")]
        force: bool,
    },

    #[command(about = "Derive the identity commitment for a wallet")]
    #[command(long_about = "Sign the identity challenge with the wallet key and print the resulting\nidentity commitment. Publish the commitment to join the group.")]
    Identity {
        #[arg(long, value_name = "HEX", env = "GREETER_PRIVATE_KEY", hide_env_values = true, help = "Wallet private key")]
        private_key: String,
    },

    #[command(about = "Create an anonymous greeting")]
    #[command(long_about = "Build the membership tree from the commitment snapshot, prove membership\nand write the signal JSON. The signal does not reveal which member sent it.")]
    Greet {
        #[arg(long, value_name = "HEX", env = "GREETER_PRIVATE_KEY", hide_env_values = true, help = "Wallet private key")]
        private_key: String,
        #[arg(short, long, help = "Greeting text")]
        message: String,
        #[arg(long, value_name = "FIELD", help = "External nullifier (defaults to the configured scope)")]
        topic: Option<String>,
        #[arg(short, long, value_name = "FILE", help = "Write the signal to a file instead of stdout")]
        output: Option<PathBuf>,
    },

    #[command(about = "Verify a greeting and record its nullifier")]
    Verify {
        #[arg(short, long, value_name = "FILE", help = "Signal JSON file")]
        signal: PathBuf,
    },

    #[command(about = "Show the current group root")]
    Root,
}
