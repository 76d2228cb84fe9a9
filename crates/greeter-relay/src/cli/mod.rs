mod commands;
mod greet;
mod identity;
mod init;
mod utils;
mod verify;

pub use commands::{Cli, Commands};
pub use greet::create_greeting;
pub use identity::show_identity;
pub use init::init_greeter;
pub use utils::{init_logging, resolve_data_dir};
pub use verify::{show_root, verify_greeting};
