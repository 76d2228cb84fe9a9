mod logging;
mod relay;
mod types;

pub use logging::LoggingConfig;
pub use relay::GreeterConfig;
pub use types::*;

/// Capacity of the broadcast channel feeding live subscribers.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

pub const MAX_ROOT_HISTORY: usize = greeter_crypto::verifier::MAX_TRUSTED_ROOTS;
