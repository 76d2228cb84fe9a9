#![deny(unsafe_code)]
#![warn(clippy::all)]

//! Relay and client plumbing around the greeter signaling core.

pub mod client;
pub mod config;
pub mod events;
pub mod relay;
pub mod snapshot;

pub use client::prove_greeting;
pub use config::{GreeterConfig, LogLevel, LoggingConfig, ScopePolicy};
pub use events::{EventLog, GreetingEvent, Subscription};
pub use relay::{GreeterRelay, Receipt, RelayStatus, RootHistory, RootRecord};
pub use snapshot::CommitmentSnapshot;
