//! outpost-core — message protocol and configuration.
//! All other Outpost crates depend on this one.

pub mod config;
pub mod message;

pub use message::{CodecError, DetectEvent, DetectMetadata, Message};
