#![forbid(unsafe_code)]

//! Shared constants, error type, and configuration loader for the relay
//! workspace. Every other crate depends on this one for its `Result` alias
//! and the timeout/buffer-size constants spec.md ties the transport layer to.

pub mod config;
pub mod error;
pub mod types;

pub use config::RelayConfig;
pub use error::{Error, Result};
