//! Shared types, configuration and errors for the Beacon gateway crates.

pub mod config;
pub mod error;
pub mod types;

pub use error::{BeaconError, Result};
