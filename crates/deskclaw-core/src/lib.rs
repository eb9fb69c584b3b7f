//! # Deskclaw Core
//!
//! Shared configuration and error types for the automation core.
//! Kept dependency-light so every crate in the workspace can use it.

pub mod config;
pub mod error;

pub use config::DeskclawConfig;
pub use error::{DeskclawError, Result};
