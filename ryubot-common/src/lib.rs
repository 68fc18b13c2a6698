//! RyuBot Common - Shared configuration, errors and logging for RyuBot.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup and span helpers
//! - Small string utilities

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    CompletionConfig, Config, ExportConfig, ModePreset, ModesConfig, ObservabilityConfig,
    SessionConfig, TelegramConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};

