//! Core traits and types for OTK
//!
//! This crate provides the abstractions shared by the OpenAPI tool compiler
//! and its consumers (agent loops, interactive shells, alternate transports).

pub mod config;
pub mod context;
pub mod error;
pub mod traits;

// Re-exports
pub use config::{ObservabilityConfig, OtkConfig};
pub use context::{DefaultToolContext, ToolContext};
pub use error::{Error, Result};
pub use traits::{Tool, ToolResponse, Toolset};
