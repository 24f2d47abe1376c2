//! Things5 intent resolution engine
//!
//! This crate turns partial, loosely-typed tool arguments coming from an
//! AI agent into fully specified calls against the Things5 IoT platform.
//! It sits between the MCP tool-dispatch layer and the tool handlers.
//!
//! # Features
//!
//! - Inventory cache with TTL and stale fallback
//! - Tiered device, command and telemetry matching
//! - Automatic resolution of device and command identifiers
//! - Device/command and device/telemetry disambiguation from free text
//! - Argument normalization and per-tool schema validation

// Core modules
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod resolution;
pub mod services;
pub mod tools;
pub mod validation;

// Test support modules - available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

// Re-export main types for convenience
pub use client::{http_client::Things5HttpClient, AuthContext, DeviceRecord, Things5Client};
pub use config::ServerConfig;
pub use error::{Result, Things5Error};
pub use resolution::{IntentEngine, ResolutionOutcome, ResolutionRequest};
