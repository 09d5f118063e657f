//! Quarex - streaming answers with citations.
//!
//! This library provides the service around the `answer-core` engine:
//! - CLI command parsing
//! - HTTP API with SSE streaming
//! - Configuration
//! - Prompt building and request screening
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  ┌─────────────┐
//! │     CLI     │  │   HTTP API  │
//! └──────┬──────┘  └──────┬──────┘
//!        │                │
//!        └───────┬────────┘
//!                │
//!         ┌──────┴──────┐      ┌─────────────┐
//!         │    Core     │─────▶│ answer-core │
//!         └─────────────┘      └─────────────┘
//! ```

pub mod api;
pub mod build_info;
pub mod cli;
pub mod config;
pub mod core;

pub use config::Config;
