//! Request policy shared by the HTTP API and the CLI.

mod error;
pub mod prompt;
pub mod security;

pub use error::{Error, Result};
