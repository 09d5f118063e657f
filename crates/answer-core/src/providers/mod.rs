//! Hosted model clients.

pub mod anthropic;
pub mod gemini;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
