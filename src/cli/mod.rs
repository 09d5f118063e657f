//! CLI command parsing.

use clap::{Parser, Subcommand, ValueEnum};

use crate::build_info;

/// Quarex - streaming answers with citations.
#[derive(Parser)]
#[command(name = "quarex")]
#[command(about = "Streaming answer service with citation extraction")]
#[command(version = build_info::LONG_VERSION)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server.
    Serve {
        /// Host to bind to (overrides config).
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides config).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Answer one question from the terminal.
    Ask {
        /// The question.
        question: String,

        /// Which model answers.
        #[arg(long, value_enum, default_value_t = ProviderChoice::Claude)]
        provider: ProviderChoice,

        /// Wait for the full answer instead of streaming it.
        #[arg(long)]
        no_stream: bool,

        /// Topic category used as extra context.
        #[arg(short, long, default_value = "")]
        category: String,

        /// introductory, intermediate or advanced.
        #[arg(short, long, default_value = "intermediate")]
        expertise: String,

        /// Answer as a podcast script (Claude only).
        #[arg(long)]
        podcast: bool,
    },

    /// Turn URLs into titled markdown links.
    Citation {
        /// URLs or existing `[title](url)` links.
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Manage configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the current configuration.
    Show,

    /// Show the configuration file path.
    Path,
}

/// Answering model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderChoice {
    Claude,
    Gemini,
}
