use std::io::Write as _;
use std::process::ExitCode;

use answer_core::{
    AnswerProvider, AnswerResult, CitationResolver, ClientEvent, aggregate, answer_with_fallback,
};
use clap::Parser;
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use quarex::{
    Config,
    cli::{Cli, Commands, ConfigCommands, ProviderChoice},
    core::prompt::{self, ClaudeOptions, Expertise, GeminiOptions},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve { host, port } => {
            let mut config = Config::load()?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            quarex::api::serve(&config).await?;
        }

        Commands::Ask {
            question,
            provider,
            no_stream,
            category,
            expertise,
            podcast,
        } => {
            let config = Config::load()?;
            match provider {
                ProviderChoice::Claude => {
                    let provider = config.claude_provider()?.ok_or_else(|| {
                        anyhow::anyhow!("No Claude API key configured. Set ANTHROPIC_API_KEY.")
                    })?;
                    let options = ClaudeOptions {
                        category,
                        expertise: Expertise::parse(&expertise),
                        podcast,
                        ..ClaudeOptions::default()
                    };
                    let request = prompt::claude_request(&config.claude.model, &question, &options);
                    if no_stream {
                        let result = answer_with_fallback(&provider, &request, None).await?;
                        print_result(&result);
                    } else {
                        stream_to_stdout(&provider, request).await?;
                    }
                }
                ProviderChoice::Gemini => {
                    let provider = config.gemini_provider()?.ok_or_else(|| {
                        anyhow::anyhow!("No Gemini API key configured. Set GEMINI_API_KEY.")
                    })?;
                    let options = GeminiOptions {
                        category,
                        ..GeminiOptions::default()
                    };
                    let request = prompt::gemini_request(&config.gemini.model, &question, &options);
                    let resolver = CitationResolver::new()?;
                    let result = answer_with_fallback(&provider, &request, Some(&resolver)).await?;
                    print_result(&result);
                }
            }
        }

        Commands::Citation { urls } => {
            let resolver = CitationResolver::new()?;
            for link in resolver.resolve_all(&urls).await {
                println!("{}", link.markdown);
            }
        }

        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let config = Config::load()?;
                println!("{}", toml::to_string_pretty(&config)?);
            }
            ConfigCommands::Path => {
                let path = Config::config_path()?;
                println!("{}", path.display());
            }
        },
    }

    Ok(())
}

/// Print streamed text as it arrives, then the sources.
async fn stream_to_stdout(
    provider: &dyn AnswerProvider,
    request: answer_core::CompletionRequest,
) -> anyhow::Result<()> {
    let events = provider.stream(request).await?;
    let events = aggregate(events, provider.name());
    futures::pin_mut!(events);

    while let Some(event) = events.next().await {
        match event {
            ClientEvent::Text { text } => {
                print!("{text}");
                std::io::stdout().flush().ok();
            }
            ClientEvent::Done(result) => {
                println!();
                print_sources(&result);
            }
            ClientEvent::Error { error } => {
                println!();
                anyhow::bail!("{error}");
            }
        }
    }

    Ok(())
}

fn print_result(result: &AnswerResult) {
    println!("{}", result.text);
    print_sources(result);
}

fn print_sources(result: &AnswerResult) {
    if result.markdown_links.is_empty() {
        return;
    }
    println!("\nSources ({}):", mode_label(result));
    for link in &result.markdown_links {
        println!("  {link}");
    }
}

fn mode_label(result: &AnswerResult) -> String {
    serde_json::to_value(result.mode)
        .ok()
        .and_then(|v| v.as_str().map(ToString::to_string))
        .unwrap_or_default()
}
