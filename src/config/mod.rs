//! Configuration management for the Quarex answer service.

use std::path::PathBuf;
use std::time::Duration;

use answer_core::providers::{AnthropicProvider, GeminiProvider, anthropic, gemini};
use serde::{Deserialize, Serialize};

use crate::core::security::{AuditLog, ContentFilter, OriginPolicy, RateLimiter, Security, origin};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener.
    pub server: ServerConfig,

    /// Claude provider.
    pub claude: ClaudeConfig,

    /// Gemini provider.
    pub gemini: GeminiConfig,

    /// Origin allowlist, rate limit and audit log.
    pub security: SecurityConfig,
}

impl Config {
    /// Load configuration from the default path, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read or parsed.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env_with(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load configuration from `path`, or defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("invalid config at {}: {e}", path.display()))
    }

    /// Override secrets and models from the environment.
    ///
    /// Keys: `ANTHROPIC_API_KEY`, `GEMINI_API_KEY`, `CLAUDE_MODEL`,
    /// `GEMINI_MODEL`. Empty values are ignored.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = var("ANTHROPIC_API_KEY") {
            self.claude.api_key = Some(key);
        }
        if let Some(key) = var("GEMINI_API_KEY") {
            self.gemini.api_key = Some(key);
        }
        if let Some(model) = var("CLAUDE_MODEL") {
            self.claude.model = model;
        }
        if let Some(model) = var("GEMINI_MODEL") {
            self.gemini.model = model;
        }
    }

    /// Get the configuration file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Get the config directory path (`~/.config/quarex/`).
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg_config_home).join("quarex"));
        }

        if cfg!(target_os = "macos")
            && let Ok(home) = std::env::var("HOME")
        {
            return Ok(PathBuf::from(home).join(".config").join("quarex"));
        }

        let base = directories::BaseDirs::new()
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;

        Ok(base.config_dir().join("quarex"))
    }

    /// Get the data directory path (`~/.local/share/quarex/`).
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be determined.
    pub fn data_dir() -> anyhow::Result<PathBuf> {
        let base = directories::BaseDirs::new()
            .ok_or_else(|| anyhow::anyhow!("could not determine data directory"))?;

        Ok(base.data_dir().join("quarex"))
    }

    /// Build the Claude provider, or `None` when no key is configured.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn claude_provider(&self) -> anyhow::Result<Option<AnthropicProvider>> {
        let Some(key) = self.claude.api_key.as_deref() else {
            return Ok(None);
        };

        let mut provider = AnthropicProvider::new(key)?
            .with_timeout(Duration::from_secs(self.claude.timeout_secs))
            .with_max_search_uses(self.claude.max_search_uses);
        if let Some(url) = &self.claude.api_url {
            provider = provider.with_api_url(url);
        }
        Ok(Some(provider))
    }

    /// Build the Gemini provider, or `None` when no key is configured.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn gemini_provider(&self) -> anyhow::Result<Option<GeminiProvider>> {
        let Some(key) = self.gemini.api_key.as_deref() else {
            return Ok(None);
        };

        let mut provider =
            GeminiProvider::new(key)?.with_timeout(Duration::from_secs(self.gemini.timeout_secs));
        if let Some(base) = &self.gemini.api_base {
            provider = provider.with_api_base(base);
        }
        Ok(Some(provider))
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,

    /// Port to bind to.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Claude provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaudeConfig {
    pub model: String,

    /// Also read from `ANTHROPIC_API_KEY`. Never written back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Messages endpoint override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Wall-clock budget for one call.
    pub timeout_secs: u64,

    /// Web searches allowed per answer.
    pub max_search_uses: u32,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            model: anthropic::DEFAULT_MODEL.to_string(),
            api_key: None,
            api_url: None,
            timeout_secs: anthropic::DEFAULT_TIMEOUT.as_secs(),
            max_search_uses: anthropic::DEFAULT_MAX_SEARCH_USES,
        }
    }
}

/// Gemini provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub model: String,

    /// Also read from `GEMINI_API_KEY`. Never written back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,

    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: gemini::DEFAULT_MODEL.to_string(),
            api_key: None,
            api_base: None,
            timeout_secs: gemini::DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

/// Request screening configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Browser origins allowed to call the API. Localhost is always allowed.
    pub allowed_origins: Vec<String>,

    /// One pattern per line. Defaults to `blocked_patterns.txt` in the
    /// config directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_patterns_file: Option<PathBuf>,

    /// Where the rate-limit counters and the security log live. Defaults to
    /// `logs/` in the data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    pub rate_limit_requests: usize,

    pub rate_limit_window_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_origins: origin::DEFAULT_ORIGINS.iter().map(ToString::to_string).collect(),
            blocked_patterns_file: None,
            state_dir: None,
            rate_limit_requests: RateLimiter::DEFAULT_MAX_REQUESTS,
            rate_limit_window_secs: RateLimiter::DEFAULT_WINDOW.as_secs(),
        }
    }
}

impl SecurityConfig {
    /// Resolved directory for shared state files.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be determined.
    pub fn state_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Config::data_dir()?.join("logs")),
        }
    }

    /// Resolved blocked patterns file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn blocked_patterns_file(&self) -> anyhow::Result<PathBuf> {
        match &self.blocked_patterns_file {
            Some(path) => Ok(path.clone()),
            None => Ok(Config::config_dir()?.join("blocked_patterns.txt")),
        }
    }

    /// Build the request screening controls.
    ///
    /// # Errors
    ///
    /// Returns an error if a default directory cannot be determined.
    pub fn build(&self) -> anyhow::Result<Security> {
        let state_dir = self.state_dir()?;
        let filter = ContentFilter::load(&self.blocked_patterns_file()?);
        tracing::debug!(patterns = filter.len(), "content filter loaded");

        Ok(Security::new(
            OriginPolicy::new(self.allowed_origins.iter().cloned()),
            filter,
            RateLimiter::new(
                state_dir.join("rate_limits.json"),
                self.rate_limit_requests,
                Duration::from_secs(self.rate_limit_window_secs),
            ),
            AuditLog::new(state_dir.join("security.log")),
        ))
    }
}
