//! Configuration management for RyuBot.
//!
//! The bot reads a single JSON file at `~/.ryubot/config.json`. Every field has
//! a default, so a missing file is not an error; credentials are normally
//! supplied through the environment instead.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `TELEGRAM_TOKEN` / `TELEGRAM_BOT_TOKEN` → telegram.bot_token
//! - `DEEPSEEK_API_KEY` → completion.api_key
//! - `DEEPSEEK_BASE_URL` → completion.endpoint
//! - `RYUBOT_CONVERSATION_DIR` → export.dir
//! - `RYUBOT_MAX_TURNS` → session.max_turns
//! - `RYUBOT_LOG_LEVEL` → observability.log_level
//! - `RYUBOT_LOG_FORMAT` → observability.log_format

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".ryubot"),
        |dirs| dirs.home_dir().join(".ryubot"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Default system preamble injected ahead of every conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an advanced AI assistant named RyuBot Coder, \
specialized in programming, debugging, and generating code. You are capable of understanding \
complex software development concepts, identifying issues in code, fixing them, and generating \
high-quality, efficient code as required. Provide detailed explanations and recommendations when \
responding to user requests about software, coding, or debugging. Answer questions based on the \
language used by the user. If someone asks about you, you are an AI developed by @RyuDevpr using \
the DeepSeek model.";

// ============================================================================
// Telegram
// ============================================================================

/// Telegram Bot API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather
    #[serde(default)]
    pub bot_token: String,

    /// Bot API base URL (overridable for tests and self-hosted API servers)
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,

    /// Long-polling timeout passed to `getUpdates`
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: default_telegram_api_base(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

// ============================================================================
// Completion endpoint
// ============================================================================

/// Remote chat-completion endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Full URL of the chat completions endpoint
    #[serde(default = "default_completion_endpoint")]
    pub endpoint: String,

    /// Bearer token for the endpoint
    #[serde(default)]
    pub api_key: String,

    /// Request timeout in seconds
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,

    /// System preamble prepended to every prompt
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_completion_endpoint(),
            api_key: String::new(),
            timeout_secs: default_completion_timeout(),
            system_prompt: default_system_prompt(),
        }
    }
}

// ============================================================================
// Modes
// ============================================================================

/// A selectable model/temperature pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModePreset {
    /// Model name sent to the completion endpoint
    pub model: String,
    /// Sampling temperature
    pub temperature: f64,
    /// Short human-readable note shown by `/info`
    #[serde(default)]
    pub description: String,
}

impl ModePreset {
    pub fn new(model: impl Into<String>, temperature: f64) -> Self {
        Self {
            model: model.into(),
            temperature,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// The two presets the mode toggle flips between.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModesConfig {
    /// Active at start-up
    #[serde(default = "default_primary_mode")]
    pub primary: ModePreset,

    /// Selected by the first toggle
    #[serde(default = "default_alternate_mode")]
    pub alternate: ModePreset,
}

impl Default for ModesConfig {
    fn default() -> Self {
        Self {
            primary: default_primary_mode(),
            alternate: default_alternate_mode(),
        }
    }
}

// ============================================================================
// Session / export
// ============================================================================

/// Conversation window configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum number of turns retained per chat
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

/// Conversation export configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory receiving one JSON file per cleared conversation
    #[serde(default = "default_export_dir")]
    pub dir: String,

    /// Maximum length (in characters) of the display-name part of a file name
    #[serde(default = "default_name_max_len")]
    pub name_max_len: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: default_export_dir(),
            name_max_len: default_name_max_len(),
        }
    }
}

impl ExportConfig {
    /// Export directory with `~` and environment variables expanded.
    pub fn dir_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::full(&self.dir).map_or_else(
            |_| self.dir.clone(),
            |expanded| expanded.into_owned(),
        ))
    }
}

// ============================================================================
// Observability
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub completion: CompletionConfig,

    #[serde(default)]
    pub modes: ModesConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Empty values are ignored so that an exported-but-blank variable does
    /// not wipe a token read from the config file.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("TELEGRAM_TOKEN").or_else(|| get("TELEGRAM_BOT_TOKEN")) {
            self.telegram.bot_token = token;
        }
        if let Some(key) = get("DEEPSEEK_API_KEY") {
            self.completion.api_key = key;
        }
        if let Some(url) = get("DEEPSEEK_BASE_URL") {
            self.completion.endpoint = url;
        }
        if let Some(dir) = get("RYUBOT_CONVERSATION_DIR") {
            self.export.dir = dir;
        }
        if let Some(turns) = get("RYUBOT_MAX_TURNS") {
            match turns.parse() {
                Ok(n) => self.session.max_turns = n,
                Err(_) => tracing::warn!(value = %turns, "Ignoring invalid RYUBOT_MAX_TURNS"),
            }
        }
        if let Some(level) = get("RYUBOT_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = get("RYUBOT_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }
}

// ============================================================================
// Defaults
// ============================================================================

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".into()
}
fn default_poll_timeout() -> u64 {
    60
}
fn default_completion_endpoint() -> String {
    "https://api.deepseek.com/chat/completions".into()
}
fn default_completion_timeout() -> u64 {
    120
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}
fn default_primary_mode() -> ModePreset {
    ModePreset::new("deepseek-chat", 1.3)
        .with_description("DeepSeek-V3, general conversation")
}
fn default_alternate_mode() -> ModePreset {
    ModePreset::new("deepseek-reasoner", 0.0)
        .with_description("DeepSeek-R1, focused on coding and math")
}
fn default_max_turns() -> usize {
    30
}
fn default_export_dir() -> String {
    "conversation".into()
}
fn default_name_max_len() -> usize {
    20
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
