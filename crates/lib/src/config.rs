//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.eva/config.json`) and environment.
//! The two secrets (Telegram bot token, assistant API key) can live in the file
//! but are normally supplied via environment variables, which always win.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Health/webhook HTTP listener settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Channel settings (Telegram).
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Assistant-service settings (persona, knowledge document, polling).
    #[serde(default)]
    pub assistant: AssistantConfig,
}

/// Gateway bind and port for the health endpoint and optional Telegram webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for the HTTP listener (default 8484).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    8484
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Per-channel config (Telegram only).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramChannelConfig,
}

/// Telegram channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramChannelConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN env when set.
    pub bot_token: Option<String>,
    /// When set, use webhook mode: Telegram POSTs updates to this URL. If unset, long-poll getUpdates is used.
    pub webhook_url: Option<String>,
    /// Optional secret for webhook verification (X-Telegram-Bot-Api-Secret-Token). Used only when webhook_url is set.
    pub webhook_secret: Option<String>,
}

/// Assistant-service config: persona identity, grounding document, run polling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantConfig {
    /// API key for the assistant service. Overridden by OPENAI_API_KEY env when set.
    pub api_key: Option<String>,
    /// API base URL override (default https://api.openai.com/v1). Mainly for test servers.
    pub base_url: Option<String>,
    /// Model id for the assistant persona (default "gpt-3.5-turbo-1106").
    pub model: Option<String>,
    /// Display name of the assistant persona (default "Eva").
    pub name: Option<String>,
    /// Persona instruction file. Relative paths resolve against the config directory; default `persona.md` there.
    pub persona_path: Option<PathBuf>,
    /// Knowledge document uploaded at startup and attached to every user message. Default `knowledge.txt` in the config directory.
    pub knowledge_path: Option<PathBuf>,
    /// Optional per-run instruction override sent with every run (e.g. how to address the user).
    pub run_instructions: Option<String>,
    /// Run polling and retry settings.
    #[serde(default)]
    pub poll: PollConfig,
}

/// Bounds for waiting on a run: wall-clock budget, backoff interval range, retry attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollConfig {
    /// Wall-clock budget for one run to finish before the relay gives up (default 120).
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    /// First sleep between status checks, doubled each check (default 500).
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    /// Upper bound for the sleep between status checks (default 8000).
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    /// Attempts for a remote call that fails transiently, including the first (default 3).
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

fn default_max_wait_secs() -> u64 {
    120
}

fn default_initial_interval_ms() -> u64 {
    500
}

fn default_max_interval_ms() -> u64 {
    8000
}

fn default_retry_attempts() -> u32 {
    3
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_wait_secs: default_max_wait_secs(),
            initial_interval_ms: default_initial_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            retry_attempts: default_retry_attempts(),
        }
    }
}

/// Resolve the Telegram bot token: env TELEGRAM_BOT_TOKEN overrides config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    non_empty_env("TELEGRAM_BOT_TOKEN")
        .or_else(|| non_empty(config.channels.telegram.bot_token.as_deref()))
}

/// Resolve the assistant-service API key: env OPENAI_API_KEY overrides config.
pub fn resolve_api_key(config: &Config) -> Option<String> {
    non_empty_env("OPENAI_API_KEY").or_else(|| non_empty(config.assistant.api_key.as_deref()))
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| non_empty(Some(&s)))
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// The two required secrets, resolved and verified present before serving starts.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub telegram_token: String,
    pub api_key: String,
}

impl Secrets {
    /// Build from already-resolved values; names every missing secret so startup can refuse cleanly.
    pub fn from_parts(
        telegram_token: Option<String>,
        api_key: Option<String>,
    ) -> Result<Self, String> {
        let mut missing = Vec::new();
        if telegram_token.is_none() {
            missing.push("Telegram bot token (TELEGRAM_BOT_TOKEN or channels.telegram.botToken)");
        }
        if api_key.is_none() {
            missing.push("assistant API key (OPENAI_API_KEY or assistant.apiKey)");
        }
        if !missing.is_empty() {
            return Err(format!("missing required secrets: {}", missing.join(", ")));
        }
        Ok(Self {
            telegram_token: telegram_token.unwrap_or_default(),
            api_key: api_key.unwrap_or_default(),
        })
    }

    /// Resolve both secrets from env and config. Errors when either is absent.
    pub fn resolve(config: &Config) -> Result<Self> {
        Self::from_parts(resolve_telegram_token(config), resolve_api_key(config))
            .map_err(|e| anyhow::anyhow!(e))
    }
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("EVA_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".eva").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

fn config_parent(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Resolve the persona instruction file: `assistant.personaPath` if set (relative to the config directory), otherwise `persona.md` there.
pub fn resolve_persona_path(config: &Config, config_path: &Path) -> PathBuf {
    resolve_config_relative(
        config.assistant.persona_path.as_deref(),
        config_path,
        "persona.md",
    )
}

/// Resolve the knowledge document: `assistant.knowledgePath` if set (relative to the config directory), otherwise `knowledge.txt` there.
pub fn resolve_knowledge_path(config: &Config, config_path: &Path) -> PathBuf {
    resolve_config_relative(
        config.assistant.knowledge_path.as_deref(),
        config_path,
        "knowledge.txt",
    )
}

fn resolve_config_relative(override_path: Option<&Path>, config_path: &Path, default_name: &str) -> PathBuf {
    let parent = config_parent(config_path);
    match override_path {
        Some(p) if !p.as_os_str().is_empty() => {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                parent.join(p)
            }
        }
        _ => parent.join(default_name),
    }
}

/// Load config from the default path (or EVA_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used (for resolving the config directory).
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gateway_port_and_bind() {
        let g = GatewayConfig::default();
        assert_eq!(g.port, 8484);
        assert_eq!(g.bind, "127.0.0.1");
    }

    #[test]
    fn default_poll_bounds() {
        let p = PollConfig::default();
        assert_eq!(p.max_wait_secs, 120);
        assert_eq!(p.initial_interval_ms, 500);
        assert_eq!(p.max_interval_ms, 8000);
        assert_eq!(p.retry_attempts, 3);
    }

    #[test]
    fn secrets_missing_both() {
        let err = Secrets::from_parts(None, None).unwrap_err();
        assert!(err.contains("Telegram bot token"));
        assert!(err.contains("assistant API key"));
    }

    #[test]
    fn secrets_missing_one_names_it() {
        let err = Secrets::from_parts(Some("123:abc".into()), None).unwrap_err();
        assert!(!err.contains("Telegram bot token"));
        assert!(err.contains("assistant API key"));
    }

    #[test]
    fn secrets_present() {
        let s = Secrets::from_parts(Some("123:abc".into()), Some("sk-test".into())).unwrap();
        assert_eq!(s.telegram_token, "123:abc");
        assert_eq!(s.api_key, "sk-test");
    }

    #[test]
    fn resolve_persona_path_default() {
        let config = Config::default();
        let path = Path::new("/home/user/.eva/config.json");
        assert_eq!(
            resolve_persona_path(&config, path),
            PathBuf::from("/home/user/.eva/persona.md")
        );
    }

    #[test]
    fn resolve_knowledge_path_override_relative() {
        let mut config = Config::default();
        config.assistant.knowledge_path = Some(PathBuf::from("docs/faq.txt"));
        let path = Path::new("/home/user/.eva/config.json");
        assert_eq!(
            resolve_knowledge_path(&config, path),
            PathBuf::from("/home/user/.eva/docs/faq.txt")
        );
    }

    #[test]
    fn resolve_knowledge_path_override_absolute() {
        let mut config = Config::default();
        config.assistant.knowledge_path = Some(PathBuf::from("/srv/eva/knowledge.txt"));
        let path = Path::new("/home/user/.eva/config.json");
        assert_eq!(
            resolve_knowledge_path(&config, path),
            PathBuf::from("/srv/eva/knowledge.txt")
        );
    }
}
