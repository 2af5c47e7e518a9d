use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Openrouter,
    Ollama,
    Openai,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::Openrouter => write!(f, "openrouter"),
            LlmProvider::Ollama => write!(f, "ollama"),
            LlmProvider::Openai => write!(f, "openai"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: default_model(),
            base_url: String::new(),
            api_key: String::new(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

impl LlmConfig {
    /// Returns the effective base_url: if the stored value is empty,
    /// fall back to the canonical URL for the configured provider.
    pub fn effective_base_url(&self) -> &str {
        if !self.base_url.is_empty() {
            return &self.base_url;
        }
        match self.provider {
            LlmProvider::Openrouter => "https://openrouter.ai/api/v1",
            LlmProvider::Ollama => "http://localhost:11434/v1",
            LlmProvider::Openai => "https://api.openai.com/v1",
        }
    }

    /// Whether analysis can be offered at all. Local Ollama needs no key.
    pub fn is_configured(&self) -> bool {
        !self.model.is_empty()
            && (self.provider == LlmProvider::Ollama || !self.api_key.trim().is_empty())
    }
}

/// A command the router can be told to serve.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Start,
    Help,
    Encode,
    Decode,
    Analyze,
    Findb64,
}

impl CommandKind {
    pub const ALL: [CommandKind; 6] = [
        CommandKind::Start,
        CommandKind::Help,
        CommandKind::Encode,
        CommandKind::Decode,
        CommandKind::Analyze,
        CommandKind::Findb64,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CommandKind::Start => "start",
            CommandKind::Help => "help",
            CommandKind::Encode => "encode",
            CommandKind::Decode => "decode",
            CommandKind::Analyze => "analyze",
            CommandKind::Findb64 => "findb64",
        }
    }
}

/// The enumerated set of commands a deployment serves.
/// `start` and `help` are always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSet(BTreeSet<CommandKind>);

impl CommandSet {
    pub fn all() -> Self {
        Self(CommandKind::ALL.into_iter().collect())
    }

    pub fn new(kinds: impl IntoIterator<Item = CommandKind>) -> Self {
        let mut set: BTreeSet<CommandKind> = kinds.into_iter().collect();
        set.insert(CommandKind::Start);
        set.insert(CommandKind::Help);
        Self(set)
    }

    pub fn contains(&self, kind: CommandKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = CommandKind> + '_ {
        self.0.iter().copied()
    }
}

impl Default for CommandSet {
    fn default() -> Self {
        Self::all()
    }
}

impl<'de> Deserialize<'de> for CommandSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let kinds = Vec::<CommandKind>::deserialize(deserializer)?;
        Ok(CommandSet::new(kinds))
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HealthConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CommandsConfig {
    #[serde(default)]
    pub enabled: CommandSet,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScratchConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_scratch_path")]
    pub path: PathBuf,
    #[serde(default = "default_scratch_ttl")]
    pub ttl_secs: u64,
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_scratch_path(),
            ttl_secs: default_scratch_ttl(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub scratch: ScratchConfig,
}

fn default_model() -> String {
    "google/gemini-2.0-flash-001".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_input_chars() -> usize {
    12_000
}

fn default_port() -> u16 {
    5000
}

fn default_scratch_path() -> PathBuf {
    PathBuf::from("scratch/last_result.txt")
}

fn default_scratch_ttl() -> u64 {
    3600
}

impl Config {
    /// Load from `path` if it exists, then apply environment overrides.
    /// Fails when no bot token ends up configured.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)?
        } else {
            Config::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Overlay `TELEGRAM_BOT_TOKEN`, `LLM_API_KEY` and `PORT`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN").filter(|v| !v.is_empty()) {
            self.telegram.bot_token = token;
        }
        if let Some(key) = lookup("LLM_API_KEY").filter(|v| !v.is_empty()) {
            self.llm.api_key = key;
        }
        if let Some(port) = lookup("PORT").filter(|v| !v.is_empty()) {
            self.health.port = port
                .parse()
                .with_context(|| format!("PORT is not a valid port number: {}", port))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            anyhow::bail!(
                "Telegram bot token not set. Set [telegram] bot_token or TELEGRAM_BOT_TOKEN."
            );
        }
        if self.scratch.enabled && self.scratch.ttl_secs == 0 {
            anyhow::bail!("[scratch] ttl_secs must be greater than zero");
        }
        Ok(())
    }

    /// AI capability flag, computed once at startup.
    pub fn analysis_available(&self) -> bool {
        self.llm.is_configured()
    }

    /// `analyze` is offered but nothing can serve it.
    pub fn analysis_misconfigured(&self) -> bool {
        self.commands.enabled.contains(CommandKind::Analyze) && !self.analysis_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.health.port, 5000);
        assert_eq!(config.llm.provider, LlmProvider::Openrouter);
        assert_eq!(config.llm.timeout_secs, 60);
        assert_eq!(config.commands.enabled, CommandSet::all());
        assert!(!config.scratch.enabled);
        assert!(!config.analysis_available());
    }

    #[test]
    fn test_full_config_parses() {
        let config = Config::parse(
            r#"
[telegram]
bot_token = "123:abc"

[llm]
provider = "openai"
model = "gpt-4o-mini"
api_key = "sk-test"
timeout_secs = 15

[health]
port = 8080

[commands]
enabled = ["encode", "decode"]

[scratch]
enabled = true
path = "/tmp/out.txt"
ttl_secs = 60
"#,
        )
        .unwrap();

        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(config.llm.effective_base_url(), "https://api.openai.com/v1");
        assert_eq!(config.llm.timeout_secs, 15);
        assert_eq!(config.health.port, 8080);
        assert!(config.analysis_available());

        let enabled: Vec<CommandKind> = config.commands.enabled.iter().collect();
        assert_eq!(
            enabled,
            vec![
                CommandKind::Start,
                CommandKind::Help,
                CommandKind::Encode,
                CommandKind::Decode
            ]
        );
        assert!(config.scratch.enabled);
        assert_eq!(config.scratch.path, PathBuf::from("/tmp/out.txt"));
    }

    #[test]
    fn test_unknown_command_name_is_rejected() {
        let err = Config::parse("[commands]\nenabled = [\"shell\"]").unwrap_err();
        assert!(format!("{:#}", err).contains("parse"));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = Config::parse("[telegram]\nbot_token = \"file\"").unwrap();
        config
            .apply_overrides(env(&[
                ("TELEGRAM_BOT_TOKEN", "env-token"),
                ("LLM_API_KEY", "env-key"),
                ("PORT", "9000"),
            ]))
            .unwrap();

        assert_eq!(config.telegram.bot_token, "env-token");
        assert_eq!(config.llm.api_key, "env-key");
        assert_eq!(config.health.port, 9000);
    }

    #[test]
    fn test_invalid_port_override_fails() {
        let mut config = Config::default();
        assert!(config.apply_overrides(env(&[("PORT", "eighty")])).is_err());
    }

    #[test]
    fn test_missing_token_fails_validation() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let config = Config::parse("[llm]\nprovider = \"ollama\"\nmodel = \"llama3\"").unwrap();
        assert!(config.analysis_available());
        assert_eq!(config.llm.effective_base_url(), "http://localhost:11434/v1");
    }

    #[test]
    fn test_missing_key_matters_only_when_analyze_enabled() {
        let all = Config::default();
        assert!(all.analysis_misconfigured());

        let without_analyze = Config::parse("[commands]\nenabled = [\"encode\"]").unwrap();
        assert!(!without_analyze.analysis_misconfigured());

        let keyed = Config::parse("[llm]\napi_key = \"sk-test\"").unwrap();
        assert!(!keyed.analysis_misconfigured());
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[telegram]\nbot_token = \"from-file\"").unwrap();

        let config = Config::load(&path).unwrap();
        assert!(!config.telegram.bot_token.is_empty());
    }
}
