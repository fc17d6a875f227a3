use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, WayfinderError};

/// Top-level configuration for the Wayfinder assistant.
///
/// Loaded from `~/.wayfinder/config.toml` by default. Credentials may be left
/// empty in the file and supplied through the environment instead
/// (see [`WayfinderConfig::apply_env_overrides`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WayfinderConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub maps: MapsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl WayfinderConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: WayfinderConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| WayfinderError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Overlay values from process environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Overlay values from an arbitrary key lookup.
    ///
    /// Recognised keys, first match wins within each group:
    /// - `WAYFINDER_MAPS_API_KEY`, `TOMTOM_API_KEY`
    /// - `WAYFINDER_MAPS_BASE_URL`
    /// - `WAYFINDER_LLM_PROVIDER` (`openai` or `anthropic`)
    /// - `WAYFINDER_LLM_API_KEY`, then the vendor key of the configured
    ///   provider (`OPENAI_API_KEY` or `ANTHROPIC_API_KEY`); any of these
    ///   also enables the LLM. When no key is configured at all and no
    ///   provider was named, the other vendor's key selects that provider.
    /// - `WAYFINDER_LLM_MODEL`
    /// - `WAYFINDER_LOG_LEVEL`
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| lookup(*k))
                .find(|v| !v.trim().is_empty())
        };

        if let Some(key) = first(&["WAYFINDER_MAPS_API_KEY", "TOMTOM_API_KEY"]) {
            self.maps.api_key = key;
        }
        if let Some(url) = first(&["WAYFINDER_MAPS_BASE_URL"]) {
            self.maps.base_url = url;
        }
        let named_provider = first(&["WAYFINDER_LLM_PROVIDER"]);
        if let Some(name) = &named_provider {
            match name.parse::<LlmProvider>() {
                Ok(provider) => self.llm.provider = provider,
                Err(e) => warn!("Ignoring WAYFINDER_LLM_PROVIDER: {}", e),
            }
        }
        let current = self.llm.provider;
        let llm_key = first(&["WAYFINDER_LLM_API_KEY", current.api_key_var()])
            .map(|key| (current, key))
            .or_else(|| {
                if named_provider.is_some() || !self.llm.api_key.trim().is_empty() {
                    return None;
                }
                LlmProvider::ALL
                    .into_iter()
                    .filter(|p| *p != current)
                    .find_map(|p| first(&[p.api_key_var()]).map(|key| (p, key)))
            });
        if let Some((provider, key)) = llm_key {
            self.llm.provider = provider;
            self.llm.api_key = key;
            self.llm.enabled = true;
        }
        if let Some(model) = first(&["WAYFINDER_LLM_MODEL"]) {
            self.llm.model = model;
        }
        if let Some(level) = first(&["WAYFINDER_LOG_LEVEL"]) {
            self.general.log_level = level;
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Maps capability provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapsConfig {
    /// Upstream API credential. Empty means "not configured".
    pub api_key: String,
    /// Upstream base URL.
    pub base_url: String,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    /// Travel mode used when the query does not name one.
    pub default_travel_mode: String,
    /// Maximum places requested from the search endpoint.
    pub search_limit: usize,
    /// Static map defaults.
    #[serde(default)]
    pub static_map: StaticMapConfig,
}

impl Default for MapsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.tomtom.com".to_string(),
            timeout_secs: 10,
            default_travel_mode: "car".to_string(),
            search_limit: 10,
            static_map: StaticMapConfig::default(),
        }
    }
}

/// Static map image sub-configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticMapConfig {
    /// Zoom level (0-22).
    pub zoom: u8,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
}

impl Default for StaticMapConfig {
    fn default() -> Self {
        Self {
            zoom: 15,
            width: 512,
            height: 512,
        }
    }
}

/// Remote language model vendor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// OpenAI chat completions.
    #[default]
    OpenAi,
    /// Anthropic messages.
    Anthropic,
}

impl LlmProvider {
    pub const ALL: [LlmProvider; 2] = [LlmProvider::OpenAi, LlmProvider::Anthropic];

    pub fn default_base_url(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "https://api.openai.com",
            LlmProvider::Anthropic => "https://api.anthropic.com",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "gpt-4o-mini",
            LlmProvider::Anthropic => "claude-3-5-haiku-latest",
        }
    }

    /// Vendor environment variable holding the API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "OPENAI_API_KEY",
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProvider::OpenAi => write!(f, "openai"),
            LlmProvider::Anthropic => write!(f, "anthropic"),
        }
    }
}

impl FromStr for LlmProvider {
    type Err = WayfinderError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAi),
            "anthropic" => Ok(LlmProvider::Anthropic),
            other => Err(WayfinderError::Config(format!("Unknown LLM provider: {other}"))),
        }
    }
}

/// General-conversation language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Use the remote model for general queries. Rule-based replies otherwise.
    pub enabled: bool,
    /// Which vendor API to call.
    pub provider: LlmProvider,
    /// API credential. Empty means "not configured".
    pub api_key: String,
    /// API base URL. Empty means the provider's public endpoint.
    pub base_url: String,
    /// Model identifier. Empty means the provider's default model.
    pub model: String,
    /// Maximum tokens in a generated reply.
    pub max_tokens: u32,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: LlmProvider::default(),
            api_key: String::new(),
            base_url: String::new(),
            model: String::new(),
            max_tokens: 500,
            timeout_secs: 30,
        }
    }
}

impl LlmConfig {
    /// Configured base URL, or the provider's public endpoint.
    pub fn effective_base_url(&self) -> &str {
        match self.base_url.trim() {
            "" => self.provider.default_base_url(),
            url => url,
        }
    }

    /// Configured model, or the provider's default model.
    pub fn effective_model(&self) -> &str {
        match self.model.trim() {
            "" => self.provider.default_model(),
            model => model,
        }
    }
}

/// Conversation handling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum list items (places, steps, matrix cells) shown in a reply.
    pub max_reply_items: usize,
    /// Maximum accepted message length in characters.
    pub max_message_length: usize,
    /// Entries returned by history reads when no limit is given.
    pub default_history_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_reply_items: 5,
            max_message_length: 2000,
            default_history_limit: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = WayfinderConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert!(config.maps.api_key.is_empty());
        assert_eq!(config.maps.base_url, "https://api.tomtom.com");
        assert_eq!(config.maps.timeout_secs, 10);
        assert_eq!(config.maps.static_map.zoom, 15);
        assert!(!config.llm.enabled);
        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(config.llm.effective_base_url(), "https://api.openai.com");
        assert_eq!(config.llm.effective_model(), "gpt-4o-mini");
        assert_eq!(config.chat.max_reply_items, 5);
    }

    #[test]
    fn test_llm_provider_from_file() {
        let content = r#"
[llm]
provider = "anthropic"
model = "claude-3-5-sonnet-latest"
"#;
        let file = create_temp_config(content);
        let config = WayfinderConfig::load(file.path()).unwrap();
        assert_eq!(config.llm.provider, LlmProvider::Anthropic);
        assert_eq!(config.llm.effective_base_url(), "https://api.anthropic.com");
        assert_eq!(config.llm.effective_model(), "claude-3-5-sonnet-latest");

        let file = create_temp_config("[llm]\nprovider = \"mistral\"\n");
        assert!(matches!(
            WayfinderConfig::load(file.path()),
            Err(WayfinderError::Config(_))
        ));
    }

    #[test]
    fn test_llm_provider_parse_and_display() {
        assert_eq!("OpenAI".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAi);
        assert_eq!(" anthropic ".parse::<LlmProvider>().unwrap(), LlmProvider::Anthropic);
        assert!("mistral".parse::<LlmProvider>().is_err());
        for provider in LlmProvider::ALL {
            assert_eq!(provider.to_string().parse::<LlmProvider>().unwrap(), provider);
        }
    }

    #[test]
    fn test_load_partial_config() {
        let content = r#"
[maps]
api_key = "abc123"
timeout_secs = 3

[chat]
max_reply_items = 3
"#;
        let file = create_temp_config(content);
        let config = WayfinderConfig::load(file.path()).unwrap();
        assert_eq!(config.maps.api_key, "abc123");
        assert_eq!(config.maps.timeout_secs, 3);
        // Unspecified fields keep their defaults
        assert_eq!(config.maps.default_travel_mode, "car");
        assert_eq!(config.maps.static_map.width, 512);
        assert_eq!(config.chat.max_reply_items, 3);
        assert_eq!(config.chat.max_message_length, 2000);
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let file = create_temp_config("this is {{ not valid TOML");
        let result = WayfinderConfig::load(file.path());
        assert!(matches!(result, Err(WayfinderError::Config(_))));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = WayfinderConfig::load_or_default(&dir.path().join("absent.toml"));
        assert_eq!(config.maps.timeout_secs, 10);
    }

    #[test]
    fn test_config_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("dir").join("config.toml");

        let mut config = WayfinderConfig::default();
        config.maps.search_limit = 7;
        config.save(&path).unwrap();

        assert!(path.exists());
        let reloaded = WayfinderConfig::load(&path).unwrap();
        assert_eq!(reloaded.maps.search_limit, 7);
        assert_eq!(reloaded.llm.model, config.llm.model);
    }

    #[test]
    fn test_env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("TOMTOM_API_KEY", "tt-key"),
            ("ANTHROPIC_API_KEY", "llm-key"),
            ("WAYFINDER_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = WayfinderConfig::default();
        config.apply_overrides_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.maps.api_key, "tt-key");
        assert_eq!(config.llm.api_key, "llm-key");
        assert!(config.llm.enabled);
        // Only an Anthropic key is present, so that provider is selected.
        assert_eq!(config.llm.provider, LlmProvider::Anthropic);
        assert_eq!(config.general.log_level, "debug");
    }

    #[test]
    fn test_env_overrides_openai_key() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-openai"),
            ("ANTHROPIC_API_KEY", "sk-anthropic"),
        ]
        .into_iter()
        .collect();

        let mut config = WayfinderConfig::default();
        config.apply_overrides_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(config.llm.api_key, "sk-openai");
        assert!(config.llm.enabled);
    }

    #[test]
    fn test_env_overrides_named_provider() {
        let env: HashMap<&str, &str> = [
            ("WAYFINDER_LLM_PROVIDER", "anthropic"),
            ("OPENAI_API_KEY", "sk-openai"),
            ("ANTHROPIC_API_KEY", "sk-anthropic"),
        ]
        .into_iter()
        .collect();

        let mut config = WayfinderConfig::default();
        config.apply_overrides_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.llm.provider, LlmProvider::Anthropic);
        assert_eq!(config.llm.api_key, "sk-anthropic");

        // A named provider never switches to the other vendor's key.
        let mut config = WayfinderConfig::default();
        config.apply_overrides_from(|k| match k {
            "WAYFINDER_LLM_PROVIDER" => Some("openai".to_string()),
            "ANTHROPIC_API_KEY" => Some("sk-anthropic".to_string()),
            _ => None,
        });
        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert!(config.llm.api_key.is_empty());
        assert!(!config.llm.enabled);
    }

    #[test]
    fn test_env_overrides_prefer_wayfinder_keys() {
        let env: HashMap<&str, &str> = [
            ("WAYFINDER_MAPS_API_KEY", "primary"),
            ("TOMTOM_API_KEY", "secondary"),
        ]
        .into_iter()
        .collect();

        let mut config = WayfinderConfig::default();
        config.apply_overrides_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.maps.api_key, "primary");
    }

    #[test]
    fn test_env_overrides_ignore_blank_values() {
        let mut config = WayfinderConfig::default();
        config.maps.api_key = "from-file".to_string();
        config.apply_overrides_from(|k| {
            (k == "WAYFINDER_MAPS_API_KEY").then(|| "   ".to_string())
        });
        assert_eq!(config.maps.api_key, "from-file");
        assert!(!config.llm.enabled);
    }
}
