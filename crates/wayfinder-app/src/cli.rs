//! CLI argument definitions for the Wayfinder binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// Wayfinder, a conversational maps assistant.
#[derive(Parser, Debug)]
#[command(name = "wayfinder", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// User id the conversation is stored under.
    #[arg(short = 'u', long = "user", default_value = "local")]
    pub user: String,

    /// Answer one query and exit instead of starting the prompt.
    #[arg(short = 'q', long = "query")]
    pub query: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > WAYFINDER_CONFIG env var > ~/.wayfinder/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        self.resolve_config_path_from(std::env::var("WAYFINDER_CONFIG").ok())
    }

    fn resolve_config_path_from(&self, env_value: Option<String>) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Some(p) = env_value.filter(|p| !p.trim().is_empty()) {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Log level override. `None` keeps the env/config value.
    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".wayfinder").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".wayfinder").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(["wayfinder"]);
        assert_eq!(args.user, "local");
        assert!(args.query.is_none());
        assert!(args.resolve_log_level().is_none());
    }

    #[test]
    fn test_config_flag_beats_env() {
        let args = CliArgs::parse_from(["wayfinder", "--config", "/tmp/a.toml"]);
        assert_eq!(
            args.resolve_config_path_from(Some("/tmp/b.toml".to_string())),
            PathBuf::from("/tmp/a.toml")
        );
    }

    #[test]
    fn test_env_config_path() {
        let args = CliArgs::parse_from(["wayfinder", "-l", "debug", "-q", "hello"]);
        assert_eq!(
            args.resolve_config_path_from(Some("/tmp/b.toml".to_string())),
            PathBuf::from("/tmp/b.toml")
        );
        assert_eq!(args.resolve_log_level().as_deref(), Some("debug"));
        assert_eq!(args.query.as_deref(), Some("hello"));
    }
}
