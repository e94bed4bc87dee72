use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_STALE_AFTER_DAYS;

pub const DEFAULT_USER_AGENT: &str = "spelltool/0.1";
pub const DEFAULT_SCRAPE_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
pub const DEFAULT_OAUTH_URL: &str = "https://oauth.battle.net/token";
pub const DEFAULT_API_BASE: &str = "https://us.api.blizzard.com";
pub const DEFAULT_NAMESPACE: &str = "static-us";
pub const DEFAULT_LOCALE: &str = "en_US";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_BLIZZARD_DELAY_MS: u64 = 200;
pub const DEFAULT_WOWHEAD_DELAY_MS: u64 = 500;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ToolConfig {
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub blizzard: BlizzardSection,
    #[serde(default)]
    pub wowhead: WowheadSection,
    #[serde(default)]
    pub fetch: FetchSection,
}

/// Document locations, relative to the project root unless absolute.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct PathsSection {
    pub keybinds: Option<String>,
    pub cache: Option<String>,
    pub token: Option<String>,
    pub env_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct BlizzardSection {
    pub oauth_url: Option<String>,
    pub api_base: Option<String>,
    pub namespace: Option<String>,
    pub locale: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WowheadSection {
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct FetchSection {
    pub timeout_ms: Option<u64>,
    pub blizzard_delay_ms: Option<u64>,
    pub wowhead_delay_ms: Option<u64>,
    pub stale_after_days: Option<i64>,
    pub user_agent: Option<String>,
}

impl ToolConfig {
    /// Resolve the OAuth token endpoint: env SPELLTOOL_OAUTH_URL > config > default.
    pub fn oauth_url(&self) -> String {
        env_string("SPELLTOOL_OAUTH_URL")
            .or_else(|| self.blizzard.oauth_url.clone())
            .unwrap_or_else(|| DEFAULT_OAUTH_URL.to_string())
    }

    /// Resolve the game data API base: env SPELLTOOL_API_BASE > config > default.
    pub fn api_base(&self) -> String {
        env_string("SPELLTOOL_API_BASE")
            .or_else(|| self.blizzard.api_base.clone())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn namespace(&self) -> String {
        env_string("SPELLTOOL_NAMESPACE")
            .or_else(|| self.blizzard.namespace.clone())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    }

    pub fn locale(&self) -> String {
        env_string("SPELLTOOL_LOCALE")
            .or_else(|| self.blizzard.locale.clone())
            .unwrap_or_else(|| DEFAULT_LOCALE.to_string())
    }

    pub fn user_agent(&self) -> String {
        env_string("SPELLTOOL_USER_AGENT")
            .or_else(|| self.fetch.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    /// The unofficial source rejects obvious bot agents, so it gets its own.
    pub fn scrape_user_agent(&self) -> String {
        self.wowhead
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_SCRAPE_USER_AGENT.to_string())
    }

    pub fn timeout_ms(&self) -> u64 {
        env_u64("SPELLTOOL_HTTP_TIMEOUT_MS")
            .or(self.fetch.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    pub fn blizzard_delay_ms(&self) -> u64 {
        self.fetch
            .blizzard_delay_ms
            .unwrap_or(DEFAULT_BLIZZARD_DELAY_MS)
    }

    pub fn wowhead_delay_ms(&self) -> u64 {
        self.fetch
            .wowhead_delay_ms
            .unwrap_or(DEFAULT_WOWHEAD_DELAY_MS)
    }

    pub fn stale_after_days(&self) -> i64 {
        self.fetch
            .stale_after_days
            .filter(|days| *days >= 0)
            .unwrap_or(DEFAULT_STALE_AFTER_DAYS)
    }
}

/// Load and parse a ToolConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<ToolConfig> {
    if !config_path.exists() {
        return Ok(ToolConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: ToolConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

pub fn render_default_config() -> String {
    format!(
        "# spelltool configuration (materialized by `spelltool init`)\n\n[paths]\n# keybinds = \"_data/keybinds.yml\"\n# cache = \"_data/abilities_cache.yml\"\n# token = \".spelltool/blizzard_token.json\"\n# env_file = \".env\"\n\n[blizzard]\n# oauth_url = \"{DEFAULT_OAUTH_URL}\"\n# api_base = \"{DEFAULT_API_BASE}\"\nnamespace = \"{DEFAULT_NAMESPACE}\"\nlocale = \"{DEFAULT_LOCALE}\"\n\n[wowhead]\n# user_agent = \"{DEFAULT_SCRAPE_USER_AGENT}\"\n\n[fetch]\ntimeout_ms = {DEFAULT_TIMEOUT_MS}\nblizzard_delay_ms = {DEFAULT_BLIZZARD_DELAY_MS}\nwowhead_delay_ms = {DEFAULT_WOWHEAD_DELAY_MS}\nstale_after_days = {DEFAULT_STALE_AFTER_DAYS}\n"
    )
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key).and_then(|value| value.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.toml")).expect("load config");
        assert_eq!(config, ToolConfig::default());
        assert_eq!(config.stale_after_days(), 7);
        assert_eq!(config.blizzard_delay_ms(), 200);
        assert_eq!(config.wowhead_delay_ms(), 500);
    }

    #[test]
    fn load_config_parses_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[paths]
keybinds = "data/binds.yml"

[blizzard]
namespace = "static-eu"
locale = "en_GB"

[fetch]
stale_after_days = 3
wowhead_delay_ms = 250
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.paths.keybinds.as_deref(), Some("data/binds.yml"));
        assert_eq!(config.blizzard.namespace.as_deref(), Some("static-eu"));
        assert_eq!(config.stale_after_days(), 3);
        assert_eq!(config.wowhead_delay_ms(), 250);
        assert_eq!(config.blizzard_delay_ms(), DEFAULT_BLIZZARD_DELAY_MS);
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[fetch\ntimeout_ms = 1").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn default_config_template_parses() {
        let parsed: ToolConfig = toml::from_str(&render_default_config()).expect("parse template");
        assert_eq!(parsed.fetch.stale_after_days, Some(DEFAULT_STALE_AFTER_DAYS));
        assert_eq!(parsed.blizzard.locale.as_deref(), Some(DEFAULT_LOCALE));
    }

    #[test]
    fn negative_staleness_falls_back_to_default() {
        let config = ToolConfig {
            fetch: FetchSection {
                stale_after_days: Some(-1),
                ..FetchSection::default()
            },
            ..ToolConfig::default()
        };
        assert_eq!(config.stale_after_days(), DEFAULT_STALE_AFTER_DAYS);
    }
}
