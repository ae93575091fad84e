//! Configuration loading for the notification bus.
//!
//! Precedence, low to high: built-in [`Default`] values, then
//! `chanwatch.toml` (or `$CHANWATCH_CONFIG_PATH`), then environment
//! variables, then CLI flags applied by the caller. A missing config file is
//! not an error — the same rule the teacher's `PfarConfig::load` uses.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Full runtime configuration for `chanwatchd`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChanwatchConfig {
    /// Worker-pool sizing and timing tunables (spec §6).
    pub tuning: TuningConfig,
    /// Bot/API credentials for each platform plus the two HTTP
    /// collaborators.
    pub credentials: CredentialsConfig,
    /// Persistent store location.
    pub store: StoreConfig,
    /// HTTP collaborator endpoints.
    pub collaborators: CollaboratorsConfig,
}

impl Default for ChanwatchConfig {
    fn default() -> Self {
        Self {
            tuning: TuningConfig::default(),
            credentials: CredentialsConfig::default(),
            store: StoreConfig::default(),
            collaborators: CollaboratorsConfig::default(),
        }
    }
}

/// Worker-pool sizing and timing tunables (spec §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Number of dispatcher workers. Default 30.
    pub n_work: usize,
    /// Number of VK steady-state poll workers. Default 15.
    pub n_vk: usize,
    /// Number of VK history-on-demand workers. Default 3.
    pub n_vk_hist: usize,
    /// VK partition refresh interval, in seconds. Default 60.
    pub t_refresh_secs: u64,
    /// Per-subscription cooldown, in seconds. Default 60 (1 minute).
    pub cooldown_secs: u64,
    /// Unicode-scalar length of the truncation-fallback summary. Default 50.
    pub summary_len: usize,
    /// Timeout for matcher/VK outbound HTTP calls, in seconds. Default 10.
    pub http_timeout_secs: u64,
    /// Timeout for summarizer outbound HTTP calls, in seconds. Default 30.
    pub summarizer_timeout_secs: u64,
    /// Bounded capacity of each dispatcher shard queue and the delivery
    /// queue.
    pub queue_capacity: usize,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            n_work: 30,
            n_vk: 15,
            n_vk_hist: 3,
            t_refresh_secs: 60,
            cooldown_secs: 60,
            summary_len: 50,
            http_timeout_secs: 10,
            summarizer_timeout_secs: 30,
            queue_capacity: 1024,
        }
    }
}

/// Bot/API credentials. Populated from environment variables; never read
/// from the TOML file (the teacher's `credentials.rs` keeps secrets out of
/// checked-in config for the same reason).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Telegram bot token.
    pub telegram_bot_token: Option<String>,
    /// VK service/user access token.
    pub vk_token: Option<String>,
    /// Mattermost personal access token.
    pub mattermost_token: Option<String>,
    /// OpenAI-style API key for the summarizer collaborator. Its absence
    /// disables the summarizer (spec §6) and the core falls back to
    /// truncation unconditionally.
    pub openai_api_key: Option<String>,
}

/// Persistent store location.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `sqlx` connection string, e.g. `sqlite://chanwatch.db`.
    pub connection_string: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connection_string: "sqlite://chanwatch.db".to_string(),
        }
    }
}

/// HTTP collaborator endpoints (spec §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollaboratorsConfig {
    /// Base URL of the Matcher HTTP collaborator (`POST /analyze`).
    pub matcher_url: String,
    /// Base URL of the Mattermost host API, used to resolve channel display
    /// names at `add`-topic time.
    pub mattermost_server_url: String,
    /// Mattermost team name, used to build post links
    /// (`{server}/{team}/pl/{post_id}`).
    pub mattermost_team: String,
    /// VK API base URL.
    pub vk_api_url: String,
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        Self {
            matcher_url: "http://localhost:8081".to_string(),
            mattermost_server_url: "http://localhost:8065".to_string(),
            mattermost_team: String::new(),
            vk_api_url: "https://api.vk.com".to_string(),
        }
    }
}

impl ChanwatchConfig {
    /// Load configuration the way the teacher's `PfarConfig::load` does:
    /// read `$CHANWATCH_CONFIG_PATH` (default `./chanwatch.toml`), fall back
    /// to defaults if the file is absent, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but fails to parse.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CHANWATCH_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("chanwatch.toml"));
        let mut config = Self::load_from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read and parse a config file, or return defaults if it does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Apply environment-variable overrides on top of file/default values.
    ///
    /// Takes a resolver function rather than calling `std::env::var`
    /// directly so unit tests can exercise precedence deterministically
    /// without mutating real process environment (mirrors the teacher's
    /// `apply_overrides(env_resolver_fn)` pattern).
    pub fn apply_overrides(&mut self, resolve: impl Fn(&str) -> Option<String>) {
        if let Some(v) = resolve("CHANWATCH_N_WORK").and_then(|s| s.parse().ok()) {
            self.tuning.n_work = v;
        }
        if let Some(v) = resolve("CHANWATCH_N_VK").and_then(|s| s.parse().ok()) {
            self.tuning.n_vk = v;
        }
        if let Some(v) = resolve("CHANWATCH_N_VK_HIST").and_then(|s| s.parse().ok()) {
            self.tuning.n_vk_hist = v;
        }
        if let Some(v) = resolve("CHANWATCH_T_REFRESH_SECS").and_then(|s| s.parse().ok()) {
            self.tuning.t_refresh_secs = v;
        }
        if let Some(v) = resolve("CHANWATCH_COOLDOWN_SECS").and_then(|s| s.parse().ok()) {
            self.tuning.cooldown_secs = v;
        }
        if let Some(v) = resolve("CHANWATCH_SUMMARY_LEN").and_then(|s| s.parse().ok()) {
            self.tuning.summary_len = v;
        }
        if let Some(v) = resolve("CHANWATCH_STORE_URL") {
            self.store.connection_string = v;
        }
        if let Some(v) = resolve("CHANWATCH_MATCHER_URL") {
            self.collaborators.matcher_url = v;
        }
        if let Some(v) = resolve("CHANWATCH_MATTERMOST_SERVER_URL") {
            self.collaborators.mattermost_server_url = v;
        }
        if let Some(v) = resolve("CHANWATCH_MATTERMOST_TEAM") {
            self.collaborators.mattermost_team = v;
        }
        if let Some(v) = resolve("CHANWATCH_VK_API_URL") {
            self.collaborators.vk_api_url = v;
        }
        if let Some(v) = resolve("TELEGRAM_BOT_TOKEN") {
            self.credentials.telegram_bot_token = Some(v);
        }
        if let Some(v) = resolve("VK_TOKEN") {
            self.credentials.vk_token = Some(v);
        }
        if let Some(v) = resolve("MATTERMOST_TOKEN") {
            self.credentials.mattermost_token = Some(v);
        }
        if let Some(v) = resolve("OPENAI_API_KEY") {
            self.credentials.openai_api_key = Some(v);
        }
    }

    /// Whether the summarizer collaborator is enabled (spec §6: absence of
    /// API key disables it).
    pub fn summarizer_enabled(&self) -> bool {
        self.credentials.openai_api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_recommendations() {
        let config = ChanwatchConfig::default();
        assert_eq!(config.tuning.n_work, 30);
        assert_eq!(config.tuning.n_vk, 15);
        assert_eq!(config.tuning.n_vk_hist, 3);
        assert_eq!(config.tuning.t_refresh_secs, 60);
        assert_eq!(config.tuning.cooldown_secs, 60);
        assert_eq!(config.tuning.summary_len, 50);
    }

    #[test]
    fn missing_file_yields_defaults_not_error() {
        let config =
            ChanwatchConfig::load_from_file(Path::new("/nonexistent/chanwatch.toml")).unwrap();
        assert_eq!(config.tuning.n_work, 30);
    }

    #[test]
    fn env_override_wins_over_default() {
        let mut config = ChanwatchConfig::default();
        config.apply_overrides(|key| {
            if key == "CHANWATCH_N_WORK" {
                Some("7".to_string())
            } else {
                None
            }
        });
        assert_eq!(config.tuning.n_work, 7);
    }

    #[test]
    fn summarizer_disabled_without_key() {
        let config = ChanwatchConfig::default();
        assert!(!config.summarizer_enabled());
    }

    #[test]
    fn summarizer_enabled_with_key() {
        let mut config = ChanwatchConfig::default();
        config.apply_overrides(|key| {
            if key == "OPENAI_API_KEY" {
                Some("sk-test".to_string())
            } else {
                None
            }
        });
        assert!(config.summarizer_enabled());
    }
}
