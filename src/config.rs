use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::reaction::RollbackPolicy;
use crate::session::Actor;
use crate::viewport::DEFAULT_SCROLL_THRESHOLD;

const DEFAULT_ENV_PREFIX: &str = "TERAKOYA";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    crate::api::DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    format!("terakoya-timeline/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    crate::api::DEFAULT_TIMEOUT
}

/// The signed-in member. Left empty, the timeline is read-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SessionConfig {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub profile_img_url: String,
}

impl SessionConfig {
    pub fn actor(&self) -> Option<Actor> {
        if self.uuid.trim().is_empty() {
            return None;
        }
        Some(Actor {
            uuid: self.uuid.trim().to_string(),
            name: self.name.clone(),
            profile_img_url: self.profile_img_url.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_scroll_threshold")]
    pub scroll_threshold: f64,
    #[serde(default)]
    pub rollback: RollbackPolicy,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            scroll_threshold: default_scroll_threshold(),
            rollback: RollbackPolicy::default(),
        }
    }
}

fn default_scroll_threshold() -> f64 {
    DEFAULT_SCROLL_THRESHOLD
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

/// Settings named by one source. Only what the source actually sets is
/// `Some`, so a later source can set a value back to its default.
#[derive(Debug, Clone, Default, Deserialize)]
struct Overlay {
    #[serde(default)]
    api: ApiOverlay,
    #[serde(default)]
    session: SessionOverlay,
    #[serde(default)]
    feed: FeedOverlay,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ApiOverlay {
    base_url: Option<String>,
    user_agent: Option<String>,
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SessionOverlay {
    uuid: Option<String>,
    name: Option<String>,
    profile_img_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FeedOverlay {
    scroll_threshold: Option<f64>,
    rollback: Option<RollbackPolicy>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_overlay(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_overlay(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    cfg = merge_config(cfg, load_env(prefix));

    Ok(cfg)
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))
}

fn read_overlay(path: &Path) -> Result<Overlay> {
    let data = read_file(path)?;
    let overlay: Option<Overlay> = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(overlay.unwrap_or_default())
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = read_file(path)?;
    let config: Option<Config> = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config.unwrap_or_default())
}

fn merge_config(mut base: Config, other: Overlay) -> Config {
    if let Some(base_url) = other.api.base_url {
        base.api.base_url = base_url;
    }
    if let Some(user_agent) = other.api.user_agent {
        base.api.user_agent = user_agent;
    }
    if let Some(timeout) = other.api.timeout {
        base.api.timeout = timeout;
    }

    if let Some(uuid) = other.session.uuid {
        base.session.uuid = uuid;
    }
    if let Some(name) = other.session.name {
        base.session.name = name;
    }
    if let Some(profile_img_url) = other.session.profile_img_url {
        base.session.profile_img_url = profile_img_url;
    }

    if let Some(threshold) = other.feed.scroll_threshold.filter(|t| *t >= 0.0) {
        base.feed.scroll_threshold = threshold;
    }
    if let Some(rollback) = other.feed.rollback {
        base.feed.rollback = rollback;
    }

    base
}

fn load_env(prefix: &str) -> Overlay {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    let mut overlay = Overlay::default();
    for (key, value) in map {
        apply_env_value(&mut overlay, &key, value);
    }
    overlay
}

fn apply_env_value(overlay: &mut Overlay, key: &str, value: String) {
    match key {
        "api.base_url" => overlay.api.base_url = Some(value),
        "api.user_agent" => overlay.api.user_agent = Some(value),
        "api.timeout" => match humantime::parse_duration(&value) {
            Ok(duration) => overlay.api.timeout = Some(duration),
            Err(err) => log::warn!("config: ignoring api.timeout {value:?}: {err}"),
        },
        "session.uuid" => overlay.session.uuid = Some(value),
        "session.name" => overlay.session.name = Some(value),
        "session.profile_img_url" => overlay.session.profile_img_url = Some(value),
        "feed.scroll_threshold" => match value.parse::<f64>() {
            Ok(parsed) if parsed >= 0.0 => overlay.feed.scroll_threshold = Some(parsed),
            _ => log::warn!("config: ignoring feed.scroll_threshold {value:?}"),
        },
        "feed.rollback" => match RollbackPolicy::from_key(&value) {
            Some(policy) => overlay.feed.rollback = Some(policy),
            None => log::warn!("config: unknown feed.rollback {value:?}"),
        },
        _ => {}
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("terakoya").join("config.yaml"))
}

/// Stores the signed-in member in the config file, keeping other settings.
pub fn save_session(path: Option<PathBuf>, actor: &Actor) -> Result<PathBuf> {
    anyhow::ensure!(
        !actor.uuid.trim().is_empty(),
        "config: session.uuid is required"
    );

    let path = if let Some(path) = path {
        path
    } else {
        default_config_path().context("config: unable to determine default config path")?
    };

    let mut cfg = if path.exists() {
        read_config_file(&path)?
    } else {
        Config::default()
    };

    cfg.session.uuid = actor.uuid.trim().to_string();
    cfg.session.name = actor.name.clone();
    cfg.session.profile_img_url = actor.profile_img_url.clone();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("config: failed to create directory {}", parent.display()))?;
    }

    let contents = serde_yaml::to_string(&cfg).context("config: failed to serialize config")?;
    fs::write(&path, contents)
        .with_context(|| format!("config: failed to write file {}", path.display()))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    fn isolated(dir: &Path, prefix: &str) -> LoadOptions {
        LoadOptions {
            config_file: Some(dir.join("missing.yaml")),
            env_prefix: Some(prefix.to_string()),
        }
    }

    #[test]
    fn load_defaults_without_files() {
        let dir = tempdir().unwrap();
        let cfg = load(isolated(dir.path(), "TERAKOYA_TEST_DEFAULTS")).unwrap();
        assert_eq!(cfg.api.base_url, crate::api::DEFAULT_BASE_URL);
        assert_eq!(cfg.feed.rollback, RollbackPolicy::Keep);
        assert_eq!(cfg.feed.scroll_threshold, DEFAULT_SCROLL_THRESHOLD);
        assert!(cfg.session.actor().is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let yaml = "api:\n  base_url: https://api.example.com/v1/\n  timeout: 5s\n\
                    feed:\n  rollback: revert\n";
        fs::write(&path, yaml).unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("TERAKOYA_TEST_FILE".into()),
        })
        .unwrap();
        assert_eq!(cfg.api.base_url, "https://api.example.com/v1/");
        assert_eq!(cfg.api.timeout, Duration::from_secs(5));
        assert_eq!(cfg.feed.rollback, RollbackPolicy::Revert);
        assert_eq!(cfg.api.user_agent, default_user_agent());
    }

    #[test]
    fn save_session_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        save_session(Some(path.clone()), &Actor::new("u1", "Hanako")).unwrap();
        let saved = read_config_file(&path).unwrap();
        assert_eq!(saved.session.actor(), Some(Actor::new("u1", "Hanako")));
    }

    #[test]
    fn env_overrides() {
        let dir = tempdir().unwrap();
        env::set_var("TERAKOYA_TEST_ENV_FEED__ROLLBACK", "revert");
        env::set_var("TERAKOYA_TEST_ENV_SESSION__UUID", "u9");
        let cfg = load(isolated(dir.path(), "TERAKOYA_TEST_ENV")).unwrap();
        env::remove_var("TERAKOYA_TEST_ENV_FEED__ROLLBACK");
        env::remove_var("TERAKOYA_TEST_ENV_SESSION__UUID");
        assert_eq!(cfg.feed.rollback, RollbackPolicy::Revert);
        assert_eq!(cfg.session.actor().map(|a| a.uuid), Some("u9".to_string()));
    }

    #[test]
    fn env_can_restore_defaults_over_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let yaml = "api:\n  timeout: 5s\nfeed:\n  rollback: revert\n  scroll_threshold: 250\n";
        fs::write(&path, yaml).unwrap();
        env::set_var("TERAKOYA_TEST_RESTORE_FEED__ROLLBACK", "keep");
        env::set_var("TERAKOYA_TEST_RESTORE_FEED__SCROLL_THRESHOLD", "100");
        env::set_var("TERAKOYA_TEST_RESTORE_API__TIMEOUT", "20s");
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("TERAKOYA_TEST_RESTORE".into()),
        });
        env::remove_var("TERAKOYA_TEST_RESTORE_FEED__ROLLBACK");
        env::remove_var("TERAKOYA_TEST_RESTORE_FEED__SCROLL_THRESHOLD");
        env::remove_var("TERAKOYA_TEST_RESTORE_API__TIMEOUT");
        let cfg = cfg.unwrap();

        assert_eq!(cfg.feed.rollback, RollbackPolicy::Keep);
        assert_eq!(cfg.feed.scroll_threshold, DEFAULT_SCROLL_THRESHOLD);
        assert_eq!(cfg.api.timeout, crate::api::DEFAULT_TIMEOUT);
    }

    #[test]
    fn file_value_equal_to_default_still_applies() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "feed:\n  rollback: keep\n").unwrap();
        env::set_var("TERAKOYA_TEST_EXPLICIT_FEED__SCROLL_THRESHOLD", "40");
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("TERAKOYA_TEST_EXPLICIT".into()),
        });
        env::remove_var("TERAKOYA_TEST_EXPLICIT_FEED__SCROLL_THRESHOLD");
        let cfg = cfg.unwrap();

        assert_eq!(cfg.feed.rollback, RollbackPolicy::Keep);
        assert_eq!(cfg.feed.scroll_threshold, 40.0);
    }
}
