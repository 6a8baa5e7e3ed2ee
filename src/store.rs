//! File-backed settings store shared across processes.
//!
//! The daemon and any number of settings invocations read and write the same
//! two documents. `config.json` carries rules and preferences and changes
//! rarely; `status.json` carries live device status and is rewritten often.
//! Keeping them apart means the frequent status writes never touch the file
//! a settings editor is saving.
//!
//! Each document is cached together with the modification time it was read
//! at. A reload only re-parses when the file on disk is strictly newer, so
//! polling is cheap. Writes replace the whole file through a rename, so a
//! reader sees either the old or the new document, never a mix.

use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::{
    config::{CONFIG_FILE, Config, Rule, STATUS_FILE, StatusLabel},
    health::DeviceHealth,
};

/// Keys stored in the status document instead of the settings document.
pub const STATUS_KEYS: [&str; 2] = ["device_status", "last_polling_time"];

/// Locations of the two shared documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub dir: PathBuf,
    pub config: PathBuf,
    pub status: PathBuf,
}

impl StorePaths {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            config: dir.join(CONFIG_FILE),
            status: dir.join(STATUS_FILE),
            dir,
        }
    }
}

/// Cached document plus the modification time it was read at.
#[derive(Debug)]
struct Tracked<T> {
    value: T,
    seen: Option<SystemTime>,
}

impl<T> Tracked<T> {
    fn open(path: &Path, read: fn(&Path) -> Result<T>, fallback: fn() -> T) -> Self {
        let mut tracked = Self {
            value: fallback(),
            seen: None,
        };
        tracked.refresh(path, read, fallback);
        tracked
    }

    /// Re-reads the file if it changed since the last read.
    ///
    /// A file that fails to parse is replaced by `fallback()`; its timestamp
    /// is still recorded so the same broken file is not re-read every poll.
    fn refresh(&mut self, path: &Path, read: fn(&Path) -> Result<T>, fallback: fn() -> T) -> bool {
        let current = modified(path);
        if !is_newer(current, self.seen) {
            return false;
        }

        self.value = match read(path) {
            Ok(value) => {
                debug!("Reloaded {}", path.display());
                value
            }
            Err(e) => {
                error!("{e:#}; falling back to defaults");
                fallback()
            }
        };
        self.seen = current;
        true
    }
}

/// Shared settings store.
///
/// # Example
///
/// ```no_run
/// use blyncd::{config::StatusLabel, store::ConfigStore};
///
/// # async fn example() -> anyhow::Result<()> {
/// let store = ConfigStore::open("/tmp/blyncd").await?;
///
/// store.set_manual_override(Some(StatusLabel::Focused)).await?;
/// assert_eq!(store.manual_override().await, Some(StatusLabel::Focused));
///
/// // Routed to status.json, config.json is left alone.
/// store.set("device_status", serde_json::json!(null)).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigStore {
    paths: StorePaths,
    config: RwLock<Tracked<Config>>,
    status: RwLock<Tracked<Map<String, Value>>>,
}

impl ConfigStore {
    /// Opens the store in `dir`, creating the directory if needed.
    ///
    /// Missing or unreadable documents are not an error: the store starts
    /// from defaults and an empty status document.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let paths = StorePaths::in_dir(dir);
        fs::create_dir_all(&paths.dir).with_context(|| {
            format!("Failed to create config directory {}", paths.dir.display())
        })?;

        info!("Using settings from: {}", paths.config.display());
        Ok(Self {
            config: RwLock::new(Tracked::open(&paths.config, read_config, Config::default)),
            status: RwLock::new(Tracked::open(&paths.status, read_status, Map::new)),
            paths,
        })
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Re-reads `config.json` if another process changed it.
    ///
    /// Returns whether the document was re-read.
    pub async fn reload(&self) -> bool {
        self.config
            .write()
            .await
            .refresh(&self.paths.config, read_config, Config::default)
    }

    /// Re-reads `status.json` if another process changed it.
    pub async fn reload_status(&self) -> bool {
        self.status
            .write()
            .await
            .refresh(&self.paths.status, read_status, Map::new)
    }

    /// Fresh snapshot of the settings.
    pub async fn config(&self) -> Config {
        self.reload().await;
        self.config.read().await.value.clone()
    }

    pub async fn poll_interval(&self) -> Duration {
        self.config().await.poll_interval()
    }

    pub async fn manual_override(&self) -> Option<StatusLabel> {
        self.config().await.manual_override
    }

    /// Reads one top-level key from whichever document owns it.
    pub async fn get(&self, key: &str) -> Option<Value> {
        if is_status_key(key) {
            self.reload_status().await;
            return self.status.read().await.value.get(key).cloned();
        }

        let config = self.config().await;
        match config.to_document() {
            Ok(mut fields) => fields.remove(key),
            Err(e) => {
                error!("{e:#}");
                None
            }
        }
    }

    /// Writes one top-level key to whichever document owns it.
    ///
    /// Nothing is written when the value is already current, which keeps the
    /// sibling process from reloading for nothing. Returns whether the file
    /// changed. Settings values are decoded before the write, so a value the
    /// document cannot hold is rejected without touching the file.
    pub async fn set(&self, key: &str, value: Value) -> Result<bool> {
        if is_status_key(key) {
            return self.set_status_value(key, value).await;
        }

        let mut tracked = self.config.write().await;
        tracked.refresh(&self.paths.config, read_config, Config::default);

        let mut fields = tracked.value.to_document()?;
        if fields.get(key) == Some(&value) {
            return Ok(false);
        }
        Config::check_field(key, &value).with_context(|| format!("Rejected value for '{key}'"))?;
        fields.insert(key.to_string(), value);

        let next = Config::from_document(Value::Object(fields))
            .with_context(|| format!("Rejected value for '{key}'"))?;
        if next == tracked.value {
            return Ok(false);
        }

        tracked.seen = write_document(&self.paths.config, &Value::Object(next.to_document()?))?;
        tracked.value = next;
        Ok(true)
    }

    /// Applies `edit` to the latest settings and saves them if they changed.
    pub async fn update<F>(&self, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut Config) + Send,
    {
        let mut tracked = self.config.write().await;
        tracked.refresh(&self.paths.config, read_config, Config::default);

        let mut next = tracked.value.clone();
        edit(&mut next);
        if next == tracked.value {
            return Ok(false);
        }

        tracked.seen = write_document(&self.paths.config, &Value::Object(next.to_document()?))?;
        tracked.value = next;
        Ok(true)
    }

    /// Sets or clears the manual override.
    pub async fn set_manual_override(&self, label: Option<StatusLabel>) -> Result<bool> {
        self.update(|config| config.manual_override = label).await
    }

    /// Replaces the default state and the rule list.
    ///
    /// The override is whatever is on disk at the time of the write, so an
    /// editor holding a stale copy cannot undo a force made meanwhile.
    pub async fn save_schedule(&self, default_state: StatusLabel, rules: Vec<Rule>) -> Result<bool> {
        self.update(move |config| {
            config.default_state = default_state;
            config.rules = rules;
        })
        .await
    }

    /// Last device status published by the daemon.
    pub async fn device_status(&self) -> Option<DeviceHealth> {
        let raw = self.get("device_status").await?;
        match serde_json::from_value(raw) {
            Ok(health) => Some(health),
            Err(e) => {
                debug!("Ignoring unreadable device status: {e}");
                None
            }
        }
    }

    pub async fn publish_health(&self, health: &DeviceHealth) -> Result<bool> {
        let value = serde_json::to_value(health).context("Failed to encode device status")?;
        self.set_status_value("device_status", value).await
    }

    /// Records the time of the daemon's latest poll.
    pub async fn mark_polled(&self, at: DateTime<Utc>) -> Result<bool> {
        let value = serde_json::to_value(at).context("Failed to encode poll time")?;
        self.set_status_value("last_polling_time", value).await
    }

    pub async fn last_polled(&self) -> Option<DateTime<Utc>> {
        serde_json::from_value(self.get("last_polling_time").await?).ok()
    }

    async fn set_status_value(&self, key: &str, value: Value) -> Result<bool> {
        let mut tracked = self.status.write().await;
        tracked.refresh(&self.paths.status, read_status, Map::new);
        if tracked.value.get(key) == Some(&value) {
            return Ok(false);
        }

        let mut next = tracked.value.clone();
        next.insert(key.to_string(), value);
        tracked.seen = write_document(&self.paths.status, &Value::Object(next.clone()))?;
        tracked.value = next;
        Ok(true)
    }
}

fn is_status_key(key: &str) -> bool {
    STATUS_KEYS.contains(&key)
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

fn is_newer(current: Option<SystemTime>, seen: Option<SystemTime>) -> bool {
    match (current, seen) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(current), Some(seen)) => current > seen,
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse JSON in {}", path.display()))
}

fn read_config(path: &Path) -> Result<Config> {
    Config::from_document(read_json(path)?)
        .with_context(|| format!("Invalid settings in {}", path.display()))
}

fn read_status(path: &Path) -> Result<Map<String, Value>> {
    match read_json(path)? {
        Value::Object(fields) => Ok(fields),
        _ => anyhow::bail!("Status document {} is not a JSON object", path.display()),
    }
}

/// Replaces `path` with `document` and returns the new modification time.
fn write_document(path: &Path, document: &Value) -> Result<Option<SystemTime>> {
    let content = serde_json::to_string_pretty(document).context("Failed to serialize document")?;

    let tmp_path = path.with_extension(format!("json.{}.tmp", std::process::id()));
    fs::write(&tmp_path, content)
        .with_context(|| format!("Failed to write temporary file {}", tmp_path.display()))?;

    fs::rename(&tmp_path, path)
        .map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            e
        })
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    debug!("Saved {}", path.display());
    Ok(modified(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthCode;
    use chrono::Weekday;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir) -> ConfigStore {
        ConfigStore::open(dir.path()).await.unwrap()
    }

    // Pushes the mtime forward so a change is visible even on filesystems
    // with coarse timestamps.
    fn bump_mtime(path: &Path) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(5)).unwrap();
    }

    #[tokio::test]
    async fn missing_files_give_defaults_without_writing() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        assert_eq!(store.config().await, Config::default());
        assert_eq!(store.device_status().await, None);
        assert!(!store.paths().config.exists());
        assert!(!store.paths().status.exists());
    }

    #[tokio::test]
    async fn unchanged_set_does_not_write() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let changed = store.set("default_state", json!("away")).await.unwrap();

        assert!(!changed);
        assert!(!store.paths().config.exists());
    }

    #[tokio::test]
    async fn set_normalizes_legacy_override() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        assert!(store.set("manual_override", json!("red")).await.unwrap());
        assert_eq!(store.get("manual_override").await, Some(json!("focused")));

        // Same label spelled the old way is not a change.
        assert!(!store.set("manual_override", json!("red")).await.unwrap());
    }

    #[tokio::test]
    async fn rejected_value_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        assert!(store.set("default_state", json!("purple")).await.is_err());
        assert!(!store.paths().config.exists());
    }

    #[tokio::test]
    async fn status_keys_go_to_status_file() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let health = DeviceHealth::new(HealthCode::Connected, "Connected via Blynclight library");
        assert!(store.publish_health(&health).await.unwrap());
        assert!(!store.publish_health(&health).await.unwrap());

        assert!(store.paths().status.exists());
        assert!(!store.paths().config.exists());
        assert_eq!(store.device_status().await, Some(health));
    }

    #[tokio::test]
    async fn second_process_sees_changes_after_reload() {
        let dir = TempDir::new().unwrap();
        let daemon = open_store(&dir).await;
        let settings = open_store(&dir).await;

        settings
            .set_manual_override(Some(StatusLabel::Off))
            .await
            .unwrap();
        bump_mtime(&settings.paths().config);

        assert!(daemon.reload().await);
        assert_eq!(daemon.manual_override().await, Some(StatusLabel::Off));
    }

    #[tokio::test]
    async fn reload_is_idempotent() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{ "manual_override": "green", "poll_seconds": 30 }"#,
        )
        .unwrap();

        let store = open_store(&dir).await;
        let first = store.config().await;

        assert!(!store.reload().await);
        assert!(!store.reload().await);
        assert_eq!(store.config().await, first);
        assert_eq!(first.manual_override, Some(StatusLabel::Open));
        assert_eq!(first.poll_seconds, 2);

        // Migrations are not written back on load.
        let on_disk = fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap();
        assert!(on_disk.contains("green"));
    }

    #[tokio::test]
    async fn corrupt_config_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "{ not json").unwrap();
        fs::write(dir.path().join(STATUS_FILE), "[]").unwrap();

        let store = open_store(&dir).await;

        assert_eq!(store.config().await, Config::default());
        assert_eq!(store.get("device_status").await, None);
    }

    #[tokio::test]
    async fn mistyped_field_does_not_cost_the_schedule() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{
                "default_state": "open",
                "poll_seconds": "5",
                "rules": [ { "days": ["Sat"], "start": "08:00", "end": "09:00", "state": "off" } ]
            }"#,
        )
        .unwrap();
        let sat_rule = Rule::new([Weekday::Sat], "08:00", "09:00", StatusLabel::Off);

        let store = open_store(&dir).await;
        let loaded = store.config().await;
        assert_eq!(loaded.default_state, StatusLabel::Open);
        assert_eq!(loaded.poll_seconds, 2);
        assert_eq!(loaded.rules, vec![sat_rule.clone()]);

        store
            .set_manual_override(Some(StatusLabel::Focused))
            .await
            .unwrap();

        let on_disk = open_store(&dir).await.config().await;
        assert_eq!(on_disk.default_state, StatusLabel::Open);
        assert_eq!(on_disk.rules, vec![sat_rule]);
        assert_eq!(on_disk.manual_override, Some(StatusLabel::Focused));
    }

    #[tokio::test]
    async fn mistyped_set_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        assert!(store.set("poll_seconds", json!("5")).await.is_err());
        assert!(store.set("turn_off_on_exit", json!("yes")).await.is_err());
        assert!(!store.paths().config.exists());
    }

    #[tokio::test]
    async fn save_schedule_keeps_override_set_elsewhere() {
        let dir = TempDir::new().unwrap();
        let editor = open_store(&dir).await;
        let tray = open_store(&dir).await;

        // Editor has loaded its copy before the tray forces a status.
        assert_eq!(editor.manual_override().await, None);
        tray.set_manual_override(Some(StatusLabel::Focused))
            .await
            .unwrap();
        bump_mtime(&tray.paths().config);

        let rules = vec![Rule::new([Weekday::Sat], "10:00", "12:00", StatusLabel::Open)];
        assert!(editor.save_schedule(StatusLabel::Off, rules.clone()).await.unwrap());

        let saved = open_store(&dir).await.config().await;
        assert_eq!(saved.manual_override, Some(StatusLabel::Focused));
        assert_eq!(saved.default_state, StatusLabel::Off);
        assert_eq!(saved.rules, rules);
    }

    #[tokio::test]
    async fn unknown_fields_are_preserved_on_write() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), r#"{ "accent": "teal" }"#).unwrap();

        let store = open_store(&dir).await;
        store.set("start_on_login", json!(true)).await.unwrap();

        let on_disk: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap())
                .unwrap();
        assert_eq!(on_disk["accent"], json!("teal"));
        assert_eq!(on_disk["start_on_login"], json!(true));
    }

    #[tokio::test]
    async fn own_write_does_not_trigger_reload() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store.set("poll_seconds", json!(5)).await.unwrap();

        assert!(!store.reload().await);
        assert_eq!(store.poll_interval().await, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn poll_time_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let at = Utc::now();

        store.mark_polled(at).await.unwrap();

        assert_eq!(store.last_polled().await, Some(at));
    }
}
