//! Settings document shared by the daemon and settings invocations.
//!
//! Defines the status labels, schedule rules and user preferences that live
//! in `config.json`, together with the legacy migrations applied every time
//! the document is read.

use std::{
    env, fmt,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveTime, Weekday};
use log::{debug, warn};
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

/// File name of the settings document inside the config directory.
pub const CONFIG_FILE: &str = "config.json";

/// File name of the runtime status document inside the config directory.
pub const STATUS_FILE: &str = "status.json";

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "BLYNCD_CONFIG_DIR";

/// Polling interval written by old releases, far too slow for a status light.
const LEGACY_POLL_SECONDS: u64 = 30;

/// Semantic state the light represents.
///
/// Parsing is case-insensitive and understands the color names older
/// releases stored (`red`, `green`, `blue`), so documents written by an
/// older process resolve the same way as migrated ones.
///
/// # Example
///
/// ```
/// use blyncd::config::StatusLabel;
///
/// assert_eq!("Focused".parse::<StatusLabel>().unwrap(), StatusLabel::Focused);
/// assert_eq!("red".parse::<StatusLabel>().unwrap(), StatusLabel::Focused);
/// assert_eq!(StatusLabel::Open.rgb(), Some((0, 255, 0)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum StatusLabel {
    Open,
    Focused,
    Away,
    Off,
}

impl StatusLabel {
    pub const ALL: [StatusLabel; 4] = [
        StatusLabel::Open,
        StatusLabel::Focused,
        StatusLabel::Away,
        StatusLabel::Off,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            StatusLabel::Open => "open",
            StatusLabel::Focused => "focused",
            StatusLabel::Away => "away",
            StatusLabel::Off => "off",
        }
    }

    /// Light color for this label, `None` meaning the light is switched off.
    pub const fn rgb(self) -> Option<(u8, u8, u8)> {
        match self {
            StatusLabel::Open => Some((0, 255, 0)),
            StatusLabel::Focused => Some((255, 0, 0)),
            StatusLabel::Away => Some((0, 0, 255)),
            StatusLabel::Off => None,
        }
    }

    /// Interprets a persisted override value.
    ///
    /// `none` and the empty string mean "no override". Values that are not a
    /// known label are ignored rather than treated as an error.
    pub fn parse_override(raw: &str) -> Option<StatusLabel> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            return None;
        }
        match trimmed.parse() {
            Ok(label) => Some(label),
            Err(e) => {
                warn!("Ignoring manual override: {e}");
                None
            }
        }
    }
}

/// Maps a legacy color name onto the label that replaced it.
pub fn legacy_label(raw: &str) -> Option<&'static str> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "red" => Some(StatusLabel::Focused.as_str()),
        "green" => Some(StatusLabel::Open.as_str()),
        "blue" => Some(StatusLabel::Away.as_str()),
        _ => None,
    }
}

impl FromStr for StatusLabel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        let name = legacy_label(&lowered).unwrap_or(lowered.as_str());
        StatusLabel::ALL
            .into_iter()
            .find(|label| label.as_str() == name)
            .ok_or_else(|| anyhow!("unknown status label '{}'", s.trim()))
    }
}

impl TryFrom<String> for StatusLabel {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One schedule entry.
///
/// Times stay as `HH:MM` strings and are parsed when the rule is evaluated,
/// so a malformed time only disables its own rule. `start > end` describes a
/// range that crosses midnight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Weekdays the rule applies to, written as `Mon`..`Sun`.
    #[serde(default)]
    pub days: Vec<Weekday>,

    /// Inclusive start of the range.
    pub start: String,

    /// Exclusive end of the range.
    pub end: String,

    /// Status shown while the rule matches.
    #[serde(rename = "state", alias = "status")]
    pub status: StatusLabel,

    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
}

impl Rule {
    pub fn new(
        days: impl IntoIterator<Item = Weekday>,
        start: impl Into<String>,
        end: impl Into<String>,
        status: StatusLabel,
    ) -> Self {
        Self {
            days: days.into_iter().collect(),
            start: start.into(),
            end: end.into(),
            status,
            enabled: true,
        }
    }

    /// Parsed `(start, end)` pair, `None` when either time is malformed.
    pub fn window(&self) -> Option<(NaiveTime, NaiveTime)> {
        Some((parse_clock(&self.start)?, parse_clock(&self.end)?))
    }
}

pub(crate) fn parse_clock(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()
}

/// Main settings document.
///
/// Missing fields take their defaults, explicit values (including `null`
/// and empty lists) are kept as written. Fields this release does not know
/// about are carried through rewrites untouched.
///
/// # Example
///
/// ```json
/// {
///     "default_state": "away",
///     "rules": [
///         { "days": ["Mon", "Tue"], "start": "09:00", "end": "17:00",
///           "state": "focused", "enabled": true }
///     ],
///     "manual_override": null,
///     "poll_seconds": 2,
///     "turn_off_on_exit": true,
///     "start_on_login": false
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Status used when no rule matches.
    #[serde(default = "defaults::default_state")]
    pub default_state: StatusLabel,

    /// Ordered rules; later matches take precedence over earlier ones.
    #[serde(default = "defaults::rules", deserialize_with = "lenient_rules")]
    pub rules: Vec<Rule>,

    /// Forced status that wins over every rule until cleared.
    #[serde(default, deserialize_with = "override_label")]
    pub manual_override: Option<StatusLabel>,

    /// Daemon polling cadence in seconds.
    #[serde(default = "defaults::poll_seconds")]
    pub poll_seconds: u64,

    /// Switch the light off when the daemon exits.
    #[serde(default = "defaults::turn_off_on_exit")]
    pub turn_off_on_exit: bool,

    /// Start the daemon with the desktop session.
    #[serde(default)]
    pub start_on_login: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_state: defaults::default_state(),
            rules: defaults::rules(),
            manual_override: None,
            poll_seconds: defaults::poll_seconds(),
            turn_off_on_exit: defaults::turn_off_on_exit(),
            start_on_login: false,
            extra: Map::new(),
        }
    }
}

impl Config {
    /// Decodes a raw document, applying legacy migrations first.
    ///
    /// Each known field is decoded on its own: a field holding a value of the
    /// wrong type falls back to its default and the rest of the document is
    /// kept as written.
    pub fn from_document(document: Value) -> Result<Self> {
        let Value::Object(mut fields) = document else {
            anyhow::bail!("settings document is not a JSON object");
        };
        for applied in migrate(&mut fields) {
            debug!("Applied legacy migration for '{applied}'");
        }
        for (key, value) in discard_invalid_fields(&mut fields) {
            warn!("Ignoring invalid value for '{key}' ({value}), using the default");
        }
        serde_json::from_value(Value::Object(fields)).context("Failed to decode settings document")
    }

    /// Rejects a value that the field `key` cannot hold.
    ///
    /// Keys this release does not know about accept anything.
    pub fn check_field(key: &str, value: &Value) -> Result<()> {
        match FIELD_CHECKS.iter().find(|(field, _)| *field == key) {
            Some((_, decodes)) if !decodes(value) => {
                Err(anyhow!("invalid value for '{key}': {value}"))
            }
            _ => Ok(()),
        }
    }

    /// Encodes the settings back into a JSON object.
    pub fn to_document(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self).context("Failed to encode settings")? {
            Value::Object(fields) => Ok(fields),
            other => Err(anyhow!("settings encoded to non-object value: {other}")),
        }
    }

    /// Effective polling interval, never shorter than one second.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_seconds.max(1))
    }
}

/// Rewrites values stored by older releases.
///
/// Returns the names of the fields that changed. Running it again on its own
/// output changes nothing.
pub fn migrate(fields: &mut Map<String, Value>) -> Vec<&'static str> {
    let mut applied = Vec::new();

    if let Some(Value::String(current)) = fields.get("manual_override") {
        if let Some(renamed) = legacy_label(current) {
            fields.insert("manual_override".into(), Value::String(renamed.into()));
            applied.push("manual_override");
        }
    }

    if fields.get("poll_seconds").and_then(Value::as_u64) == Some(LEGACY_POLL_SECONDS) {
        fields.insert("poll_seconds".into(), Value::from(defaults::poll_seconds()));
        applied.push("poll_seconds");
    }

    applied
}

/// Typed fields checked one by one before the document is decoded.
/// `manual_override` is absent: any value it holds reads as a label or unset.
const FIELD_CHECKS: [(&str, fn(&Value) -> bool); 5] = [
    ("default_state", decodes::<StatusLabel>),
    ("rules", decodes::<Vec<Value>>),
    ("poll_seconds", decodes::<u64>),
    ("turn_off_on_exit", decodes::<bool>),
    ("start_on_login", decodes::<bool>),
];

fn decodes<T: DeserializeOwned>(value: &Value) -> bool {
    T::deserialize(value).is_ok()
}

/// Removes known fields whose value has the wrong type, returning them.
fn discard_invalid_fields(fields: &mut Map<String, Value>) -> Vec<(&'static str, Value)> {
    let invalid: Vec<&'static str> = FIELD_CHECKS
        .iter()
        .filter(|(key, decodes)| fields.get(*key).is_some_and(|value| !decodes(value)))
        .map(|(key, _)| *key)
        .collect();
    invalid
        .into_iter()
        .filter_map(|key| fields.remove(key).map(|value| (key, value)))
        .collect()
}

fn lenient_rules<'de, D>(deserializer: D) -> Result<Vec<Rule>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .enumerate()
        .filter_map(|(idx, value)| match serde_json::from_value::<Rule>(value) {
            Ok(rule) => Some(rule),
            Err(e) => {
                warn!("Skipping schedule rule #{}: {e}", idx + 1);
                None
            }
        })
        .collect())
}

fn override_label<'de, D>(deserializer: D) -> Result<Option<StatusLabel>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(raw)) => StatusLabel::parse_override(&raw),
        Some(Value::Null) | None => None,
        Some(other) => {
            warn!("Ignoring manual override of unexpected type: {other}");
            None
        }
    })
}

mod defaults {
    use chrono::Weekday;

    use super::{Rule, StatusLabel};

    pub fn default_state() -> StatusLabel {
        StatusLabel::Away
    }

    /// Office hours on weekdays.
    pub fn rules() -> Vec<Rule> {
        vec![Rule::new(
            [
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            "09:00",
            "17:00",
            StatusLabel::Focused,
        )]
    }

    pub fn poll_seconds() -> u64 {
        2
    }

    pub fn turn_off_on_exit() -> bool {
        true
    }

    pub fn enabled() -> bool {
        true
    }
}

/// Resolves the directory holding `config.json` and `status.json`.
///
/// Looks in the following order:
/// 1. The explicit path (command line)
/// 2. `BLYNCD_CONFIG_DIR`
/// 3. `$XDG_CONFIG_HOME/blyncd`
/// 4. `$HOME/.config/blyncd`
pub fn locate_config_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }

    if let Some(dir) = env::var_os(CONFIG_DIR_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|home| Path::new(&home).join(".config")))
        .map(|base| base.join("blyncd"))
        .ok_or_else(|| anyhow!("Cannot determine a configuration directory: HOME is not set"))
}
