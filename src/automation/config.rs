//! Timing configuration store.
//!
//! Loads named delay and retry parameters from `delays.json`, validates
//! them, and resolves per-pair overrides. The JSON layout is flat:
//!
//! ```json
//! {
//!   "left_click_hold_ms": 25,
//!   "validation_max_attempts": 5,
//!   "pair_overrides": { "red-potion:blue-potion": { "left_click_hold_ms": 40 } }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::ConfigError;
use crate::recognition::PairKey;

/// Key reserved for human-readable notes inside the JSON file.
const COMMENTS_KEY: &str = "_comments";

/// Every tunable timing or retry parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Param {
    EnterPollMs,
    MouseMoveDurationMs,
    PreLeftClickSleepMs,
    LeftClickHoldMs,
    PostLeftClickSleepMs,
    PreRightClickSleepMs,
    RightClickHoldMs,
    FlipClickDelayMs,
    PostDropSleepMs,
    RescanAfterDropDelayMs,
    AutoLoopIntervalMs,
    ValidationMouseParkDelayMs,
    ValidationInitialDelayMs,
    ValidationRetryDelayMs,
    ValidationMaxAttempts,
    MouseJitterPx,
    WindowFindAttempts,
    WindowFindBackoffMs,
}

/// Name, default and accepted range of one parameter.
struct ParamInfo {
    name: &'static str,
    default: u64,
    min: u64,
    max: u64,
}

const MAX_DELAY_MS: u64 = 10_000;

impl Param {
    pub const ALL: [Param; 18] = [
        Param::EnterPollMs,
        Param::MouseMoveDurationMs,
        Param::PreLeftClickSleepMs,
        Param::LeftClickHoldMs,
        Param::PostLeftClickSleepMs,
        Param::PreRightClickSleepMs,
        Param::RightClickHoldMs,
        Param::FlipClickDelayMs,
        Param::PostDropSleepMs,
        Param::RescanAfterDropDelayMs,
        Param::AutoLoopIntervalMs,
        Param::ValidationMouseParkDelayMs,
        Param::ValidationInitialDelayMs,
        Param::ValidationRetryDelayMs,
        Param::ValidationMaxAttempts,
        Param::MouseJitterPx,
        Param::WindowFindAttempts,
        Param::WindowFindBackoffMs,
    ];

    fn info(self) -> ParamInfo {
        let delay = |name, default| ParamInfo {
            name,
            default,
            min: 0,
            max: MAX_DELAY_MS,
        };
        match self {
            Param::EnterPollMs => ParamInfo {
                name: "enter_poll_ms",
                default: 30,
                min: 5,
                max: 100,
            },
            Param::MouseMoveDurationMs => delay("mouse_move_duration_ms", 120),
            Param::PreLeftClickSleepMs => delay("pre_left_click_sleep_ms", 10),
            Param::LeftClickHoldMs => delay("left_click_hold_ms", 25),
            Param::PostLeftClickSleepMs => delay("post_left_click_sleep_ms", 20),
            Param::PreRightClickSleepMs => delay("pre_right_click_sleep_ms", 10),
            Param::RightClickHoldMs => delay("right_click_hold_ms", 25),
            Param::FlipClickDelayMs => delay("flip_click_delay_ms", 60),
            Param::PostDropSleepMs => delay("post_drop_sleep_ms", 40),
            Param::RescanAfterDropDelayMs => delay("rescan_after_drop_delay_ms", 80),
            Param::AutoLoopIntervalMs => ParamInfo {
                name: "auto_loop_interval_ms",
                default: 2000,
                min: 0,
                max: 60_000,
            },
            Param::ValidationMouseParkDelayMs => delay("validation_mouse_park_delay_ms", 100),
            Param::ValidationInitialDelayMs => delay("validation_initial_delay_ms", 500),
            Param::ValidationRetryDelayMs => delay("validation_retry_delay_ms", 200),
            Param::ValidationMaxAttempts => ParamInfo {
                name: "validation_max_attempts",
                default: 5,
                min: 1,
                max: 50,
            },
            Param::MouseJitterPx => ParamInfo {
                name: "mouse_jitter_px",
                default: 2,
                min: 0,
                max: 50,
            },
            Param::WindowFindAttempts => ParamInfo {
                name: "window_find_attempts",
                default: 3,
                min: 1,
                max: 20,
            },
            Param::WindowFindBackoffMs => delay("window_find_backoff_ms", 100),
        }
    }

    /// Name used in the JSON file.
    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn from_name(name: &str) -> Option<Param> {
        Param::ALL.iter().copied().find(|p| p.name() == name)
    }

    /// Hard-coded baseline value.
    pub fn default_value(self) -> u64 {
        self.info().default
    }

    /// Inclusive accepted range.
    pub fn range(self) -> (u64, u64) {
        let info = self.info();
        (info.min, info.max)
    }

    /// Checks a raw number against this parameter's range.
    pub fn validate(self, value: f64) -> Result<u64, ConfigError> {
        let (min, max) = self.range();
        if !value.is_finite() || value < min as f64 || value > max as f64 {
            return Err(ConfigError::OutOfRange {
                key: self.name().to_string(),
                value,
                min,
                max,
            });
        }
        Ok(value.round() as u64)
    }
}

/// Parameter values, profile-wide plus per-pair overrides.
///
/// Profile-wide values may be partial; missing ones resolve to
/// [`Param::default_value`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DelayProfile {
    values: BTreeMap<Param, u64>,
    pair_overrides: BTreeMap<PairKey, BTreeMap<Param, u64>>,
}

impl DelayProfile {
    /// An empty profile: every lookup falls through to the defaults.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, param: Param) -> Option<u64> {
        self.values.get(&param).copied()
    }

    /// Sets a profile-wide value after range validation.
    pub fn set(&mut self, param: Param, value: u64) -> Result<(), ConfigError> {
        let value = param.validate(value as f64)?;
        self.values.insert(param, value);
        Ok(())
    }

    /// Sets an override that applies only while `pair` is falling.
    ///
    /// The pair must survive the `first:second` text form used on disk.
    pub fn set_override(
        &mut self,
        pair: PairKey,
        param: Param,
        value: u64,
    ) -> Result<(), ConfigError> {
        if !pair.is_valid() {
            return Err(ConfigError::Invalid(format!(
                "pair override '{}' names a piece that cannot be saved",
                pair
            )));
        }
        let value = param.validate(value as f64)?;
        self.pair_overrides.entry(pair).or_default().insert(param, value);
        Ok(())
    }

    pub fn override_for(&self, pair: &PairKey, param: Param) -> Option<u64> {
        self.pair_overrides
            .get(pair)
            .and_then(|overrides| overrides.get(&param))
            .copied()
    }

    /// Pairs that carry at least one override.
    pub fn pair_overrides(&self) -> impl Iterator<Item = &PairKey> {
        self.pair_overrides.keys()
    }

    fn describe(&self) -> String {
        let pairs: Vec<String> = self.pair_overrides().map(|p| p.to_string()).collect();
        if pairs.is_empty() {
            "no pair overrides".to_string()
        } else {
            format!("pair overrides for {}", pairs.join(", "))
        }
    }

    /// Pair override, else profile-wide value, else the default.
    pub fn resolve(&self, pair: Option<&PairKey>, param: Param) -> u64 {
        pair.and_then(|p| self.override_for(p, param))
            .or_else(|| self.get(param))
            .unwrap_or_else(|| param.default_value())
    }

    /// Binds the profile to the pair currently being handled.
    pub fn view<'a>(&'a self, pair: Option<&'a PairKey>) -> ProfileView<'a> {
        ProfileView {
            profile: self,
            pair,
        }
    }
}

/// Typed accessors over a profile for one pair (or none).
#[derive(Clone, Copy, Debug)]
pub struct ProfileView<'a> {
    profile: &'a DelayProfile,
    pair: Option<&'a PairKey>,
}

impl ProfileView<'_> {
    pub fn value(&self, param: Param) -> u64 {
        self.profile.resolve(self.pair, param)
    }

    pub fn ms(&self, param: Param) -> Duration {
        Duration::from_millis(self.value(param))
    }

    pub fn count(&self, param: Param) -> u32 {
        self.value(param).min(u32::MAX as u64) as u32
    }

    /// Polling quantum for interruptible waits.
    pub fn quantum(&self) -> Duration {
        self.ms(Param::EnterPollMs)
    }
}

/// On-disk shape of `delays.json`. A `null` override table means none.
#[derive(Debug, Default, Serialize, Deserialize)]
struct DelaysFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pair_overrides: Option<BTreeMap<String, BTreeMap<String, Value>>>,
    #[serde(flatten)]
    values: BTreeMap<String, Value>,
}

/// Hard-coded baseline profile with every parameter set.
pub fn defaults() -> DelayProfile {
    DelayProfile {
        values: Param::ALL
            .iter()
            .map(|p| (*p, p.default_value()))
            .collect(),
        pair_overrides: BTreeMap::new(),
    }
}

/// Resolves `param` for `pair`: override, then profile value, then default.
pub fn resolve(profile: &DelayProfile, pair: Option<&PairKey>, param: Param) -> u64 {
    profile.resolve(pair, param)
}

/// Loads and validates a profile.
///
/// Unknown keys are logged and skipped; out-of-range values fail the load.
pub fn load(path: &Path) -> Result<DelayProfile, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file: DelaysFile =
        serde_json::from_str(&contents).map_err(|e| ConfigError::Malformed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let mut profile = DelayProfile::empty();
    for (key, raw) in &file.values {
        if key == COMMENTS_KEY {
            continue;
        }
        let Some(param) = Param::from_name(key) else {
            crate::log(&format!(
                "Warning: unknown setting '{}' in {} (ignored)",
                key,
                path.display()
            ));
            continue;
        };
        if let Some(value) = parse_value(path, param, raw)? {
            profile.values.insert(param, value);
        }
    }

    for (pair_name, overrides) in file.pair_overrides.iter().flatten() {
        let pair: PairKey = pair_name.parse().map_err(|e| ConfigError::Malformed {
            path: path.to_path_buf(),
            message: format!("pair_overrides: {}", e),
        })?;
        for (key, raw) in overrides {
            let Some(param) = Param::from_name(key) else {
                crate::log(&format!(
                    "Warning: unknown setting '{}' in pair override '{}' (ignored)",
                    key, pair_name
                ));
                continue;
            };
            if let Some(value) = parse_value(path, param, raw)? {
                profile
                    .pair_overrides
                    .entry(pair.clone())
                    .or_default()
                    .insert(param, value);
            }
        }
    }

    Ok(profile)
}

/// Converts one JSON value. `null` (or the string "null") means "not set".
fn parse_value(path: &Path, param: Param, raw: &Value) -> Result<Option<u64>, ConfigError> {
    let number = match raw {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().eq_ignore_ascii_case("null") => return Ok(None),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    let Some(number) = number else {
        return Err(ConfigError::Malformed {
            path: path.to_path_buf(),
            message: format!("{} must be a number, got {}", param.name(), raw),
        });
    };
    param.validate(number).map(Some)
}

/// Writes a profile as pretty JSON, creating parent directories.
pub fn save(profile: &DelayProfile, path: &Path) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    let file = DelaysFile {
        values: profile
            .values
            .iter()
            .map(|(p, v)| (p.name().to_string(), Value::from(*v)))
            .collect(),
        pair_overrides: (!profile.pair_overrides.is_empty()).then(|| {
            profile
                .pair_overrides
                .iter()
                .map(|(pair, overrides)| {
                    let entries = overrides
                        .iter()
                        .map(|(p, v)| (p.name().to_string(), Value::from(*v)))
                        .collect();
                    (pair.to_string(), entries)
                })
                .collect()
        }),
    };

    let json = serde_json::to_string_pretty(&file)
        .map_err(|e| write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
    }
    fs::write(path, json).map_err(write_err)
}

/// What [`ConfigStore::open`] does when the file cannot be loaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fallback {
    /// Log the error and start from [`defaults`].
    UseDefaults,
    /// Return the error to the caller.
    Fail,
}

/// Shared, swappable profile.
///
/// The worker takes a [`ConfigStore::snapshot`] at the start of each cycle
/// and uses it unchanged; the settings path swaps in a new profile.
#[derive(Debug)]
pub struct ConfigStore {
    current: RwLock<Arc<DelayProfile>>,
}

impl ConfigStore {
    pub fn new(profile: DelayProfile) -> Self {
        Self {
            current: RwLock::new(Arc::new(profile)),
        }
    }

    /// Loads `path`, applying the fallback policy on failure.
    pub fn open(path: &Path, fallback: Fallback) -> Result<Self, ConfigError> {
        match load(path) {
            Ok(profile) => {
                crate::log(&format!(
                    "Delays loaded from {} ({})",
                    path.display(),
                    profile.describe()
                ));
                Ok(Self::new(profile))
            }
            Err(e) if fallback == Fallback::UseDefaults => {
                crate::log(&format!("{}. Using default delays.", e));
                Ok(Self::new(defaults()))
            }
            Err(e) => Err(e),
        }
    }

    /// Consistent copy of the current profile.
    pub fn snapshot(&self) -> Arc<DelayProfile> {
        self.current
            .read()
            .map(|p| p.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn replace(&self, profile: DelayProfile) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(profile);
    }

    /// Replaces the current profile with the file's; on error the current
    /// profile is kept.
    pub fn load_config(&self, path: &Path) -> Result<(), ConfigError> {
        let profile = load(path)?;
        crate::log(&format!(
            "Delays reloaded from {} ({})",
            path.display(),
            profile.describe()
        ));
        self.replace(profile);
        Ok(())
    }

    pub fn save_config(&self, path: &Path) -> Result<(), ConfigError> {
        save(&self.snapshot(), path)?;
        crate::log(&format!("Delays saved to {}", path.display()));
        Ok(())
    }

    pub fn reset_defaults(&self) {
        self.replace(defaults());
        crate::log("Delays reset to defaults");
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(defaults())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn pair(a: &str, b: &str) -> PairKey {
        PairKey::new(a, b).unwrap()
    }

    #[test]
    fn test_param_names_round_trip() {
        for param in Param::ALL {
            assert_eq!(Param::from_name(param.name()), Some(param));
            let (min, max) = param.range();
            assert!(min <= param.default_value() && param.default_value() <= max);
        }
        assert_eq!(Param::from_name("no_such_knob"), None);
    }

    #[test]
    fn test_defaults_match_baseline() {
        let profile = defaults();
        assert_eq!(profile.get(Param::LeftClickHoldMs), Some(25));
        assert_eq!(profile.get(Param::ValidationMaxAttempts), Some(5));
        assert_eq!(profile.get(Param::AutoLoopIntervalMs), Some(2000));
        assert_eq!(profile.get(Param::EnterPollMs), Some(30));
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("delays.json");

        let mut profile = defaults();
        profile.set(Param::LeftClickHoldMs, 33).unwrap();
        profile
            .set_override(pair("red-potion", "blue-potion"), Param::FlipClickDelayMs, 90)
            .unwrap();
        profile
            .set_override(pair("green-potion", "green-potion"), Param::LeftClickHoldMs, 0)
            .unwrap();

        save(&profile, &path).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, profile);

        assert_eq!(
            loaded.pair_overrides().map(|p| p.to_string()).collect::<Vec<_>>(),
            ["green-potion:green-potion", "red-potion:blue-potion"]
        );

        // Partial profiles survive as well.
        let mut partial = DelayProfile::empty();
        partial.set(Param::PostDropSleepMs, 7).unwrap();
        save(&partial, &path).unwrap();
        assert_eq!(load(&path).unwrap(), partial);
    }

    #[test]
    fn test_override_for_unsavable_pair_is_refused() {
        use crate::recognition::PieceKind;

        let unsavable = PairKey {
            first: PieceKind::new("potion:red"),
            second: PieceKind::new("blue"),
        };
        let mut profile = defaults();
        assert!(matches!(
            profile.set_override(unsavable, Param::LeftClickHoldMs, 40),
            Err(ConfigError::Invalid(_))
        ));
        assert_eq!(profile, defaults());

        // Whatever set_override accepts loads back unchanged.
        profile
            .set_override(pair("potion-red", "blue"), Param::LeftClickHoldMs, 40)
            .unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("delays.json");
        save(&profile, &path).unwrap();
        assert_eq!(load(&path).unwrap(), profile);
    }

    #[test]
    fn test_resolve_precedence() {
        let rb = pair("red-potion", "blue-potion");
        let gg = pair("green-potion", "green-potion");

        let mut profile = DelayProfile::empty();
        profile.set(Param::LeftClickHoldMs, 40).unwrap();
        profile.set_override(rb.clone(), Param::LeftClickHoldMs, 75).unwrap();

        // Override wins for its own pair only.
        assert_eq!(resolve(&profile, Some(&rb), Param::LeftClickHoldMs), 75);
        assert_eq!(resolve(&profile, Some(&gg), Param::LeftClickHoldMs), 40);
        assert_eq!(resolve(&profile, None, Param::LeftClickHoldMs), 40);

        // Reversed pair is a different key.
        assert_eq!(
            resolve(&profile, Some(&rb.reversed()), Param::LeftClickHoldMs),
            40
        );

        // Missing everywhere: hard-coded default.
        for param in Param::ALL {
            if param != Param::LeftClickHoldMs {
                assert_eq!(resolve(&profile, Some(&rb), param), param.default_value());
            }
        }
    }

    #[test]
    fn test_load_rejects_negative_duration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("delays.json");
        fs::write(&path, r#"{ "left_click_hold_ms": -5 }"#).unwrap();

        match load(&path) {
            Err(ConfigError::OutOfRange { key, .. }) => assert_eq!(key, "left_click_hold_ms"),
            other => panic!("expected OutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn test_load_rejects_bad_override() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("delays.json");
        fs::write(
            &path,
            r#"{ "pair_overrides": { "R:B": { "validation_max_attempts": 0 } } }"#,
        )
        .unwrap();
        assert!(matches!(load(&path), Err(ConfigError::OutOfRange { .. })));

        fs::write(&path, r#"{ "pair_overrides": { "RB": {} } }"#).unwrap();
        assert!(matches!(load(&path), Err(ConfigError::Malformed { .. })));
    }

    #[test]
    fn test_load_tolerates_unknown_keys_and_nulls() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("delays.json");
        fs::write(
            &path,
            r#"{
                "_comments": { "left_click_hold_ms": "How long to hold." },
                "left_click_hold_ms": 30,
                "enter_timeout_s": null,
                "future_knob_ms": 12,
                "post_drop_sleep_ms": "55",
                "flip_click_delay_ms": null,
                "pair_overrides": null
            }"#,
        )
        .unwrap();

        let profile = load(&path).unwrap();
        assert_eq!(profile.get(Param::LeftClickHoldMs), Some(30));
        assert_eq!(profile.pair_overrides().count(), 0);
        assert_eq!(profile.get(Param::PostDropSleepMs), Some(55));
        assert_eq!(profile.get(Param::FlipClickDelayMs), None);
        assert_eq!(profile.resolve(None, Param::FlipClickDelayMs), 60);
    }

    #[test]
    fn test_load_missing_and_malformed() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        assert!(matches!(load(&missing), Err(ConfigError::NotFound { .. })));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(load(&broken), Err(ConfigError::Malformed { .. })));

        let wrong_type = dir.path().join("wrong.json");
        fs::write(&wrong_type, r#"{ "left_click_hold_ms": [1, 2] }"#).unwrap();
        assert!(matches!(load(&wrong_type), Err(ConfigError::Malformed { .. })));
    }

    #[test]
    fn test_store_fallback_policy() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("absent.json");

        assert!(ConfigStore::open(&missing, Fallback::Fail).is_err());

        let store = ConfigStore::open(&missing, Fallback::UseDefaults).unwrap();
        assert_eq!(*store.snapshot(), defaults());
    }

    #[test]
    fn test_store_snapshot_is_stable_across_replace() {
        let store = ConfigStore::default();
        let before = store.snapshot();

        let mut changed = defaults();
        changed.set(Param::LeftClickHoldMs, 99).unwrap();
        store.replace(changed);

        assert_eq!(before.get(Param::LeftClickHoldMs), Some(25));
        assert_eq!(store.snapshot().get(Param::LeftClickHoldMs), Some(99));

        store.reset_defaults();
        assert_eq!(store.snapshot().get(Param::LeftClickHoldMs), Some(25));
    }

    #[test]
    fn test_store_keeps_profile_on_failed_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("delays.json");
        fs::write(&path, r#"{ "mouse_jitter_px": 500 }"#).unwrap();

        let store = ConfigStore::default();
        assert!(store.load_config(&path).is_err());
        assert_eq!(*store.snapshot(), defaults());

        store.save_config(&path).unwrap();
        store.reset_defaults();
        store.load_config(&path).unwrap();
        assert_eq!(*store.snapshot(), defaults());
    }
}
