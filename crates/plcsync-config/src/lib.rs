//! Configuration for plcsync.
//!
//! A TOML file merged with `PLCSYNC_`-prefixed environment variables,
//! credential resolution (env var, keyring, plaintext), and translation to
//! `plcsync_core::EngineConfig`. The engine itself never reads files or
//! environment; everything it needs is resolved here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use plcsync_core::{
    BankLayout, EngineConfig, EntryKind, OverflowPolicy, RegisterBank, RetryPolicy, Schedule,
    TargetConfig, TimePadding, TlsVerification,
};

/// Environment prefix; nested keys are separated by `__`
/// (`PLCSYNC_SYNC__DEBOUNCE_SECS=10`).
pub const ENV_PREFIX: &str = "PLCSYNC_";

const KEYRING_SERVICE: &str = "plcsync";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for target '{target}'")]
    NoCredentials { target: String },

    #[error("unknown target '{key}'")]
    UnknownTarget { key: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Directory for status and backup files.
    pub data_dir: Option<PathBuf>,

    /// JSON snapshot of the calendar (array of entries).
    pub calendar_file: Option<PathBuf>,

    /// Enables a daily-rolling log file for the daemon.
    pub log_dir: Option<PathBuf>,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub feed: FeedSettings,

    /// Shared by every target unless overridden.
    #[serde(default)]
    pub defaults: Defaults,

    /// Controllers keyed by a stable identifier. Empty means the built-in
    /// plenary and auditorium layout.
    #[serde(default)]
    pub targets: BTreeMap<String, Target>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncSettings {
    #[serde(default = "default_debounce")]
    pub debounce_secs: u64,

    #[serde(default = "default_tick")]
    pub tick_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce_secs: default_debounce(),
            tick_secs: default_tick(),
        }
    }
}

fn default_debounce() -> u64 {
    5
}
fn default_tick() -> u64 {
    60
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FeedSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub times: Vec<String>,

    /// Importer command run by the daemon at each feed time, e.g.
    /// `["calendar-import", "--source", "public"]`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    pub username: Option<String>,

    /// Environment variable holding the gateway password.
    pub password_env: Option<String>,

    /// Plaintext password (prefer keyring or env var).
    pub password: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_write_delay")]
    pub write_delay_ms: u64,

    #[serde(default = "default_true")]
    pub sequential_fallback: bool,

    #[serde(default = "default_true")]
    pub schedule_enabled: bool,

    #[serde(default = "default_times")]
    pub times: Vec<String>,

    /// Hosts the gateway wrongly redirects to; rewritten to `api_url`'s host.
    #[serde(default = "default_bad_hosts")]
    pub known_bad_hosts: Vec<String>,

    #[serde(default)]
    pub insecure: bool,

    pub ca_cert: Option<PathBuf>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            username: None,
            password_env: None,
            password: None,
            timeout: default_timeout(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff(),
            write_delay_ms: default_write_delay(),
            sequential_fallback: true,
            schedule_enabled: true,
            times: default_times(),
            known_bad_hosts: default_bad_hosts(),
            insecure: false,
            ca_cert: None,
        }
    }
}

fn default_api_url() -> String {
    "https://automacao.tce.go.gov.br/scadaweb/api".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_retry_count() -> u32 {
    3
}
fn default_retry_backoff() -> u64 {
    2000
}
fn default_write_delay() -> u64 {
    200
}
fn default_true() -> bool {
    true
}
fn default_times() -> Vec<String> {
    vec!["07:00".into(), "20:00".into()]
}
fn default_bad_hosts() -> Vec<String> {
    vec!["automacao.tce.go.br".into()]
}

/// One controller. Unset fields fall back to `[defaults]`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Target {
    pub name: Option<String>,

    /// PLC address as the gateway knows it (e.g., "172.17.85.104").
    pub plc_address: String,

    /// Event locations whose entries this controller mirrors.
    #[serde(default)]
    pub locations: Vec<String>,

    pub api_url: Option<String>,
    pub username: Option<String>,
    pub password_env: Option<String>,
    pub password: Option<String>,
    pub timeout: Option<u64>,
    pub retry_count: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    pub write_delay_ms: Option<u64>,
    pub sequential_fallback: Option<bool>,
    pub schedule_enabled: Option<bool>,
    pub times: Option<Vec<String>>,
    pub known_bad_hosts: Option<Vec<String>>,
    pub insecure: Option<bool>,
    pub ca_cert: Option<PathBuf>,

    #[serde(default)]
    pub banks: Vec<Bank>,
}

impl Target {
    fn new(plc_address: &str, name: &str) -> Self {
        Self {
            name: Some(name.into()),
            plc_address: plc_address.into(),
            locations: Vec::new(),
            api_url: None,
            username: None,
            password_env: None,
            password: None,
            timeout: None,
            retry_count: None,
            retry_backoff_ms: None,
            write_delay_ms: None,
            sequential_fallback: None,
            schedule_enabled: None,
            times: None,
            known_bad_hosts: None,
            insecure: None,
            ca_cert: None,
            banks: Vec::new(),
        }
    }
}

/// How a bank's fields are laid out across data files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutStyle {
    /// One data file per field (`tags` lists them in field order).
    #[default]
    Split,
    /// Every field in a single data file (`tags` has one entry).
    Packed,
}

/// A register bank holding one entry kind.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Bank {
    pub kind: EntryKind,

    #[serde(default = "default_capacity")]
    pub capacity: usize,

    pub tags: Vec<String>,

    #[serde(default)]
    pub layout: LayoutStyle,

    #[serde(default)]
    pub element_base: u32,

    #[serde(default = "default_stride")]
    pub stride: u32,

    #[serde(default)]
    pub overflow: OverflowPolicy,

    #[serde(default)]
    pub pad_start_minutes: u32,

    #[serde(default)]
    pub pad_end_minutes: u32,

    /// Padding never moves an event start before this `HH:MM`.
    pub earliest_start: Option<String>,
}

fn default_capacity() -> usize {
    10
}
fn default_stride() -> u32 {
    1
}

impl Bank {
    fn split(kind: EntryKind, tags: &[&str]) -> Self {
        Self {
            kind,
            capacity: default_capacity(),
            tags: tags.iter().map(|t| (*t).to_owned()).collect(),
            layout: LayoutStyle::Split,
            element_base: 0,
            stride: default_stride(),
            overflow: OverflowPolicy::default(),
            pad_start_minutes: 0,
            pad_end_minutes: 0,
            earliest_start: None,
        }
    }

    /// Build the runtime bank, validating the layout.
    pub fn to_register_bank(&self, field: &str) -> Result<RegisterBank, ConfigError> {
        let layout = match self.layout {
            LayoutStyle::Split => BankLayout::Split {
                files: self.tags.clone(),
                element_base: self.element_base,
                stride: self.stride,
            },
            LayoutStyle::Packed => match self.tags.as_slice() {
                [file] => BankLayout::Packed {
                    file: file.clone(),
                    element_base: self.element_base,
                },
                _ => return Err(invalid(field, "packed layout takes exactly one tag")),
            },
        };

        let bank = RegisterBank::new(self.kind, self.capacity, layout)
            .map_err(|e| invalid(field, e.to_string()))?
            .with_overflow(self.overflow);

        if self.pad_start_minutes == 0 && self.pad_end_minutes == 0 {
            return Ok(bank);
        }
        let earliest_start = match &self.earliest_start {
            Some(raw) => parse_time(&format!("{field}.earliest_start"), raw)?,
            None => NaiveTime::MIN,
        };
        Ok(bank.with_padding(TimePadding {
            before_minutes: self.pad_start_minutes,
            after_minutes: self.pad_end_minutes,
            earliest_start,
        }))
    }
}

/// The controllers this system was built for: holidays and plenary events
/// on the ground-floor PLC, auditorium events on the auditorium PLC.
/// Neither bank pads event times.
pub fn builtin_targets() -> BTreeMap<String, Target> {
    let mut plenario = Target::new("172.17.85.104", "Plenário");
    plenario.locations = vec!["Plenário".into()];
    plenario.banks = vec![
        Bank::split(EntryKind::Holiday, &["N33", "N34"]),
        Bank::split(EntryKind::Event, &["N60", "N61", "N62", "N63", "N64", "N65"]),
    ];

    let mut auditorio = Target::new("172.17.85.123", "Auditório");
    auditorio.locations = vec!["Auditório Nobre".into(), "Foyer do Auditório".into()];
    auditorio.banks = vec![Bank::split(
        EntryKind::Event,
        &["N91", "N92", "N93", "N94", "N95", "N96"],
    )];

    BTreeMap::from([
        ("plenario".to_owned(), plenario),
        ("auditorio".to_owned(), auditorio),
    ])
}

// ── Config file path ────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("br.gov.go", "tce", "plcsync")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn default_data_dir() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("data"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("plcsync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the config from `path` + environment. A missing file yields the
/// defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    for key in config.targets.keys() {
        check_target_key(key)?;
    }
    Ok(config)
}

/// Target keys name status and backup files, so they are limited to
/// lowercase ASCII letters, digits, `_` and `-`.
fn check_target_key(key: &str) -> Result<(), ConfigError> {
    let valid = !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(invalid(
            format!("targets.{key}"),
            "key may only contain a-z, 0-9, '_' and '-'",
        ))
    }
}

impl Config {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn calendar_file(&self) -> PathBuf {
        self.calendar_file
            .clone()
            .unwrap_or_else(|| self.data_dir().join("calendar.json"))
    }

    /// Configured targets, or the built-in layout when none are configured.
    pub fn targets(&self) -> BTreeMap<String, Target> {
        if self.targets.is_empty() {
            builtin_targets()
        } else {
            self.targets.clone()
        }
    }

    pub fn target(&self, key: &str) -> Result<Target, ConfigError> {
        self.targets()
            .remove(key)
            .ok_or_else(|| ConfigError::UnknownTarget { key: key.into() })
    }

    /// A target's sync schedule, resolved without touching credentials.
    pub fn target_schedule(&self, key: &str) -> Result<Schedule, ConfigError> {
        let target = self.target(key)?;
        resolve_schedule(key, &target, &self.defaults)
    }

    /// Resolve one target into its runtime form, credentials included.
    pub fn target_config(&self, key: &str) -> Result<TargetConfig, ConfigError> {
        let target = self.target(key)?;
        resolve_target(key, &target, &self.defaults)
    }

    /// Resolve every target and the engine-wide settings.
    pub fn to_engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let targets = self
            .targets()
            .iter()
            .map(|(key, target)| resolve_target(key, target, &self.defaults))
            .collect::<Result<Vec<_>, _>>()?;

        let feed_schedule = if self.feed.enabled {
            Schedule::new(true, parse_times("feed.times", &self.feed.times)?)
        } else {
            Schedule::disabled()
        };

        if self.sync.tick_secs == 0 {
            return Err(invalid("sync.tick_secs", "must be at least 1"));
        }

        Ok(EngineConfig {
            targets,
            data_dir: self.data_dir(),
            debounce: Duration::from_secs(self.sync.debounce_secs),
            tick: Duration::from_secs(self.sync.tick_secs),
            feed_schedule,
        })
    }

    /// The config with every plaintext password masked, for display.
    pub fn redacted(&self) -> Self {
        let mask = |p: &mut Option<String>| {
            if p.is_some() {
                *p = Some("********".into());
            }
        };
        let mut config = self.clone();
        mask(&mut config.defaults.password);
        for target in config.targets.values_mut() {
            mask(&mut target.password);
        }
        config
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

// ── Target resolution ───────────────────────────────────────────────

fn resolve_target(
    key: &str,
    target: &Target,
    defaults: &Defaults,
) -> Result<TargetConfig, ConfigError> {
    check_target_key(key)?;
    let field = |name: &str| format!("targets.{key}.{name}");

    let raw_url = target.api_url.as_deref().unwrap_or(&defaults.api_url);
    let api_url: Url = raw_url
        .parse()
        .map_err(|_| invalid(field("api_url"), format!("invalid URL: {raw_url}")))?;

    if target.banks.is_empty() {
        return Err(invalid(field("banks"), "at least one bank is required"));
    }
    let banks = target
        .banks
        .iter()
        .enumerate()
        .map(|(i, bank)| bank.to_register_bank(&format!("targets.{key}.banks[{i}]")))
        .collect::<Result<Vec<_>, _>>()?;

    let (username, password) = resolve_credentials(key, target, defaults)?;

    let tls = if target.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ca) = target.ca_cert.as_ref().or(defaults.ca_cert.as_ref()) {
        TlsVerification::CustomCa(ca.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let schedule = resolve_schedule(key, target, defaults)?;

    Ok(TargetConfig {
        key: key.to_owned(),
        name: target.name.clone().unwrap_or_else(|| key.to_owned()),
        api_url,
        plc_address: target.plc_address.clone(),
        username,
        password,
        tls,
        timeout: Duration::from_secs(target.timeout.unwrap_or(defaults.timeout)),
        write_delay: Duration::from_millis(
            target.write_delay_ms.unwrap_or(defaults.write_delay_ms),
        ),
        known_bad_hosts: target
            .known_bad_hosts
            .clone()
            .unwrap_or_else(|| defaults.known_bad_hosts.clone()),
        retry: RetryPolicy {
            attempts: target.retry_count.unwrap_or(defaults.retry_count),
            backoff: Duration::from_millis(
                target.retry_backoff_ms.unwrap_or(defaults.retry_backoff_ms),
            ),
        },
        sequential_fallback: target
            .sequential_fallback
            .unwrap_or(defaults.sequential_fallback),
        banks,
        locations: target.locations.clone(),
        schedule,
    })
}

fn resolve_schedule(
    key: &str,
    target: &Target,
    defaults: &Defaults,
) -> Result<Schedule, ConfigError> {
    let times = target.times.as_ref().unwrap_or(&defaults.times);
    Ok(Schedule::new(
        target.schedule_enabled.unwrap_or(defaults.schedule_enabled),
        parse_times(&format!("targets.{key}.times"), times)?,
    ))
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the gateway username and password for a target.
///
/// Password chain: `password_env` variable, then the keyring entry
/// `plcsync / <target>/password`, then plaintext config.
pub fn resolve_credentials(
    key: &str,
    target: &Target,
    defaults: &Defaults,
) -> Result<(String, SecretString), ConfigError> {
    let username = target
        .username
        .clone()
        .or_else(|| defaults.username.clone())
        .or_else(|| std::env::var("PLCSYNC_USERNAME").ok())
        .ok_or_else(|| ConfigError::NoCredentials { target: key.into() })?;

    // 1. Env var
    if let Some(env_name) = target.password_env.as_ref().or(defaults.password_env.as_ref()) {
        if let Ok(pw) = std::env::var(env_name) {
            return Ok((username, SecretString::from(pw)));
        }
    }

    // 2. Keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{key}/password")) {
        if let Ok(pw) = entry.get_password() {
            return Ok((username, SecretString::from(pw)));
        }
    }

    // 3. Plaintext in config
    if let Some(pw) = target.password.as_ref().or(defaults.password.as_ref()) {
        return Ok((username, SecretString::from(pw.clone())));
    }

    Err(ConfigError::NoCredentials { target: key.into() })
}

// ── Helpers ─────────────────────────────────────────────────────────

fn parse_time(field: &str, raw: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|e| invalid(field, format!("expected HH:MM, got {raw:?} ({e})")))
}

fn parse_times(field: &str, raw: &[String]) -> Result<Vec<NaiveTime>, ConfigError> {
    raw.iter().map(|t| parse_time(field, t)).collect()
}
