// ── Runtime engine configuration ──
//
// These types describe the targets the engine drives and how to reach them.
// They carry credential data but never touch disk: `plcsync-config` builds
// an `EngineConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use plcsync_api::{Credentials, PlcClient, TagAddress, Throttle, TlsMode, TransportConfig};

use crate::calendar::EntryScope;
use crate::error::CoreError;
use crate::model::{CalendarEntry, EntryKind, RegisterBank};
use crate::retry::RetryPolicy;
use crate::schedule::Schedule;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed gateway).
    DangerAcceptInvalid,
}

/// One physical controller and the calendar slice it mirrors.
///
/// Immutable after startup apart from its schedule, which the coordinator
/// owns a live copy of.
#[derive(Debug, Clone)]
pub struct TargetConfig {
    /// Stable identifier used in file names and commands (`plenario`).
    pub key: String,
    pub name: String,
    /// Gateway API root.
    pub api_url: Url,
    /// PLC address as the gateway knows it.
    pub plc_address: String,
    pub username: String,
    pub password: SecretString,
    pub tls: TlsVerification,
    pub timeout: Duration,
    /// Minimum gap between sequential gateway calls.
    pub write_delay: Duration,
    pub known_bad_hosts: Vec<String>,
    pub retry: RetryPolicy,
    /// Fall back to one-register-per-call writes when the batch endpoint fails.
    pub sequential_fallback: bool,
    pub banks: Vec<RegisterBank>,
    /// Event locations routed to this target.
    pub locations: Vec<String>,
    pub schedule: Schedule,
}

impl TargetConfig {
    pub fn scope(&self) -> EntryScope {
        let mut kinds: Vec<EntryKind> = self.banks.iter().map(RegisterBank::kind).collect();
        kinds.sort_unstable();
        kinds.dedup();
        EntryScope {
            kinds,
            locations: self.locations.clone(),
        }
    }

    /// Whether a change to `entry` should trigger a pass on this target.
    pub fn handles(&self, entry: &CalendarEntry) -> bool {
        self.scope().matches(entry)
    }

    /// Whether events at `location` are routed here.
    pub fn handles_location(&self, location: &str) -> bool {
        self.banks.iter().any(|b| b.kind() == EntryKind::Event)
            && self.locations.iter().any(|l| l == location)
    }

    /// Register read by connectivity probes.
    pub fn probe_address(&self) -> Result<&TagAddress, CoreError> {
        self.banks
            .iter()
            .find_map(RegisterBank::first_address)
            .ok_or_else(|| CoreError::Config {
                message: format!("target {} has no registers", self.key),
            })
    }

    pub fn transport(&self) -> TransportConfig {
        let mut transport = TransportConfig::with_timeout(self.timeout);
        transport.tls = match &self.tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        };
        transport
    }

    pub fn build_client(&self) -> Result<PlcClient, CoreError> {
        let client = PlcClient::new(
            self.api_url.clone(),
            self.plc_address.clone(),
            Credentials::new(self.username.clone(), self.password.clone()),
            &self.transport(),
        )?;
        Ok(client
            .with_known_bad_hosts(self.known_bad_hosts.clone())
            .with_throttle(Throttle::new(self.write_delay)))
    }
}

/// Everything needed to assemble an [`Engine`](crate::Engine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub targets: Vec<TargetConfig>,
    /// Directory for status and backup files.
    pub data_dir: PathBuf,
    /// Quiet period after the last calendar mutation before a pass starts.
    pub debounce: Duration,
    /// Coordinator tick.
    pub tick: Duration,
    pub feed_schedule: Schedule,
}

impl EngineConfig {
    pub fn target(&self, key: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.key == key)
    }
}
