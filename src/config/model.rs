// src/config/model.rs

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::UnloadedPolicy;

/// Configuration exactly as read from a TOML file, before validation.
///
/// ```toml
/// [agent]
/// debounce_ms = 500
/// create_delay_ms = 1000
///
/// [control]
/// bind = "127.0.0.1:12345"
///
/// [[watch]]
/// root = "target/classes"
/// scope = "app"
/// exclude = ["**/*.tmp"]
/// ```
///
/// All sections except `[[watch]]` are optional and have defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub agent: AgentSection,

    #[serde(default)]
    pub control: Option<ControlSection>,

    #[serde(default)]
    pub watch: Vec<WatchSection>,
}

/// Validated configuration. Only constructed through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    agent: AgentSection,
    control: Option<ControlSection>,
    watch: Vec<WatchSection>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        agent: AgentSection,
        control: Option<ControlSection>,
        watch: Vec<WatchSection>,
    ) -> Self {
        Self {
            agent,
            control,
            watch,
        }
    }

    pub fn agent(&self) -> &AgentSection {
        &self.agent
    }

    pub fn control(&self) -> Option<&ControlSection> {
        self.control.as_ref()
    }

    pub fn watch_roots(&self) -> &[WatchSection] {
        &self.watch
    }
}

/// `[agent]` section: scheduling and reload behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// Quiescence window before a reload command fires.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Window used for CREATE events of units the host has not loaded.
    /// New files usually arrive while the compiler is still writing
    /// siblings, so this is longer than `debounce_ms`.
    #[serde(default = "default_create_delay_ms")]
    pub create_delay_ms: u64,

    /// Maximum number of commands executing at the same time.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// How often a command failing with transient I/O is re-scheduled.
    #[serde(default = "default_transient_retries")]
    pub transient_retries: u32,

    /// Skip redefinition when the unit bytes are identical to the last
    /// committed version.
    #[serde(default = "default_skip_unchanged")]
    pub skip_unchanged: bool,

    #[serde(default)]
    pub unloaded_policy: UnloadedPolicy,

    /// File extension (without dot) identifying compiled units.
    #[serde(default = "default_unit_extension")]
    pub unit_extension: String,
}

impl AgentSection {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn create_delay(&self) -> Duration {
        Duration::from_millis(self.create_delay_ms)
    }
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_create_delay_ms() -> u64 {
    1000
}

fn default_max_workers() -> usize {
    4
}

fn default_transient_retries() -> u32 {
    5
}

fn default_skip_unchanged() -> bool {
    true
}

fn default_unit_extension() -> String {
    "class".to_string()
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            create_delay_ms: default_create_delay_ms(),
            max_workers: default_max_workers(),
            transient_retries: default_transient_retries(),
            skip_unchanged: default_skip_unchanged(),
            unloaded_policy: UnloadedPolicy::default(),
            unit_extension: default_unit_extension(),
        }
    }
}

/// `[control]` section: the driver-facing control channel.
///
/// The agent itself only uses `bind`; it answers heartbeats but never sends
/// them. `heartbeat_interval_secs` and `max_retries` are read by the driver
/// side through [`HeartbeatLoop::from_section`], so a driver and the agent
/// can share one file.
///
/// [`HeartbeatLoop::from_section`]: crate::control::HeartbeatLoop::from_section
#[derive(Debug, Clone, Deserialize)]
pub struct ControlSection {
    /// Socket address the control server listens on.
    pub bind: String,

    /// Driver-side: seconds between heartbeats.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Driver-side: consecutive failed heartbeats before the driver gives up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl ControlSection {
    /// Parsed bind address. Validation guarantees this succeeds for a
    /// `ConfigFile`.
    pub fn bind_addr(&self) -> Option<SocketAddr> {
        self.bind.parse().ok()
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

fn default_heartbeat_interval_secs() -> u64 {
    3
}

fn default_max_retries() -> u32 {
    20
}

/// One `[[watch]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSection {
    pub root: PathBuf,

    /// Loader scope units under this root belong to. Absent = global.
    #[serde(default)]
    pub scope: Option<String>,

    #[serde(default = "default_include")]
    pub include: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_include() -> Vec<String> {
    vec!["**/*".to_string()]
}
