#![allow(dead_code)]

use std::path::PathBuf;

use hotswap::config::{AgentSection, ConfigFile, ControlSection, RawConfigFile, WatchSection};
use hotswap::engine::AgentOptions;
use hotswap::types::UnloadedPolicy;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                agent: AgentSection::default(),
                control: None,
                watch: Vec::new(),
            },
        }
    }

    pub fn with_root(mut self, root: WatchSection) -> Self {
        self.config.watch.push(root);
        self
    }

    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.config.agent.debounce_ms = ms;
        self
    }

    pub fn max_workers(mut self, n: usize) -> Self {
        self.config.agent.max_workers = n;
        self
    }

    pub fn unloaded_policy(mut self, policy: UnloadedPolicy) -> Self {
        self.config.agent.unloaded_policy = policy;
        self
    }

    pub fn control(mut self, bind: &str) -> Self {
        self.config.control = Some(ControlSection {
            bind: bind.to_string(),
            heartbeat_interval_secs: 3,
            max_retries: 20,
        });
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `WatchSection`.
pub struct WatchSectionBuilder {
    section: WatchSection,
}

impl WatchSectionBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            section: WatchSection {
                root: root.into(),
                scope: None,
                include: vec!["**/*".to_string()],
                exclude: Vec::new(),
            },
        }
    }

    pub fn scope(mut self, scope: &str) -> Self {
        self.section.scope = Some(scope.to_string());
        self
    }

    pub fn include(mut self, pattern: &str) -> Self {
        if self.section.include == ["**/*"] {
            self.section.include.clear();
        }
        self.section.include.push(pattern.to_string());
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.section.exclude.push(pattern.to_string());
        self
    }

    pub fn build(self) -> WatchSection {
        self.section
    }
}

/// `AgentOptions` with the default windows (500ms debounce, 1s create
/// delay) and a small retry budget.
pub fn test_options() -> AgentOptions {
    AgentOptions {
        debounce: std::time::Duration::from_millis(500),
        create_delay: std::time::Duration::from_millis(1000),
        max_workers: 4,
        transient_retries: 3,
        skip_unchanged: true,
        unloaded_policy: UnloadedPolicy::Ignore,
        unit_extension: "class".to_string(),
    }
}
