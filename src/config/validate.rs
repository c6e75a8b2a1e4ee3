use std::collections::HashSet;

use globset::Glob;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{HotswapError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::HotswapError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.agent, raw.control, raw.watch))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_roots(cfg)?;
    validate_agent(cfg)?;
    validate_control(cfg)?;
    validate_roots(cfg)?;
    Ok(())
}

fn ensure_has_roots(cfg: &RawConfigFile) -> Result<()> {
    if cfg.watch.is_empty() {
        return Err(HotswapError::ConfigError(
            "config must contain at least one [[watch]] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_agent(cfg: &RawConfigFile) -> Result<()> {
    if cfg.agent.debounce_ms == 0 {
        return Err(HotswapError::ConfigError(
            "[agent].debounce_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.agent.max_workers == 0 {
        return Err(HotswapError::ConfigError(
            "[agent].max_workers must be >= 1 (got 0)".to_string(),
        ));
    }
    let ext = cfg.agent.unit_extension.trim();
    if ext.is_empty() || ext.starts_with('.') {
        return Err(HotswapError::ConfigError(format!(
            "[agent].unit_extension must be a bare extension like \"class\" (got {:?})",
            cfg.agent.unit_extension
        )));
    }
    Ok(())
}

fn validate_control(cfg: &RawConfigFile) -> Result<()> {
    let Some(control) = &cfg.control else {
        return Ok(());
    };
    if control.bind_addr().is_none() {
        return Err(HotswapError::ConfigError(format!(
            "[control].bind is not a socket address: {:?}",
            control.bind
        )));
    }
    if control.max_retries == 0 {
        return Err(HotswapError::ConfigError(
            "[control].max_retries must be >= 1 (got 0)".to_string(),
        ));
    }
    if control.heartbeat_interval_secs == 0 {
        return Err(HotswapError::ConfigError(
            "[control].heartbeat_interval_secs must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_roots(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();
    for root in cfg.watch.iter() {
        if !seen.insert(root.root.clone()) {
            return Err(HotswapError::ConfigError(format!(
                "watch root {:?} is listed more than once",
                root.root
            )));
        }
        if root.include.is_empty() {
            return Err(HotswapError::ConfigError(format!(
                "watch root {:?} has an empty include list",
                root.root
            )));
        }
        if let Some(scope) = &root.scope {
            if scope.trim().is_empty() {
                return Err(HotswapError::ConfigError(format!(
                    "watch root {:?} has a blank scope",
                    root.root
                )));
            }
        }
        for pat in root.include.iter().chain(root.exclude.iter()) {
            Glob::new(pat).map_err(|e| {
                HotswapError::ConfigError(format!(
                    "invalid glob pattern {pat:?} for root {:?}: {e}",
                    root.root
                ))
            })?;
        }
    }
    Ok(())
}
