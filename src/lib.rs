// src/lib.rs

pub mod cli;
pub mod command;
pub mod config;
pub mod control;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod listener;
pub mod logging;
pub mod plugin;
pub mod redefine;
pub mod transform;
pub mod types;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::load_and_validate;
use crate::config::ConfigFile;
use crate::control::{Dispatcher, RunResults, TraceTable};
use crate::engine::{Agent, AgentOptions};
use crate::fs::{walk_files, FileSystem, RealFileSystem};
use crate::redefine::InMemoryHost;
use crate::watch::{ChangeEvent, ChangeKind, WatchRoot};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - an in-process host pre-loaded with every unit under the watch roots
/// - the agent (registry, plugins, scheduler, pipeline)
/// - the file watcher
/// - the optional control channel
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let roots = cfg
        .watch_roots()
        .iter()
        .map(WatchRoot::from_section)
        .collect::<errors::Result<Vec<_>>>()?;

    let options = AgentOptions::from(cfg.agent());
    let host = Arc::new(InMemoryHost::new());
    let agent = Arc::new(Agent::builder(host).options(options).build());
    let loaded = preload_units(&RealFileSystem, &agent, &roots)?;
    info!(loaded, roots = roots.len(), "pre-loaded units from watch roots");

    agent.watch(roots)?;

    let control_task = match cfg.control() {
        Some(section) => {
            let addr = section
                .bind_addr()
                .ok_or_else(|| anyhow!("invalid control bind address '{}'", section.bind))?;
            let listener = control::bind(addr).await?;
            let dispatcher = Arc::new(Dispatcher::for_agent(
                Arc::clone(&agent),
                Arc::new(TraceTable::new()),
                Arc::new(RunResults::new()),
            ));
            Some(tokio::spawn(control::serve(listener, dispatcher)))
        }
        None => None,
    };

    info!("hotswap agent running; press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C; shutting down");
    }

    if let Some(task) = control_task {
        task.abort();
    }
    agent.shutdown();
    Ok(())
}

/// Define every unit file found under `roots` through `agent`, as the live
/// process would at startup. A unit the host refuses (for instance one
/// already defined from another root) is logged and skipped. Returns the
/// number of units defined.
pub fn preload_units(
    fs: &dyn FileSystem,
    agent: &Agent,
    roots: &[WatchRoot],
) -> errors::Result<usize> {
    let mut loaded = 0;
    for root in roots {
        if !fs.is_dir(root.path()) {
            continue;
        }
        for file in walk_files(fs, root.path())? {
            let event = ChangeEvent::file(&file, ChangeKind::Create);
            if !root.accepts(&event) {
                continue;
            }
            let Some(unit) = agent.router().unit_of(root, &event) else {
                continue;
            };
            match agent.define(&unit, fs.read(&file)?) {
                Ok(()) => loaded += 1,
                Err(err) => warn!(unit = %unit, error = %err, "skipping unit at startup"),
            }
        }
    }
    Ok(loaded)
}

/// Simple dry-run output: print agent settings and watch roots.
fn print_dry_run(cfg: &ConfigFile) {
    let agent = cfg.agent();
    println!("hotswap dry-run");
    println!("  agent.debounce_ms = {}", agent.debounce_ms);
    println!("  agent.create_delay_ms = {}", agent.create_delay_ms);
    println!("  agent.max_workers = {}", agent.max_workers);
    println!("  agent.transient_retries = {}", agent.transient_retries);
    println!("  agent.skip_unchanged = {}", agent.skip_unchanged);
    println!("  agent.unloaded_policy = {:?}", agent.unloaded_policy);
    println!("  agent.unit_extension = {}", agent.unit_extension);

    if let Some(control) = cfg.control() {
        println!();
        println!("control:");
        println!("  bind = {}", control.bind);
        println!("  heartbeat_interval_secs = {}", control.heartbeat_interval_secs);
        println!("  max_retries = {}", control.max_retries);
    }

    println!();
    println!("watch ({}):", cfg.watch_roots().len());
    for root in cfg.watch_roots() {
        println!("  - {}", root.root.display());
        if let Some(ref scope) = root.scope {
            println!("      scope: {scope}");
        }
        println!("      include: {:?}", root.include);
        if !root.exclude.is_empty() {
            println!("      exclude: {:?}", root.exclude);
        }
    }

    debug!("dry-run complete (nothing watched)");
}
