mod common;
use crate::common::builders::test_options;
use crate::common::fakes::{ListenerEvent, RecordingListener, ScriptedPlugin};
use crate::common::{init_tracing, ms, TestResult};

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use hotswap::command::Command;
use hotswap::engine::Agent;
use hotswap::fs::mock::MockFileSystem;
use hotswap::plugin::{HookDecl, HookEvent, Hookable};
use hotswap::redefine::InMemoryHost;
use hotswap::transform::{from_fn, Phase, Phases, TransformError, Transformed};
use hotswap::types::{LoaderScope, UnitId};
use hotswap::watch::{ChangeEvent, ChangeKind, RootProfile, RootedChange, WatchRoot};

const FOO_PATH: &str = "/w/com/acme/Foo.class";

struct Harness {
    agent: Agent,
    host: Arc<InMemoryHost>,
    fs: MockFileSystem,
    listener: Arc<RecordingListener>,
    root: Arc<WatchRoot>,
}

impl Harness {
    fn new() -> Self {
        init_tracing();
        let host = Arc::new(InMemoryHost::new());
        host.load(foo(), b"v1".to_vec());
        let fs = MockFileSystem::new();
        let agent = Agent::builder(host.clone())
            .options(test_options())
            .filesystem(Arc::new(fs.clone()))
            .build();
        let listener = Arc::new(RecordingListener::new("recorder"));
        agent.add_listener(listener.clone());
        Self {
            agent,
            host,
            fs,
            listener,
            root: Arc::new(WatchRoot::new("/w", None, RootProfile::everything())),
        }
    }

    fn change(&self, path: &str, kind: ChangeKind) {
        let change = RootedChange {
            root: Arc::clone(&self.root),
            event: ChangeEvent::file(path, kind),
        };
        self.agent.handle_change(&change);
    }
}

fn foo() -> UnitId {
    UnitId::global("com.acme.Foo")
}

#[tokio::test(start_paused = true)]
async fn burst_of_modifies_is_one_transformed_redefinition() -> TestResult {
    let h = Harness::new();
    h.agent.register_transformer(
        None,
        r"^com\.acme\.",
        Arc::new(from_fn("stamp", |_site, bytes: &[u8]| {
            let mut out = bytes.to_vec();
            out.extend_from_slice(b"+t");
            Ok(Transformed::Rewritten(out))
        })),
    )?;

    h.fs.add_file(FOO_PATH, b"v2".to_vec());
    h.change(FOO_PATH, ChangeKind::Modify);
    sleep(ms(100)).await;
    h.fs.add_file(FOO_PATH, b"v3".to_vec());
    h.change(FOO_PATH, ChangeKind::Modify);
    sleep(ms(600)).await;

    assert_eq!(h.host.redefine_calls(), 1);
    assert_eq!(h.host.bytes_of(&foo()), Some(b"v3+t".to_vec()));
    assert_eq!(h.listener.reloaded(), vec![foo()]);
    assert!(h.agent.scheduler().is_idle());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unchanged_bytes_are_not_redefined_twice() -> TestResult {
    let h = Harness::new();
    h.fs.add_file(FOO_PATH, b"v2".to_vec());

    h.change(FOO_PATH, ChangeKind::Modify);
    sleep(ms(600)).await;
    h.change(FOO_PATH, ChangeKind::Modify);
    sleep(ms(600)).await;

    assert_eq!(h.host.redefine_calls(), 1);
    assert_eq!(h.listener.reloaded(), vec![foo()]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn locked_file_is_retried_after_the_same_delay() -> TestResult {
    let h = Harness::new();
    h.fs.add_file(FOO_PATH, b"v2".to_vec());
    h.fs.lock_file(FOO_PATH);

    h.change(FOO_PATH, ChangeKind::Modify);
    sleep(ms(600)).await;
    assert_eq!(h.host.redefine_calls(), 0);

    h.fs.unlock(FOO_PATH);
    sleep(ms(500)).await;
    assert_eq!(h.host.bytes_of(&foo()), Some(b"v2".to_vec()));
    assert_eq!(h.listener.reloaded(), vec![foo()]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn vanished_file_is_skipped() -> TestResult {
    let h = Harness::new();
    h.change(FOO_PATH, ChangeKind::Modify);
    sleep(ms(600)).await;

    assert_eq!(h.host.redefine_calls(), 0);
    assert!(h.listener.events().is_empty());
    assert!(h.agent.scheduler().is_idle());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn transformer_fault_redefines_original_bytes() -> TestResult {
    let h = Harness::new();
    h.agent.register_transformer(
        None,
        "Foo",
        Arc::new(from_fn("broken", |_site, _bytes| {
            Err(TransformError::msg("cannot parse"))
        })),
    )?;

    h.agent.reload(foo(), b"v2".to_vec());
    sleep(ms(600)).await;

    assert_eq!(h.host.bytes_of(&foo()), Some(b"v2".to_vec()));
    assert_eq!(h.listener.reloaded(), vec![foo()]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn plugin_hook_fires_after_commit() -> TestResult {
    let h = Harness::new();
    let plugin = Arc::new(ScriptedPlugin::new(
        "cache",
        vec![HookDecl::on_class_load("evict", "Foo$")],
    ));
    let handle: Arc<dyn Hookable> = plugin.clone();
    h.agent.register_hook(handle)?;

    h.agent.reload(foo(), b"v2".to_vec());
    sleep(ms(600)).await;

    assert_eq!(
        plugin.calls(),
        vec![(
            "evict".to_string(),
            HookEvent::UnitDefined {
                unit: foo(),
                phase: Phase::Redefine
            }
        )]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn incompatible_redefinition_keeps_old_bytes_and_skips_listeners() -> TestResult {
    init_tracing();
    let host = Arc::new(InMemoryHost::new().with_shape(|bytes| {
        String::from_utf8_lossy(bytes)
            .split(';')
            .next()
            .unwrap_or_default()
            .to_string()
    }));
    host.load(foo(), b"m1;body".to_vec());
    let agent = Agent::builder(host.clone())
        .options(test_options())
        .filesystem(Arc::new(MockFileSystem::new()))
        .build();
    let listener = Arc::new(RecordingListener::new("recorder"));
    agent.add_listener(listener.clone());

    agent.reload(foo(), b"m1,m2;body".to_vec());
    sleep(ms(600)).await;

    assert_eq!(host.bytes_of(&foo()), Some(b"m1;body".to_vec()));
    assert!(listener.reloaded().is_empty());
    assert!(agent.scheduler().is_idle());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn new_unit_file_is_announced_after_create_delay() -> TestResult {
    let h = Harness::new();
    let bar = "/w/com/acme/Bar.class";
    h.fs.add_file(bar, b"b1".to_vec());

    h.change(bar, ChangeKind::Create);
    sleep(ms(600)).await;
    assert!(h.listener.events().is_empty());

    sleep(ms(500)).await;
    assert_eq!(
        h.listener.events(),
        vec![ListenerEvent::Created(
            UnitId::global("com.acme.Bar"),
            PathBuf::from(bar)
        )]
    );
    assert_eq!(h.host.redefine_calls(), 0);
    assert_eq!(
        h.host.bytes_of(&UnitId::global("com.acme.Bar")),
        Some(b"b1".to_vec())
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn new_unit_runs_define_phase_and_class_load_hooks() -> TestResult {
    let h = Harness::new();
    let plugin = Arc::new(ScriptedPlugin::new(
        "beans",
        vec![HookDecl::on_class_load("register", "Bar$")],
    ));
    let handle: Arc<dyn Hookable> = plugin.clone();
    h.agent.register_hook(handle)?;
    h.agent.register_transformer(
        None,
        "Bar$",
        Arc::new(
            from_fn("seed", |_site, bytes: &[u8]| {
                let mut out = bytes.to_vec();
                out.extend_from_slice(b"+d");
                Ok(Transformed::Rewritten(out))
            })
            .with_phases(Phases::DEFINE_ONLY),
        ),
    )?;

    let bar_path = "/w/com/acme/Bar.class";
    let bar = UnitId::global("com.acme.Bar");
    h.fs.add_file(bar_path, b"b1".to_vec());
    h.change(bar_path, ChangeKind::Create);
    h.change(bar_path, ChangeKind::Create);
    sleep(ms(1100)).await;

    assert_eq!(h.host.bytes_of(&bar), Some(b"b1+d".to_vec()));
    assert_eq!(
        plugin.calls(),
        vec![(
            "register".to_string(),
            HookEvent::UnitDefined {
                unit: bar.clone(),
                phase: Phase::Define
            }
        )]
    );
    assert_eq!(
        h.listener.events(),
        vec![ListenerEvent::Created(bar.clone(), PathBuf::from(bar_path))]
    );

    // Once defined, the next change to the file is a redefinition.
    h.fs.add_file(bar_path, b"b2".to_vec());
    h.change(bar_path, ChangeKind::Modify);
    sleep(ms(600)).await;
    assert_eq!(h.host.bytes_of(&bar), Some(b"b2".to_vec()));
    assert_eq!(h.listener.reloaded(), vec![bar]);
    assert_eq!(plugin.calls().len(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn same_unit_under_two_roots_reads_the_last_written_path() -> TestResult {
    let h = Harness::new();
    let other = Arc::new(WatchRoot::new("/v", None, RootProfile::everything()));
    h.fs.add_file(FOO_PATH, b"from-w".to_vec());
    h.fs.add_file("/v/com/acme/Foo.class", b"from-v".to_vec());

    h.change(FOO_PATH, ChangeKind::Modify);
    sleep(ms(50)).await;
    h.agent.handle_change(&RootedChange {
        root: other,
        event: ChangeEvent::file("/v/com/acme/Foo.class", ChangeKind::Modify),
    });
    sleep(ms(600)).await;

    assert_eq!(h.host.redefine_calls(), 1);
    assert_eq!(h.host.bytes_of(&foo()), Some(b"from-v".to_vec()));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn resource_and_removal_events_reach_listeners() -> TestResult {
    let h = Harness::new();
    h.change("/w/conf/app.properties", ChangeKind::Modify);
    h.change(FOO_PATH, ChangeKind::Delete);
    sleep(ms(600)).await;

    let events = h.listener.events();
    assert_eq!(events.len(), 2);
    assert!(events.contains(&ListenerEvent::Resource(
        PathBuf::from("/w/conf/app.properties"),
        ChangeKind::Modify
    )));
    assert!(events.contains(&ListenerEvent::Removed(PathBuf::from(FOO_PATH), false)));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn injected_task_runs_once() -> TestResult {
    let h = Harness::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    h.agent.inject(
        Command::task("clear-run-result:all", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
        Duration::ZERO,
    );
    sleep(ms(10)).await;

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn dropping_a_scope_removes_its_transformers_and_hooks() -> TestResult {
    let h = Harness::new();
    let web = LoaderScope::new("web");
    h.agent.register_transformer(
        Some(web.clone()),
        "Foo",
        Arc::new(from_fn("noop", |_s, _b| Ok(Transformed::Unchanged))),
    )?;
    h.agent.register_hook(
        ScriptedPlugin::new("beans", vec![HookDecl::on_class_load("refresh", "Foo")])
            .in_scope("web")
            .into_arc(),
    )?;
    assert_eq!(h.agent.registry().len(), 2);

    h.agent.drop_scope(&web);
    assert!(h.agent.registry().is_empty());
    assert!(h.agent.plugins().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn shutdown_drops_pending_reloads() -> TestResult {
    let h = Harness::new();
    h.agent.reload(foo(), b"v2".to_vec());
    h.agent.shutdown();
    sleep(ms(600)).await;

    assert_eq!(h.host.redefine_calls(), 0);
    assert_eq!(h.host.bytes_of(&foo()), Some(b"v1".to_vec()));
    Ok(())
}
