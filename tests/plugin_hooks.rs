mod common;
use crate::common::fakes::ScriptedPlugin;
use crate::common::{init_tracing, TestResult};

use std::path::Path;
use std::sync::Arc;

use hotswap::errors::HotswapError;
use hotswap::listener::NotifierHub;
use hotswap::plugin::{HookBackend, HookDecl, HookEvent, Hookable, PluginManager};
use hotswap::transform::{Phase, Phases, TransformerRegistry};
use hotswap::types::{LoaderScope, UnitId};
use hotswap::watch::ChangeKind;

struct Fixture {
    registry: Arc<TransformerRegistry>,
    hub: Arc<NotifierHub>,
    manager: PluginManager,
}

fn fixture(with_hub: bool) -> Fixture {
    let registry = Arc::new(TransformerRegistry::new());
    let hub = Arc::new(NotifierHub::new());
    let manager = PluginManager::new(
        Arc::clone(&registry),
        with_hub.then(|| Arc::clone(&hub)),
    );
    Fixture {
        registry,
        hub,
        manager,
    }
}

fn shared(plugin: ScriptedPlugin) -> (Arc<ScriptedPlugin>, Arc<dyn Hookable>) {
    let concrete = Arc::new(plugin);
    let dynamic: Arc<dyn Hookable> = concrete.clone();
    (concrete, dynamic)
}

#[test]
fn class_load_hook_fires_only_after_commit() -> TestResult {
    init_tracing();
    let f = fixture(true);
    let (plugin, handle) = shared(ScriptedPlugin::new(
        "cache",
        vec![HookDecl::on_class_load("evict", r"^com\.acme\.")],
    ));

    let bindings = f.manager.bind_hooks(handle)?;
    assert_eq!(bindings.len(), 1);
    assert!(matches!(bindings[0].backend(), HookBackend::Transformer(_)));
    assert_eq!(f.registry.len(), 1);

    let unit = UnitId::global("com.acme.Cart");
    let outcome = f.registry.apply(&unit, Phase::Redefine, b"bytes");
    assert_eq!(outcome.bytes, b"bytes", "hook transformers never rewrite");
    assert!(plugin.calls().is_empty());

    for hook in outcome.deferred {
        hook.fire()?;
    }
    assert_eq!(
        plugin.calls(),
        vec![(
            "evict".to_string(),
            HookEvent::UnitDefined {
                unit,
                phase: Phase::Redefine
            }
        )]
    );
    Ok(())
}

#[test]
fn rebinding_the_same_instance_is_idempotent() -> TestResult {
    let f = fixture(true);
    let (_plugin, handle) = shared(ScriptedPlugin::new(
        "cache",
        vec![
            HookDecl::on_class_load("evict", "Cart"),
            HookDecl::on_class_load("evict", "Cart"),
        ],
    ));

    let first = f.manager.bind_hooks(Arc::clone(&handle))?;
    let second = f.manager.bind_hooks(handle)?;
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(first[0].backend(), second[0].backend());
    assert_eq!(f.manager.len(), 1);
    assert_eq!(f.registry.len(), 1);
    Ok(())
}

#[test]
fn distinct_instances_get_distinct_bindings() -> TestResult {
    let f = fixture(true);
    let decls = vec![HookDecl::on_class_load("evict", "Cart")];
    let (_a, a) = shared(ScriptedPlugin::new("cache", decls.clone()));
    let (_b, b) = shared(ScriptedPlugin::new("cache", decls));

    f.manager.bind_hooks(a)?;
    f.manager.bind_hooks(b)?;
    assert_eq!(f.manager.len(), 2);
    assert_eq!(f.registry.len(), 2);
    Ok(())
}

#[test]
fn field_hook_rejects_the_whole_plugin() {
    let f = fixture(true);
    let (_plugin, handle) = shared(ScriptedPlugin::new(
        "cache",
        vec![
            HookDecl::on_class_load("evict", "Cart"),
            HookDecl::on_class_load("state", "Cart").on_field(),
        ],
    ));

    let err = f.manager.bind_hooks(handle).expect_err("field hook must fail");
    assert!(matches!(err, HotswapError::InvalidHook { ref member, .. } if member == "state"));
    assert!(f.manager.is_empty());
    assert!(f.registry.is_empty(), "no partial registration");
}

#[test]
fn invalid_pattern_rejects_the_whole_plugin() {
    let f = fixture(true);
    let (_plugin, handle) = shared(ScriptedPlugin::new(
        "cache",
        vec![
            HookDecl::on_class_load("evict", "Cart"),
            HookDecl::on_class_load("broken", "[unterminated"),
        ],
    ));

    let err = f.manager.bind_hooks(handle).expect_err("bad regex must fail");
    assert!(matches!(err, HotswapError::InvalidPattern { .. }));
    assert!(f.registry.is_empty());
}

#[test]
fn resource_hook_needs_a_notifier_hub() -> TestResult {
    let decls = vec![HookDecl::on_resource_change("reread", r"\.properties$")];

    let without = fixture(false);
    let (_p, handle) = shared(ScriptedPlugin::new("config", decls.clone()));
    let err = without.manager.bind_hooks(handle).expect_err("no hub");
    assert!(matches!(err, HotswapError::UnsupportedHookPoint { .. }));

    let with = fixture(true);
    let (plugin, handle) = shared(ScriptedPlugin::new("config", decls));
    let bindings = with.manager.bind_hooks(handle)?;
    assert!(matches!(bindings[0].backend(), HookBackend::Listener(_)));
    assert_eq!(with.hub.len(), 1);

    with.hub
        .notify_resource_changed(Path::new("/app/db.properties"), ChangeKind::Modify, None);
    with.hub
        .notify_resource_changed(Path::new("/app/logo.png"), ChangeKind::Modify, None);

    assert_eq!(
        plugin.calls(),
        vec![(
            "reread".to_string(),
            HookEvent::ResourceChanged {
                path: "/app/db.properties".into(),
                kind: ChangeKind::Modify
            }
        )]
    );
    Ok(())
}

#[test]
fn scoped_plugin_only_sees_its_scope() -> TestResult {
    let f = fixture(true);
    let (plugin, handle) = shared(
        ScriptedPlugin::new(
            "beans",
            vec![
                HookDecl::on_class_load("refresh", "Service$"),
                HookDecl::on_resource_change("reload", r"\.xml$"),
            ],
        )
        .in_scope("web"),
    );
    let bindings = f.manager.bind_hooks(handle)?;
    assert!(bindings.iter().all(|b| b.scope() == Some(&LoaderScope::new("web"))));

    let other = f
        .registry
        .apply(&UnitId::scoped("batch", "OrderService"), Phase::Redefine, b"x");
    assert!(other.deferred.is_empty());
    let own = f
        .registry
        .apply(&UnitId::scoped("web", "OrderService"), Phase::Redefine, b"x");
    assert_eq!(own.deferred.len(), 1);

    let web = LoaderScope::new("web");
    let batch = LoaderScope::new("batch");
    f.hub
        .notify_resource_changed(Path::new("/a/beans.xml"), ChangeKind::Modify, Some(&batch));
    f.hub
        .notify_resource_changed(Path::new("/a/beans.xml"), ChangeKind::Modify, Some(&web));
    assert_eq!(plugin.calls().len(), 1);
    Ok(())
}

#[test]
fn phase_restricted_hook() -> TestResult {
    let f = fixture(true);
    let (_plugin, handle) = shared(ScriptedPlugin::new(
        "init",
        vec![HookDecl::on_class_load("seed", "Foo").with_phases(Phases::DEFINE_ONLY)],
    ));
    f.manager.bind_hooks(handle)?;

    let redefine = f.registry.apply(&UnitId::global("Foo"), Phase::Redefine, b"x");
    assert!(redefine.deferred.is_empty());
    let define = f.registry.apply(&UnitId::global("Foo"), Phase::Define, b"x");
    assert_eq!(define.deferred.len(), 1);
    Ok(())
}

#[test]
fn unbind_removes_every_backend() -> TestResult {
    let f = fixture(true);
    let (_plugin, handle) = shared(ScriptedPlugin::new(
        "cache",
        vec![
            HookDecl::on_class_load("evict", "Cart"),
            HookDecl::on_resource_change("reread", "cart"),
        ],
    ));
    f.manager.bind_hooks(Arc::clone(&handle))?;
    assert_eq!(f.registry.len(), 1);
    assert_eq!(f.hub.len(), 1);

    assert_eq!(f.manager.unbind(&handle), 2);
    assert!(f.manager.is_empty());
    assert!(f.registry.is_empty());
    assert!(f.hub.is_empty());
    assert_eq!(f.manager.unbind(&handle), 0);
    Ok(())
}

#[test]
fn unbind_scope_leaves_other_scopes_alone() -> TestResult {
    let f = fixture(true);
    let decls = vec![HookDecl::on_class_load("evict", "Cart")];
    let (_w, web) = shared(ScriptedPlugin::new("cache", decls.clone()).in_scope("web"));
    let (_g, global) = shared(ScriptedPlugin::new("cache", decls));
    f.manager.bind_hooks(web)?;
    f.manager.bind_hooks(global)?;

    assert_eq!(f.manager.unbind_scope(&LoaderScope::new("web")), 1);
    assert_eq!(f.manager.len(), 1);
    assert_eq!(f.registry.len(), 1);
    assert_eq!(f.manager.bindings()[0].scope(), None);
    Ok(())
}

#[test]
fn failing_hook_reports_error_on_fire() -> TestResult {
    let f = fixture(true);
    let (plugin, handle) = shared(
        ScriptedPlugin::new("cache", vec![HookDecl::on_class_load("evict", "Cart")])
            .failing_on("evict"),
    );
    f.manager.bind_hooks(handle)?;

    let outcome = f.registry.apply(&UnitId::global("Cart"), Phase::Redefine, b"x");
    let results: Vec<_> = outcome.deferred.into_iter().map(|h| h.fire()).collect();
    assert_eq!(results.len(), 1);
    assert!(results[0].is_err());
    assert_eq!(plugin.calls().len(), 1);
    Ok(())
}
