mod common;
use crate::common::builders::test_options;
use crate::common::fakes::FakeHost;
use crate::common::ms;

use std::path::PathBuf;

use hotswap::command::{Action, MergeKey, UnitSource};
use hotswap::engine::EventRouter;
use hotswap::types::{LoaderScope, UnitId, UnloadedPolicy};
use hotswap::watch::{ChangeEvent, ChangeKind, RootProfile, WatchRoot};

fn root() -> WatchRoot {
    WatchRoot::new("/w", Some(LoaderScope::new("app")), RootProfile::everything())
}

fn foo() -> UnitId {
    UnitId::scoped("app", "com.acme.Foo")
}

fn router() -> EventRouter {
    EventRouter::new(&test_options())
}

#[test]
fn unit_identity_comes_from_relative_path_and_root_scope() {
    let r = router();
    let event = ChangeEvent::file("/w/com/acme/Foo.class", ChangeKind::Modify);
    assert_eq!(r.unit_of(&root(), &event), Some(foo()));

    let resource = ChangeEvent::file("/w/com/acme/app.properties", ChangeKind::Modify);
    assert_eq!(r.unit_of(&root(), &resource), None);

    let outside = ChangeEvent::file("/elsewhere/Foo.class", ChangeKind::Modify);
    assert_eq!(r.unit_of(&root(), &outside), None);
}

#[test]
fn modify_of_loaded_unit_schedules_debounced_redefine() {
    let host = FakeHost::with_loaded([foo()]);
    let event = ChangeEvent::file("/w/com/acme/Foo.class", ChangeKind::Modify);

    let routed = router().route(&root(), &event, &host).expect("routed");
    assert_eq!(routed.delay, ms(500));
    assert_eq!(routed.command.key(), &MergeKey::Unit(foo()));
    match routed.command.primary() {
        Action::Redefine { unit, source } => {
            assert_eq!(unit, &foo());
            assert_eq!(source, &UnitSource::File(PathBuf::from("/w/com/acme/Foo.class")));
        }
        other => panic!("unexpected action {other:?}"),
    }
}

#[test]
fn create_of_loaded_unit_is_a_redefine_too() {
    // Editors that save by delete-then-create report CREATE for a live unit.
    let host = FakeHost::with_loaded([foo()]);
    let event = ChangeEvent::file("/w/com/acme/Foo.class", ChangeKind::Create);

    let routed = router().route(&root(), &event, &host).expect("routed");
    assert!(matches!(routed.command.primary(), Action::Redefine { .. }));
    assert_eq!(routed.delay, ms(500));
}

#[test]
fn create_of_unloaded_unit_uses_create_delay() {
    let host = FakeHost::new();
    let event = ChangeEvent::file("/w/com/acme/Foo.class", ChangeKind::Create);

    let routed = router().route(&root(), &event, &host).expect("routed");
    assert_eq!(routed.delay, ms(1000));
    assert_eq!(routed.command.key(), &MergeKey::Unit(foo()));
    assert!(matches!(
        routed.command.primary(),
        Action::UnitCreated { unit, .. } if *unit == foo()
    ));
}

#[test]
fn modify_of_unloaded_unit_follows_policy() {
    let host = FakeHost::new();
    let event = ChangeEvent::file("/w/com/acme/Foo.class", ChangeKind::Modify);

    assert!(router().route(&root(), &event, &host).is_none());

    let mut options = test_options();
    options.unloaded_policy = UnloadedPolicy::Notify;
    let routed = EventRouter::new(&options)
        .route(&root(), &event, &host)
        .expect("notify policy routes");
    assert!(matches!(routed.command.primary(), Action::UnitCreated { .. }));
    assert_eq!(routed.delay, ms(1000));
}

#[test]
fn delete_of_unit_is_a_removal_keyed_by_path() {
    let host = FakeHost::with_loaded([foo()]);
    let event = ChangeEvent::file("/w/com/acme/Foo.class", ChangeKind::Delete);

    let routed = router().route(&root(), &event, &host).expect("routed");
    assert_eq!(
        routed.command.key(),
        &MergeKey::Path(PathBuf::from("/w/com/acme/Foo.class"))
    );
    assert!(matches!(
        routed.command.primary(),
        Action::UnitRemoved { is_directory: false, scope: Some(s), .. } if s.as_str() == "app"
    ));
}

#[test]
fn directory_delete_is_a_directory_removal() {
    let host = FakeHost::new();
    let event = ChangeEvent::directory("/w/com/acme", ChangeKind::Delete);

    let routed = router().route(&root(), &event, &host).expect("routed");
    assert_eq!(routed.delay, ms(500));
    assert!(matches!(
        routed.command.primary(),
        Action::UnitRemoved { is_directory: true, .. }
    ));
}

#[test]
fn other_directory_events_are_dropped() {
    let host = FakeHost::new();
    for kind in [ChangeKind::Create, ChangeKind::Modify] {
        let event = ChangeEvent::directory("/w/com/acme/sub", kind);
        assert!(router().route(&root(), &event, &host).is_none());
    }
}

#[test]
fn non_unit_files_are_resource_changes() {
    let host = FakeHost::new();
    for kind in [ChangeKind::Create, ChangeKind::Modify, ChangeKind::Delete] {
        let event = ChangeEvent::file("/w/conf/app.properties", kind);
        let routed = router().route(&root(), &event, &host).expect("routed");
        assert_eq!(
            routed.command.key(),
            &MergeKey::Path(PathBuf::from("/w/conf/app.properties"))
        );
        assert!(matches!(
            routed.command.primary(),
            Action::ResourceChanged { kind: k, .. } if *k == kind
        ));
    }
}

#[test]
fn unit_in_global_root_has_no_scope() {
    let global = WatchRoot::new("/g", None, RootProfile::everything());
    let host = FakeHost::with_loaded([UnitId::global("Main")]);
    let event = ChangeEvent::file("/g/Main.class", ChangeKind::Modify);

    let routed = router().route(&global, &event, &host).expect("routed");
    assert_eq!(routed.command.key(), &MergeKey::Unit(UnitId::global("Main")));
}
