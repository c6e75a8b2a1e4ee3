mod common;
use crate::common::fakes::RecordingExecutor;
use crate::common::{init_tracing, ms, TestResult};

use std::path::PathBuf;
use std::sync::Arc;

use tokio::time::{sleep, Instant};

use hotswap::command::{Command, MergeKey, ScheduleOutcome, Scheduler, SchedulerOptions, UnitSource};
use hotswap::types::UnitId;

fn foo_reload() -> Command {
    Command::redefine(
        UnitId::global("a.Foo"),
        UnitSource::File(PathBuf::from("/a/Foo.class")),
    )
}

fn scheduler_with(exec: &Arc<RecordingExecutor>, options: SchedulerOptions) -> Scheduler {
    Scheduler::new(exec.clone(), options)
}

#[tokio::test(start_paused = true)]
async fn two_modifies_within_window_execute_once_at_first_deadline() -> TestResult {
    init_tracing();
    let exec = Arc::new(RecordingExecutor::new());
    let scheduler = scheduler_with(&exec, SchedulerOptions::default());
    let start = Instant::now();

    let first = scheduler.schedule(foo_reload(), ms(500));
    sleep(ms(50)).await;
    let second = scheduler.schedule(foo_reload(), ms(500));

    let (ScheduleOutcome::Queued { deadline: d1 }, ScheduleOutcome::Merged { deadline: d2 }) =
        (first, second)
    else {
        panic!("expected Queued then Merged, got {first:?} / {second:?}");
    };
    assert_eq!(d1, d2, "merging must not reset the timer");
    assert_eq!(scheduler.pending_len(), 1);
    let key = MergeKey::Unit(UnitId::global("a.Foo"));
    assert_eq!(scheduler.deadline_of(&key), Some(start + ms(500)));

    sleep(ms(600)).await;

    let executed = exec.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].actions.len(), 2);
    assert_eq!(executed[0].at.duration_since(start), ms(500));
    assert!(scheduler.is_idle());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn sustained_burst_does_not_postpone_execution() -> TestResult {
    let exec = Arc::new(RecordingExecutor::new());
    let scheduler = scheduler_with(&exec, SchedulerOptions::default());
    let start = Instant::now();

    // One event every 100ms for 1.2s, each with a 500ms window.
    for _ in 0..12 {
        scheduler.schedule(foo_reload(), ms(500));
        sleep(ms(100)).await;
    }
    sleep(ms(600)).await;

    let executed = exec.executed();
    assert!(executed.len() >= 2);
    assert_eq!(executed[0].at.duration_since(start), ms(500));
    let total: usize = executed.iter().map(|e| e.actions.len()).sum();
    assert_eq!(total, 12, "every event is executed exactly once");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancel_removes_pending_command() -> TestResult {
    let exec = Arc::new(RecordingExecutor::new());
    let scheduler = scheduler_with(&exec, SchedulerOptions::default());
    let key = MergeKey::Unit(UnitId::global("a.Foo"));

    scheduler.schedule(foo_reload(), ms(500));
    assert!(scheduler.is_pending(&key));
    assert!(scheduler.cancel(&key));
    assert!(!scheduler.cancel(&key));

    sleep(ms(1000)).await;
    assert_eq!(exec.count(), 0);
    assert!(scheduler.is_idle());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancel_after_dequeue_is_refused() -> TestResult {
    let exec = Arc::new(RecordingExecutor::with_latency(ms(1000)));
    let scheduler = scheduler_with(&exec, SchedulerOptions::default());
    let key = MergeKey::Unit(UnitId::global("a.Foo"));

    scheduler.schedule(foo_reload(), ms(100));
    sleep(ms(200)).await;

    assert_eq!(scheduler.in_flight(), 1);
    assert!(!scheduler.cancel(&key));

    sleep(ms(1000)).await;
    assert_eq!(exec.count(), 1);
    assert!(scheduler.is_idle());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn different_keys_fire_independently() -> TestResult {
    let exec = Arc::new(RecordingExecutor::new());
    let scheduler = scheduler_with(&exec, SchedulerOptions::default());
    let start = Instant::now();

    scheduler.schedule(foo_reload(), ms(500));
    scheduler.schedule(
        Command::redefine(UnitId::global("a.Bar"), UnitSource::File("/a/Bar.class".into())),
        ms(100),
    );
    let mut keys = scheduler.pending_keys();
    keys.sort_by_key(|k| k.to_string());
    assert_eq!(
        keys,
        vec![
            MergeKey::Unit(UnitId::global("a.Bar")),
            MergeKey::Unit(UnitId::global("a.Foo")),
        ]
    );
    assert_eq!(
        scheduler.deadline_of(&MergeKey::Unit(UnitId::global("a.Bar"))),
        Some(start + ms(100))
    );
    sleep(ms(1000)).await;

    let executed = exec.executed();
    assert_eq!(executed.len(), 2);
    assert_eq!(executed[0].key, MergeKey::Unit(UnitId::global("a.Bar")));
    assert_eq!(executed[0].at.duration_since(start), ms(100));
    assert_eq!(executed[1].key, MergeKey::Unit(UnitId::global("a.Foo")));
    assert_eq!(executed[1].at.duration_since(start), ms(500));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn slow_command_does_not_delay_other_keys() -> TestResult {
    let exec = Arc::new(RecordingExecutor::with_latency(ms(1000)));
    let scheduler = scheduler_with(&exec, SchedulerOptions::default());
    let start = Instant::now();

    scheduler.schedule(Command::task("a", || Ok(())), ms(100));
    scheduler.schedule(Command::task("b", || Ok(())), ms(200));
    sleep(ms(2000)).await;

    let executed = exec.executed();
    assert_eq!(executed.len(), 2);
    assert_eq!(executed[0].at.duration_since(start), ms(1100));
    assert_eq!(executed[1].at.duration_since(start), ms(1200));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn transient_failure_is_rescheduled_with_same_delay() -> TestResult {
    let exec = Arc::new(RecordingExecutor::failing_transiently(2));
    let scheduler = scheduler_with(
        &exec,
        SchedulerOptions {
            max_workers: 2,
            transient_retries: 5,
        },
    );
    let start = Instant::now();

    scheduler.schedule(foo_reload(), ms(500));
    sleep(ms(2000)).await;

    let executed = exec.executed();
    let attempts: Vec<u32> = executed.iter().map(|e| e.attempt).collect();
    assert_eq!(attempts, vec![0, 1, 2]);
    let times: Vec<_> = executed.iter().map(|e| e.at.duration_since(start)).collect();
    assert_eq!(times, vec![ms(500), ms(1000), ms(1500)]);
    assert!(scheduler.is_idle());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn transient_retries_are_bounded() -> TestResult {
    let exec = Arc::new(RecordingExecutor::failing_transiently(100));
    let scheduler = scheduler_with(
        &exec,
        SchedulerOptions {
            max_workers: 1,
            transient_retries: 2,
        },
    );

    scheduler.schedule(foo_reload(), ms(100));
    sleep(ms(5000)).await;

    assert_eq!(exec.count(), 3);
    assert!(scheduler.is_idle());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn shutdown_drops_pending_and_rejects_new_commands() -> TestResult {
    let exec = Arc::new(RecordingExecutor::new());
    let scheduler = scheduler_with(&exec, SchedulerOptions::default());

    scheduler.schedule(foo_reload(), ms(500));
    scheduler.schedule(Command::task("t", || Ok(())), ms(500));
    assert_eq!(scheduler.shutdown(), 2);
    assert_eq!(
        scheduler.schedule(foo_reload(), ms(500)),
        ScheduleOutcome::Rejected
    );

    sleep(ms(1000)).await;
    assert_eq!(exec.count(), 0);
    Ok(())
}

#[test]
fn merge_appends_actions_in_arrival_order() {
    let a = Command::redefine(UnitId::global("x.A"), UnitSource::Bytes(Arc::from(&b"1"[..])));
    let b = Command::redefine(UnitId::global("x.A"), UnitSource::Bytes(Arc::from(&b"2"[..])));
    let c = Command::redefine(UnitId::global("x.A"), UnitSource::Bytes(Arc::from(&b"3"[..])));

    let merged = a.merge(b.merge(c));
    assert_eq!(merged.len(), 3);

    let sources: Vec<Vec<u8>> = merged
        .actions()
        .map(|action| match action {
            hotswap::command::Action::Redefine {
                source: UnitSource::Bytes(bytes),
                ..
            } => bytes.to_vec(),
            other => panic!("unexpected action {other:?}"),
        })
        .collect();
    assert_eq!(sources, vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]);
}
