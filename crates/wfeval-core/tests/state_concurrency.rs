//! Concurrency properties of a single evaluation state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use wfeval_core::{EvalRecord, EvalState, TraceContext};

fn state(id: &str) -> Arc<EvalState> {
    Arc::new(EvalState::new(id, &TraceContext::none()))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_at_most_one_token_holder() {
    let state = state("wfi-contended");
    let active = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let tasks = (0..32).map(|i| {
        let state = Arc::clone(&state);
        let active = Arc::clone(&active);
        let max_seen = Arc::clone(&max_seen);
        tokio::spawn(async move {
            let guard = state.lock().acquire().await;
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen.fetch_max(now, Ordering::SeqCst);

            tokio::task::yield_now().await;
            state.record(EvalRecord::new().with_cause(format!("worker-{i}")));

            active.fetch_sub(1, Ordering::SeqCst);
            drop(guard);
        })
    });

    for result in join_all(tasks).await {
        result.expect("worker task");
    }

    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    assert_eq!(state.count(), 32);
    assert!(!state.lock().is_held());
}

#[tokio::test]
async fn test_try_acquire_races_only_one_winner() {
    let state = state("wfi-race");
    let guards: Vec<_> = (0..8).filter_map(|_| state.lock().try_acquire()).collect();
    assert_eq!(guards.len(), 1);
}

#[tokio::test]
async fn test_free_on_never_locked_state_does_not_block() {
    let state = state("wfi-free");
    state.free();
    state.free();

    let guard = state.lock().try_acquire().expect("token still available");
    assert!(state.lock().try_acquire().is_none());
    drop(guard);
}

#[tokio::test]
async fn test_explicit_free_releases_detached_token() {
    let state = state("wfi-detached");
    state.lock().try_acquire().expect("acquire").detach();
    assert!(state.lock().try_acquire().is_none());

    state.free();
    state.free();
    assert!(state.lock().try_acquire().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_waiter_can_race_token_against_deadline() {
    let state = state("wfi-deadline");
    let _held = state.lock().try_acquire().expect("acquire");

    let acquired = tokio::select! {
        guard = state.lock().acquire() => Some(guard),
        _ = tokio::time::sleep(Duration::from_millis(100)) => None,
    };
    assert!(acquired.is_none());
}

#[test]
fn test_append_only_log_under_concurrent_writers() {
    let state = state("wfi-log");
    let writers: Vec<_> = (0..4)
        .map(|w| {
            let state = Arc::clone(&state);
            std::thread::spawn(move || {
                for n in 0..50 {
                    state.record(EvalRecord::new().with_cause(format!("{w}:{n}")));
                }
            })
        })
        .collect();

    // Observers read while writers append; counts only ever grow.
    let mut last_count = 0;
    while writers.iter().any(|w| !w.is_finished()) {
        let count = state.count();
        assert!(count >= last_count);
        last_count = count;
    }
    for w in writers {
        w.join().expect("writer thread");
    }

    let logs = state.logs();
    assert_eq!(logs.count(), 200);
    // Per-writer order is preserved.
    for w in 0..4 {
        let prefix = format!("{w}:");
        let seq: Vec<usize> = logs
            .iter()
            .filter_map(|r| r.cause.as_deref())
            .filter_map(|c| c.strip_prefix(prefix.as_str()))
            .map(|n| n.parse().unwrap())
            .collect();
        assert_eq!(seq, (0..50).collect::<Vec<_>>());
    }
}

#[test]
fn test_records_never_move() {
    let state = state("wfi-stable");
    state.record(EvalRecord::new().with_cause("first"));
    let before = state.get(0).unwrap().timestamp;

    for _ in 0..10 {
        state.record(EvalRecord::new().with_cause("later"));
    }

    let first = state.first().unwrap();
    assert_eq!(first.cause.as_deref(), Some("first"));
    assert_eq!(first.timestamp, before);
    assert_eq!(state.count(), 11);
}
