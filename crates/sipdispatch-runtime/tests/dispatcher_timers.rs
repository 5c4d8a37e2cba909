//! Integration tests for the event dispatcher and timer lifecycle

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{timeout, Instant};
use tokio_test::assert_ok;

use sipdispatch_core::{DispatchError, DispatcherConfig, SchedulerError};
use sipdispatch_runtime::{EventDispatcher, TimerDeadline, TimerState};

fn spawn_loop(
    dispatcher: &Arc<EventDispatcher>,
) -> tokio::task::JoinHandle<sipdispatch_core::Result<()>> {
    let runner = Arc::clone(dispatcher);
    tokio::spawn(async move { runner.run().await })
}

#[tokio::test(start_paused = true)]
async fn timer_registered_before_loop_fires_exactly_once() {
    let dispatcher = Arc::new(EventDispatcher::default());
    let fired: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&fired);
    let handle = dispatcher.register_timer(
        TimerDeadline::Relative(Duration::from_millis(50)),
        Box::new(move || {
            sink.lock().unwrap().push("tick");
            Ok(())
        }),
    );
    handle.start().unwrap();

    let loop_task = spawn_loop(&dispatcher);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(fired.lock().unwrap().len(), 1);
    assert_eq!(handle.state(), TimerState::Completed);

    dispatcher.stop();
    assert_ok!(loop_task.await.unwrap());
}

#[tokio::test]
async fn stop_before_run_is_latched() {
    let dispatcher = Arc::new(EventDispatcher::default());
    dispatcher.stop();

    // the loop observes the latched signal immediately instead of hanging
    let result = timeout(Duration::from_secs(1), dispatcher.run())
        .await
        .expect("run returned promptly after a pre-run stop");
    assert_ok!(result);
}

#[tokio::test(start_paused = true)]
async fn relative_timer_never_fires_early() {
    let dispatcher = Arc::new(EventDispatcher::default());
    let fired_at: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));

    let registered_at = Instant::now();
    let sink = Arc::clone(&fired_at);
    let handle = dispatcher.register_timer(
        TimerDeadline::Relative(Duration::from_millis(100)),
        Box::new(move || {
            *sink.lock().unwrap() = Some(Instant::now());
            Ok(())
        }),
    );
    handle.start().unwrap();

    let loop_task = spawn_loop(&dispatcher);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let fired_at = fired_at.lock().unwrap().expect("timer fired");
    assert!(fired_at - registered_at >= Duration::from_millis(100));

    dispatcher.stop();
    assert_ok!(loop_task.await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn absolute_timer_sleeps_until_instant() {
    let dispatcher = Arc::new(EventDispatcher::default());
    let count = Arc::new(AtomicU32::new(0));

    let deadline = Instant::now() + Duration::from_millis(80);
    let sink = Arc::clone(&count);
    let handle = dispatcher.register_timer(
        TimerDeadline::Absolute(deadline),
        Box::new(move || {
            sink.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );
    handle.start().unwrap();

    let loop_task = spawn_loop(&dispatcher);
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(count.load(Ordering::SeqCst), 0);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    dispatcher.stop();
    assert_ok!(loop_task.await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn absolute_timer_in_the_past_fires_immediately() {
    let dispatcher = Arc::new(EventDispatcher::default());
    let count = Arc::new(AtomicU32::new(0));

    let loop_task = spawn_loop(&dispatcher);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sink = Arc::clone(&count);
    let handle = dispatcher.register_timer(
        TimerDeadline::Absolute(Instant::now() - Duration::from_millis(20)),
        Box::new(move || {
            sink.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );
    handle.start().unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    dispatcher.stop();
    assert_ok!(loop_task.await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn cancelling_buffered_timer_prevents_firing() {
    let dispatcher = Arc::new(EventDispatcher::default());
    let count = Arc::new(AtomicU32::new(0));

    let sink = Arc::clone(&count);
    let handle = dispatcher.register_timer(
        TimerDeadline::Relative(Duration::from_millis(10)),
        Box::new(move || {
            sink.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );
    handle.start().unwrap();
    assert_eq!(handle.state(), TimerState::Armed);

    // still a pure buffer removal, the loop has not started
    handle.cancel();
    assert_eq!(handle.state(), TimerState::Cancelled);

    let loop_task = spawn_loop(&dispatcher);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(count.load(Ordering::SeqCst), 0);

    dispatcher.stop();
    assert_ok!(loop_task.await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn cancelling_running_timer_before_deadline_prevents_firing() {
    let dispatcher = Arc::new(EventDispatcher::default());
    let count = Arc::new(AtomicU32::new(0));

    let loop_task = spawn_loop(&dispatcher);
    tokio::task::yield_now().await;

    let sink = Arc::clone(&count);
    let handle = dispatcher.register_timer(
        TimerDeadline::Relative(Duration::from_millis(100)),
        Box::new(move || {
            sink.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );
    handle.start().unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(handle.state(), TimerState::Running);
    handle.cancel();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(handle.state(), TimerState::Cancelled);

    dispatcher.stop();
    assert_ok!(loop_task.await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn timer_error_cancels_siblings_and_surfaces_from_run() {
    let dispatcher = Arc::new(EventDispatcher::default());

    let failing = dispatcher.register_timer(
        TimerDeadline::Relative(Duration::from_millis(10)),
        Box::new(|| Err(DispatchError::timer_callback("deliberate failure"))),
    );
    let sibling = dispatcher.register_timer(
        TimerDeadline::Relative(Duration::from_secs(60)),
        Box::new(|| Ok(())),
    );
    failing.start().unwrap();
    sibling.start().unwrap();

    let loop_task = spawn_loop(&dispatcher);
    let result = loop_task.await.unwrap();

    assert!(matches!(
        result,
        Err(DispatchError::Scheduler(SchedulerError::TimerCallback { .. }))
    ));
    // the sibling was torn down mid-sleep, it never completed
    assert_ne!(sibling.state(), TimerState::Completed);
}

#[tokio::test]
async fn handoff_overflow_fails_fast_and_leaves_timer_startable() {
    let dispatcher =
        Arc::new(EventDispatcher::new(DispatcherConfig::testing()).unwrap());
    let capacity = DispatcherConfig::testing().handoff_buffer_size;

    let loop_task = spawn_loop(&dispatcher);
    tokio::task::yield_now().await;
    assert!(sipdispatch_core::Scheduler::is_running(dispatcher.as_ref()));

    // fill the handoff channel without yielding, so the loop cannot drain it
    let mut handles = Vec::new();
    for _ in 0..capacity {
        let handle = dispatcher.register_timer(
            TimerDeadline::Relative(Duration::from_secs(60)),
            Box::new(|| Ok(())),
        );
        handle.start().unwrap();
        handles.push(handle);
    }

    let overflow = dispatcher.register_timer(
        TimerDeadline::Relative(Duration::from_secs(60)),
        Box::new(|| Ok(())),
    );
    let err = overflow.start().unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Scheduler(SchedulerError::HandoffFull { capacity: c }) if c == capacity
    ));

    // the body was handed back: once the loop drains, starting succeeds
    tokio::task::yield_now().await;
    overflow.start().unwrap();

    dispatcher.stop();
    assert_ok!(loop_task.await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn stop_tears_down_running_timers() {
    let dispatcher = Arc::new(EventDispatcher::default());
    let count = Arc::new(AtomicU32::new(0));

    let sink = Arc::clone(&count);
    let handle = dispatcher.register_timer(
        TimerDeadline::Relative(Duration::from_secs(60)),
        Box::new(move || {
            sink.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );
    handle.start().unwrap();

    let loop_task = spawn_loop(&dispatcher);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(handle.state(), TimerState::Running);

    dispatcher.stop();
    assert_ok!(loop_task.await.unwrap());
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_ne!(handle.state(), TimerState::Completed);
}
