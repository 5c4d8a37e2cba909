//! Cancellable timer tasks
//!
//! A timer registered with the dispatcher hands back a [`TimerHandle`] that
//! stays valid through the timer's whole lifetime, whether or not the body
//! has started executing. The cancel signal is created at registration time,
//! so cancelling an armed-but-not-yet-scheduled timer cannot race scope
//! creation: the body observes the signal before it ever sleeps.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::debug;

use sipdispatch_core::{Result, Scheduler};

use crate::dispatcher::EventDispatcher;

// ----------------------------------------------------------------------------
// Timer State
// ----------------------------------------------------------------------------

/// Lifecycle of one timer
///
/// `Pending → Armed → Running → Completed` on the happy path; any state
/// before `Completed` can transition to `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TimerState {
    /// Registered, not yet started
    Pending = 0,
    /// Started: buffered in the pending list or in the handoff channel
    Armed = 1,
    /// Spawned by the run loop, sleeping toward its deadline
    Running = 2,
    /// Callback fired
    Completed = 3,
    Cancelled = 4,
}

impl TimerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TimerState::Pending,
            1 => TimerState::Armed,
            2 => TimerState::Running,
            3 => TimerState::Completed,
            _ => TimerState::Cancelled,
        }
    }
}

/// When the timer fires: a delay relative to when the body starts sleeping,
/// or an absolute monotonic instant. Absolute deadlines already in the past
/// fire immediately.
#[derive(Debug, Clone, Copy)]
pub enum TimerDeadline {
    Relative(Duration),
    Absolute(Instant),
}

/// One-shot timer body. Errors are not isolated: they propagate into the
/// dispatcher's supervising scope and may cancel sibling work.
pub type TimerCallback = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

// ----------------------------------------------------------------------------
// Timer Task (the schedulable body)
// ----------------------------------------------------------------------------

/// Deferred sleep-then-fire unit of work, moved through the dispatcher's
/// pending buffer and handoff channel until the run loop spawns it.
pub(crate) struct TimerTask {
    pub(crate) id: u64,
    pub(crate) state: Arc<AtomicU8>,
    deadline: TimerDeadline,
    callback: TimerCallback,
    cancel_rx: watch::Receiver<bool>,
}

impl TimerTask {
    /// Sleep until the deadline, then fire the callback, unless cancelled
    /// first. Spawned as an independent child of the dispatcher's scope.
    pub(crate) async fn run(mut self) -> Result<()> {
        // A cancel requested before the loop picked this task up is honored
        // here, before any sleeping happens.
        if *self.cancel_rx.borrow() {
            self.state
                .store(TimerState::Cancelled as u8, Ordering::SeqCst);
            return Ok(());
        }
        self.state
            .store(TimerState::Running as u8, Ordering::SeqCst);

        let deadline = match self.deadline {
            TimerDeadline::Relative(delay) => Instant::now() + delay,
            TimerDeadline::Absolute(at) => at,
        };

        loop {
            tokio::select! {
                _ = sleep_until(deadline) => break,
                changed = self.cancel_rx.changed() => match changed {
                    Ok(()) if *self.cancel_rx.borrow() => {
                        debug!(id = self.id, "timer cancelled before deadline");
                        self.state
                            .store(TimerState::Cancelled as u8, Ordering::SeqCst);
                        return Ok(());
                    }
                    Ok(()) => continue,
                    Err(_) => {
                        // handle dropped, cancellation is no longer possible
                        sleep_until(deadline).await;
                        break;
                    }
                },
            }
        }

        // the deadline and a cancel request can land in the same poll
        if *self.cancel_rx.borrow() {
            self.state
                .store(TimerState::Cancelled as u8, Ordering::SeqCst);
            return Ok(());
        }

        let result = (self.callback)();
        self.state
            .store(TimerState::Completed as u8, Ordering::SeqCst);
        result
    }
}

// ----------------------------------------------------------------------------
// Timer Handle
// ----------------------------------------------------------------------------

/// Stable handle to one scheduled unit of work
///
/// The handle can start and cancel the timer at any point in its lifetime.
/// `cancel()` is total and idempotent: before `start()` it drops the stored
/// body, while the timer is buffered it removes it from the pending list,
/// and once armed or running it fires the cancel signal the body selects on.
pub struct TimerHandle {
    id: u64,
    state: Arc<AtomicU8>,
    cancel_tx: watch::Sender<bool>,
    task: Mutex<Option<TimerTask>>,
    dispatcher: Arc<EventDispatcher>,
}

impl TimerHandle {
    pub(crate) fn new(
        dispatcher: Arc<EventDispatcher>,
        id: u64,
        deadline: TimerDeadline,
        callback: TimerCallback,
    ) -> Self {
        let state = Arc::new(AtomicU8::new(TimerState::Pending as u8));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = TimerTask {
            id,
            state: Arc::clone(&state),
            deadline,
            callback,
            cancel_rx,
        };
        Self {
            id,
            state,
            cancel_tx,
            task: Mutex::new(Some(task)),
            dispatcher,
        }
    }

    /// Unique id assigned by the owning dispatcher
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> TimerState {
        TimerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Ask the owning dispatcher to arm this timer.
    ///
    /// If the run loop is live, the body is pushed onto the handoff channel
    /// without blocking; a full channel surfaces
    /// [`SchedulerError::HandoffFull`](sipdispatch_core::SchedulerError) and
    /// leaves the timer startable again. Before the loop starts, the body is
    /// buffered until the loop drains it.
    pub fn start(&self) -> Result<()> {
        let task = {
            let mut slot = self.task.lock().expect("timer slot poisoned");
            slot.take().ok_or_else(|| {
                sipdispatch_core::DispatchError::Scheduler(
                    sipdispatch_core::SchedulerError::TimerAlreadyStarted,
                )
            })?
        };
        match self.dispatcher.arm_timer(task) {
            Ok(()) => Ok(()),
            Err((task, err)) => {
                // hand the body back so the caller can retry
                *self.task.lock().expect("timer slot poisoned") = Some(task);
                Err(err)
            }
        }
    }

    /// Cancel the timer wherever it currently is.
    ///
    /// Guarantees the callback never fires if the deadline has not been
    /// reached yet. Safe to call repeatedly and from any state.
    pub fn cancel(&self) {
        // not yet started: drop the stored body
        if self.task.lock().expect("timer slot poisoned").take().is_some() {
            self.state
                .store(TimerState::Cancelled as u8, Ordering::SeqCst);
            debug!(id = self.id, "unstarted timer cancelled");
            return;
        }

        // buffered before the loop started: pure pending-list removal
        if !self.dispatcher.is_running() && self.dispatcher.remove_pending(self.id) {
            self.state
                .store(TimerState::Cancelled as u8, Ordering::SeqCst);
            debug!(id = self.id, "pending timer cancelled");
            return;
        }

        // armed or running: fire the signal the body selects on
        let _ = self.cancel_tx.send(true);
        for observed in [TimerState::Pending, TimerState::Armed] {
            if self
                .state
                .compare_exchange(
                    observed as u8,
                    TimerState::Cancelled as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
            {
                break;
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
