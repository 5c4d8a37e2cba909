//! Event Dispatcher
//!
//! Central scheduler for timers and transports. One dispatcher instance is
//! constructed explicitly by the host process and passed by reference to
//! every timer and transport; there is no process-wide singleton.
//!
//! Before `run()` the dispatcher only buffers: registered timers sit in a
//! pending list, registered transports in a not-yet-started list. `run()`
//! opens the supervising scope, drains the pending timers into the bounded
//! handoff channel, spawns every transport, and then keeps receiving armed
//! timers from the channel, spawning each as an independent child task.
//! `stop()` cancels the scope, which recursively tears down every timer and
//! every transport's own loop pair.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use sipdispatch_core::{
    DispatchError, DispatcherConfig, Result, Scheduler, SchedulerError, TransportTask,
};

use crate::timer::{TimerCallback, TimerDeadline, TimerHandle, TimerState, TimerTask};

// ----------------------------------------------------------------------------
// Event Dispatcher
// ----------------------------------------------------------------------------

/// Cooperative scheduler driving timers and transports on one runtime
pub struct EventDispatcher {
    config: DispatcherConfig,
    running: AtomicBool,
    started: AtomicBool,
    /// Timers armed before the loop went live
    pending: Mutex<Vec<TimerTask>>,
    /// Transports registered but not yet started
    transports: Mutex<Vec<Box<dyn TransportTask>>>,
    /// Producer side of the handoff channel, present only while running
    handoff_tx: Mutex<Option<mpsc::Sender<TimerTask>>>,
    shutdown_tx: watch::Sender<bool>,
    next_timer_id: AtomicU64,
    next_transport_id: AtomicU64,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        // the default configuration always validates
        Self::new(DispatcherConfig::default()).expect("default dispatcher config")
    }
}

impl EventDispatcher {
    /// Create a dispatcher with the given configuration
    pub fn new(config: DispatcherConfig) -> Result<Self> {
        config.validate().map_err(DispatchError::config_error)?;
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            running: AtomicBool::new(false),
            started: AtomicBool::new(false),
            pending: Mutex::new(Vec::new()),
            transports: Mutex::new(Vec::new()),
            handoff_tx: Mutex::new(None),
            shutdown_tx,
            next_timer_id: AtomicU64::new(0),
            next_transport_id: AtomicU64::new(0),
        })
    }

    /// Construct a timer wrapping a sleep-then-fire body. The timer is not
    /// started; call [`TimerHandle::start`] to arm it.
    pub fn register_timer(
        self: &Arc<Self>,
        deadline: TimerDeadline,
        callback: TimerCallback,
    ) -> TimerHandle {
        let id = self.next_timer_id.fetch_add(1, Ordering::SeqCst);
        debug!(id, ?deadline, "timer registered");
        TimerHandle::new(Arc::clone(self), id, deadline, callback)
    }

    /// Arm a timer: push it onto the handoff channel if the loop is running,
    /// otherwise buffer it. Fails fast when the channel is full, handing the
    /// body back to the caller.
    pub(crate) fn arm_timer(
        &self,
        task: TimerTask,
    ) -> std::result::Result<(), (TimerTask, DispatchError)> {
        let state = Arc::clone(&task.state);
        let _ = state.compare_exchange(
            TimerState::Pending as u8,
            TimerState::Armed as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );

        if self.running.load(Ordering::SeqCst) {
            let guard = self.handoff_tx.lock().expect("handoff slot poisoned");
            if let Some(tx) = guard.as_ref() {
                return match tx.try_send(task) {
                    Ok(()) => Ok(()),
                    Err(mpsc::error::TrySendError::Full(task)) => {
                        let _ = state.compare_exchange(
                            TimerState::Armed as u8,
                            TimerState::Pending as u8,
                            Ordering::SeqCst,
                            Ordering::SeqCst,
                        );
                        Err((
                            task,
                            SchedulerError::HandoffFull {
                                capacity: self.config.handoff_buffer_size,
                            }
                            .into(),
                        ))
                    }
                    Err(mpsc::error::TrySendError::Closed(task)) => {
                        Err((task, SchedulerError::NotRunning.into()))
                    }
                };
            }
        }

        self.pending.lock().expect("pending list poisoned").push(task);
        Ok(())
    }

    /// Drop a buffered timer; returns whether it was still in the pending list
    pub(crate) fn remove_pending(&self, id: u64) -> bool {
        let mut pending = self.pending.lock().expect("pending list poisoned");
        let before = pending.len();
        pending.retain(|task| task.id != id);
        pending.len() != before
    }

    /// Run the cooperative loop until `stop()` or a supervised task fails.
    ///
    /// A timer callback or transport returning `Err` cancels every sibling
    /// task and surfaces the error here; callers needing isolation must
    /// handle errors inside their own callback. The loop is not restartable.
    pub async fn run(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyStarted.into());
        }

        let (tx, mut rx) = mpsc::channel(self.config.handoff_buffer_size);
        *self.handoff_tx.lock().expect("handoff slot poisoned") = Some(tx.clone());
        self.running.store(true, Ordering::SeqCst);
        info!("event dispatcher starting");

        let mut scope: JoinSet<Result<()>> = JoinSet::new();

        // drain timers armed before the loop went live
        let buffered: Vec<TimerTask> = {
            let mut pending = self.pending.lock().expect("pending list poisoned");
            pending.drain(..).collect()
        };
        if !buffered.is_empty() {
            debug!(count = buffered.len(), "draining buffered timers");
            let drain_tx = tx.clone();
            scope.spawn(async move {
                for task in buffered {
                    if drain_tx.send(task).await.is_err() {
                        break;
                    }
                }
                Ok(())
            });
        }
        drop(tx);

        // start every registered transport as a child of the scope
        let transports: Vec<Box<dyn TransportTask>> = {
            let mut list = self.transports.lock().expect("transport list poisoned");
            list.drain(..).collect()
        };
        for mut transport in transports {
            debug!(id = transport.transport_id(), "starting transport");
            scope.spawn(async move { transport.run().await });
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let result = loop {
            // a stop() issued before this point is already latched
            if *shutdown_rx.borrow() {
                break Ok(());
            }
            tokio::select! {
                armed = rx.recv() => match armed {
                    Some(task) => {
                        debug!(id = task.id, "spawning timer task");
                        scope.spawn(task.run());
                    }
                    // all producers gone: stop() took the stored sender
                    None => break Ok(()),
                },
                Some(joined) = scope.join_next(), if !scope.is_empty() => match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        error!(error = %err, "supervised task failed, cancelling siblings");
                        break Err(err);
                    }
                    Err(join_err) if join_err.is_cancelled() => {}
                    Err(join_err) => {
                        error!(error = %join_err, "supervised task panicked");
                        break Err(SchedulerError::TaskPanicked {
                            reason: join_err.to_string(),
                        }
                        .into());
                    }
                },
                _ = shutdown_rx.changed() => break Ok(()),
            }
        };

        self.running.store(false, Ordering::SeqCst);
        self.handoff_tx.lock().expect("handoff slot poisoned").take();
        scope.abort_all();
        while scope.join_next().await.is_some() {}
        info!("event dispatcher stopped");
        result
    }

    /// Cancel the supervising scope, tearing down every timer task and every
    /// transport's own loop pair
    pub fn stop(&self) {
        info!("event dispatcher stopping");
        self.running.store(false, Ordering::SeqCst);
        self.handoff_tx.lock().expect("handoff slot poisoned").take();
        // send_replace latches the value even before run() subscribes
        self.shutdown_tx.send_replace(true);
    }
}

// ----------------------------------------------------------------------------
// Scheduler Capability
// ----------------------------------------------------------------------------

impl Scheduler for EventDispatcher {
    fn allocate_transport_id(&self) -> u64 {
        self.next_transport_id.fetch_add(1, Ordering::SeqCst)
    }

    fn register_transport(&self, transport: Box<dyn TransportTask>) {
        debug!(id = transport.transport_id(), "transport registered");
        self.transports
            .lock()
            .expect("transport list poisoned")
            .push(transport);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
