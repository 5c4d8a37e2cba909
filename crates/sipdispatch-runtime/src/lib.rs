//! sipdispatch runtime: event dispatcher and cancellable timers
//!
//! The [`EventDispatcher`] is the central scheduler for a host protocol
//! stack: it buffers timers registered before its loop starts, arms them
//! through a bounded handoff channel once the loop is live, and supervises
//! every timer task and registered transport inside one cancellation scope.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sipdispatch_runtime::{EventDispatcher, TimerDeadline};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> sipdispatch_core::Result<()> {
//! let dispatcher = Arc::new(EventDispatcher::default());
//!
//! let timer = dispatcher.register_timer(
//!     TimerDeadline::Relative(Duration::from_millis(50)),
//!     Box::new(|| {
//!         println!("fired");
//!         Ok(())
//!     }),
//! );
//! timer.start()?;
//!
//! let runner = Arc::clone(&dispatcher);
//! let loop_task = tokio::spawn(async move { runner.run().await });
//!
//! tokio::time::sleep(Duration::from_millis(200)).await;
//! dispatcher.stop();
//! loop_task.await.unwrap()?;
//! # Ok(())
//! # }
//! ```

pub mod dispatcher;
pub mod timer;

pub use dispatcher::EventDispatcher;
pub use timer::{TimerCallback, TimerDeadline, TimerHandle, TimerState};
