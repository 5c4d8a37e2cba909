//! Core types for the sipdispatch scheduling core
//!
//! This crate holds everything shared between the runtime (dispatcher and
//! timers) and the transport implementations: the error taxonomy,
//! configuration structures, the monotonic-clock abstraction, packet and
//! address-normalization types, and the `{Scheduler, TransportTask}`
//! capability traits that a host protocol stack is wired against.
//!
//! Concrete implementations live in their own crates:
//! - `EventDispatcher` and timer handles in `sipdispatch-runtime`
//! - `UdpTransport` in `sipdispatch-udp`

pub mod clock;
pub mod config;
pub mod errors;
pub mod packet;
pub mod scheduler;
pub mod transport_task;

pub use clock::{MonotonicClock, SystemClock};
pub use config::{DispatcherConfig, RuntimeBackend, UdpTransportConfig, BACKEND_ENV_VAR};
pub use errors::{DispatchError, Result, SchedulerError, TransportError};
pub use packet::{destination_addr, source_addr, AddressFamily, Payload, SourceAddr};
pub use scheduler::Scheduler;
pub use transport_task::TransportTask;
