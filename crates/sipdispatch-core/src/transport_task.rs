//! Transport Task Trait Definition
//!
//! Defines the common interface for transport tasks supervised by the event
//! dispatcher. Concrete implementations live in their own crates
//! (`UdpTransport` in `sipdispatch-udp`).

use crate::errors::Result;

// ----------------------------------------------------------------------------
// Transport Task Trait
// ----------------------------------------------------------------------------

/// Common interface for transport tasks
///
/// A transport task owns one network endpoint and runs as a child of the
/// dispatcher's supervising scope:
///
/// - `run()` is spawned once by the dispatcher when its loop starts and
///   should drive the transport's own receive/drain loop pair until shutdown.
/// - Cancelling the dispatcher's scope cancels the transport; a transport's
///   own shutdown tears down only its own loops.
/// - Returning `Err` from `run()` propagates into the dispatcher's scope and
///   may cancel sibling tasks.
#[async_trait::async_trait]
pub trait TransportTask: Send + Sync {
    /// Run the transport's main event loop until shutdown
    async fn run(&mut self) -> Result<()>;

    /// Unique id assigned at construction by the owning scheduler
    fn transport_id(&self) -> u64;
}
