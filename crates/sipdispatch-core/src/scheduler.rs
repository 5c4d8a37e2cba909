//! Scheduler capability trait
//!
//! Transports are constructed against this trait rather than a concrete
//! dispatcher, so a host process injects one explicit scheduler instance
//! instead of the core reaching for process-wide state.

use crate::transport_task::TransportTask;

/// The scheduler surface a transport needs at construction time
pub trait Scheduler: Send + Sync {
    /// Allocate the next transport id. Ids are unique per scheduler, assigned
    /// once, and never reused.
    fn allocate_transport_id(&self) -> u64;

    /// Append a transport to the not-yet-started list. The scheduler starts
    /// every registered transport as a child task when its run loop begins.
    fn register_transport(&self, transport: Box<dyn TransportTask>);

    /// Whether the scheduler's run loop is live
    fn is_running(&self) -> bool;
}
