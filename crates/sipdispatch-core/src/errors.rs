//! Error types for the sipdispatch scheduling core
//!
//! This module contains all error types used throughout the scheduling core:
//! scheduler errors, transport errors, and the `DispatchError` type that
//! unifies them.

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Scheduler and timer error types
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Timer handoff channel is full (capacity: {capacity})")]
    HandoffFull { capacity: usize },
    #[error("Dispatcher is not running")]
    NotRunning,
    #[error("Dispatcher run loop already started; it is not restartable")]
    AlreadyStarted,
    #[error("Timer was already started")]
    TimerAlreadyStarted,
    #[error("Timer callback failed: {reason}")]
    TimerCallback { reason: String },
    #[error("Supervised task panicked: {reason}")]
    TaskPanicked { reason: String },
}

/// Transport error types
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Network I/O error: {0}")]
    NetworkIo(#[from] std::io::Error),
    #[error("Send failed: outbound queue full (capacity: {capacity})")]
    SendBufferFull { capacity: usize },
    #[error("Outbound queue is closed")]
    QueueClosed,
    #[error("Invalid destination address {host}:{port}: {reason}")]
    InvalidAddress {
        host: String,
        port: u16,
        reason: String,
    },
    #[error("Transport is not running")]
    NotRunning,
    #[error("Data callback failed: {reason}")]
    Callback { reason: String },
}

// ----------------------------------------------------------------------------
// Unified Error Type
// ----------------------------------------------------------------------------

/// Core error type for the scheduling core
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl DispatchError {
    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        DispatchError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a timer callback error with a reason
    pub fn timer_callback<T: Into<String>>(reason: T) -> Self {
        DispatchError::Scheduler(SchedulerError::TimerCallback {
            reason: reason.into(),
        })
    }

    /// Create a data callback error with a reason
    pub fn data_callback<T: Into<String>>(reason: T) -> Self {
        DispatchError::Transport(TransportError::Callback {
            reason: reason.into(),
        })
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = std::result::Result<T, DispatchError>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
