//! Centralized Configuration Management
//!
//! This module consolidates the configuration structures used throughout the
//! scheduling core: channel capacities for the dispatcher and transports, and
//! the runtime-backend selector read from the process environment.

use std::fmt;
use std::str::FromStr;

use tracing::warn;

// ----------------------------------------------------------------------------
// Dispatcher Configuration
// ----------------------------------------------------------------------------

/// Configuration for the event dispatcher
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DispatcherConfig {
    /// Capacity of the timer handoff channel (armed timers → run loop).
    /// Producers fail fast when the channel is full.
    pub handoff_buffer_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            handoff_buffer_size: 256,
        }
    }
}

impl DispatcherConfig {
    /// Small buffers, useful for exercising overflow behavior in tests
    pub fn testing() -> Self {
        Self {
            handoff_buffer_size: 8,
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.handoff_buffer_size == 0 {
            return Err("handoff_buffer_size must be greater than zero".to_string());
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// UDP Transport Configuration
// ----------------------------------------------------------------------------

/// Configuration for a UDP transport instance
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UdpTransportConfig {
    /// Capacity of the outbound packet queue. `send_to` fails fast when the
    /// queue is full.
    pub outbound_buffer_size: usize,
}

impl Default for UdpTransportConfig {
    fn default() -> Self {
        Self {
            outbound_buffer_size: 256,
        }
    }
}

impl UdpTransportConfig {
    /// Small buffers, useful for exercising overflow behavior in tests
    pub fn testing() -> Self {
        Self {
            outbound_buffer_size: 8,
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.outbound_buffer_size == 0 {
            return Err("outbound_buffer_size must be greater than zero".to_string());
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Runtime Backend Selection
// ----------------------------------------------------------------------------

/// Environment variable selecting the concurrency backend
pub const BACKEND_ENV_VAR: &str = "SIPDISPATCH_BACKEND";

/// Concurrency backend the host process runs the scheduling core on.
///
/// The core is designed around single-threaded cooperative scheduling, so the
/// default is a current-thread runtime; a multi-thread runtime is available
/// for hosts that want to share the runtime with other workloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeBackend {
    #[default]
    CurrentThread,
    MultiThread,
}

impl RuntimeBackend {
    /// Read the backend selector from the process environment, falling back
    /// to the default for unset or unrecognized values.
    pub fn from_env() -> Self {
        match std::env::var(BACKEND_ENV_VAR) {
            Ok(value) => value.parse().unwrap_or_else(|_| {
                warn!(%value, "unrecognized {} value, using default backend", BACKEND_ENV_VAR);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Build the matching tokio runtime
    pub fn build_runtime(&self) -> std::io::Result<tokio::runtime::Runtime> {
        let mut builder = match self {
            RuntimeBackend::CurrentThread => tokio::runtime::Builder::new_current_thread(),
            RuntimeBackend::MultiThread => tokio::runtime::Builder::new_multi_thread(),
        };
        builder.enable_all().build()
    }
}

impl FromStr for RuntimeBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "current-thread" => Ok(RuntimeBackend::CurrentThread),
            "multi-thread" => Ok(RuntimeBackend::MultiThread),
            other => Err(format!("unknown runtime backend: {other}")),
        }
    }
}

impl fmt::Display for RuntimeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeBackend::CurrentThread => write!(f, "current-thread"),
            RuntimeBackend::MultiThread => write!(f, "multi-thread"),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
