//! Error types for the launcher runtime.

use thiserror::Error;

use crate::process::Pid;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while negotiating ports, tracking processes, or
/// driving the external automation server.
#[derive(Debug, Error)]
pub enum Error {
	/// Every port in the search range is occupied.
	#[error("No free port on {host} in range {start}..={end}")]
	PortExhausted { host: String, start: u16, end: u16 },

	/// The OS process listing could not be invoked.
	#[error("Process listing unavailable: {0}")]
	ProcessQuery(String),

	/// The automation server rejected its arguments or died during start.
	#[error("Automation server failed to start: {0}")]
	ServerStart(String),

	/// The automation server could not be shut down.
	#[error("Automation server failed to stop: {0}")]
	ServerStop(String),

	/// A single termination attempt failed. Teardown logs these and moves on.
	#[error("Failed to terminate process {pid}: {reason}")]
	ProcessTermination { pid: Pid, reason: String },

	/// Timeout waiting for the automation server to become ready.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// User-supplied configuration is inconsistent.
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),

	/// A launch was requested while a session is already active.
	#[error("Driver is busy (state: {state}); kill the current session first")]
	NotIdle { state: String },

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout(_))
	}

	/// Returns true if the automation server never reached readiness.
	pub fn is_start_failure(&self) -> bool {
		matches!(self, Error::ServerStart(_) | Error::Timeout(_))
	}
}
