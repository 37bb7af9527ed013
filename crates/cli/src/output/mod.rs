//! Structured output envelope for all CLI commands.
//!
//! ## Output Contract
//!
//! Every command produces a result envelope on stdout:
//!
//! ```json
//! {
//!   "ok": true,
//!   "command": "launch",
//!   "data": { ... },
//!   "timings": { "durationMs": 1234 }
//! }
//! ```
//!
//! On failure:
//!
//! ```json
//! {
//!   "ok": false,
//!   "command": "launch",
//!   "error": {
//!     "code": "PORT_EXHAUSTED",
//!     "message": "No free port on 127.0.0.1 in range 6100..=6120"
//!   }
//! }
//! ```


use std::io::{self, Write};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Current schema version for command output.
pub const SCHEMA_VERSION: u32 = 1;

/// Output format for CLI results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text
	#[default]
	Text,
	/// JSON output
	Json,
	/// Newline-delimited JSON (streaming)
	Ndjson,
}

/// The main result envelope returned by all commands.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult<T: Serialize> {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub schema_version: Option<u32>,

	/// Whether the command succeeded
	pub ok: bool,

	/// Command name (e.g., "launch", "ports")
	pub command: String,

	/// Command-specific result data (only present on success)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,

	/// Error information (only present on failure)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub timings: Option<Timings>,
}

/// Error information for failed commands
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
	pub code: ErrorCode,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
}

/// Standardized error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	/// No free port in the search window
	PortExhausted,
	/// The process listing could not run
	ProcessQueryFailed,
	/// The automation server did not start
	ServerStartFailed,
	/// The automation server could not be stopped
	ServerStopFailed,
	/// Operation timed out
	Timeout,
	/// A session is already running
	SessionBusy,
	/// Cancelled by Ctrl-C
	Interrupted,
	/// Invalid input provided
	InvalidInput,
	/// File I/O error
	IoError,
	/// Unknown/internal error
	InternalError,
}

impl std::fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ErrorCode::PortExhausted => write!(f, "PORT_EXHAUSTED"),
			ErrorCode::ProcessQueryFailed => write!(f, "PROCESS_QUERY_FAILED"),
			ErrorCode::ServerStartFailed => write!(f, "SERVER_START_FAILED"),
			ErrorCode::ServerStopFailed => write!(f, "SERVER_STOP_FAILED"),
			ErrorCode::Timeout => write!(f, "TIMEOUT"),
			ErrorCode::SessionBusy => write!(f, "SESSION_BUSY"),
			ErrorCode::Interrupted => write!(f, "INTERRUPTED"),
			ErrorCode::InvalidInput => write!(f, "INVALID_INPUT"),
			ErrorCode::IoError => write!(f, "IO_ERROR"),
			ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
		}
	}
}

/// Timing information for the command
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
	pub duration_ms: u64,
}

impl From<Duration> for Timings {
	fn from(duration: Duration) -> Self {
		Timings {
			duration_ms: duration.as_millis() as u64,
		}
	}
}

/// Builder for constructing command results
pub struct ResultBuilder<T: Serialize> {
	command: String,
	data: Option<T>,
	error: Option<CommandError>,
	start_time: Instant,
}

impl<T: Serialize> ResultBuilder<T> {
	pub fn new(command: impl Into<String>) -> Self {
		Self {
			command: command.into(),
			data: None,
			error: None,
			start_time: Instant::now(),
		}
	}

	/// Set the successful result data
	pub fn data(mut self, data: T) -> Self {
		self.data = Some(data);
		self
	}

	/// Set an error
	pub fn error(mut self, code: ErrorCode, message: impl Into<String>) -> Self {
		self.error = Some(CommandError {
			code,
			message: message.into(),
			details: None,
		});
		self
	}

	pub fn build(self) -> CommandResult<T> {
		let ok = self.error.is_none() && self.data.is_some();

		CommandResult {
			schema_version: Some(SCHEMA_VERSION),
			ok,
			command: self.command,
			data: self.data,
			error: self.error,
			timings: Some(Timings::from(self.start_time.elapsed())),
		}
	}
}

/// Print a command result to stdout in the specified format
pub fn print_result<T: Serialize>(result: &CommandResult<T>, format: OutputFormat) {
	match format {
		OutputFormat::Json => {
			if let Ok(json) = serde_json::to_string_pretty(result) {
				println!("{json}");
			}
		}
		OutputFormat::Ndjson => {
			if let Ok(json) = serde_json::to_string(result) {
				println!("{json}");
			}
		}
		OutputFormat::Text => print_result_text(result),
	}
}

fn print_result_text<T: Serialize>(result: &CommandResult<T>) {
	let mut stdout = io::stdout().lock();

	if result.ok {
		if let Some(ref data) = result.data {
			match serde_json::to_value(data) {
				Ok(serde_json::Value::Object(map)) => {
					for (key, value) in map {
						let _ = writeln!(stdout, "{key}: {}", text_value(&value));
					}
				}
				Ok(value) => {
					let _ = writeln!(stdout, "{}", text_value(&value));
				}
				Err(_) => {}
			}
		}
	} else if let Some(ref error) = result.error {
		let _ = writeln!(stdout, "Error [{}]: {}", error.code, error.message);
	}
}

fn text_value(value: &serde_json::Value) -> String {
	match value {
		serde_json::Value::String(s) => s.clone(),
		serde_json::Value::Array(items) => items.iter().map(text_value).collect::<Vec<_>>().join(", "),
		other => other.to_string(),
	}
}

/// Print error to stderr (for humans)
pub fn print_error_stderr(error: &CommandError) {
	eprintln!("Error [{}]: {}", error.code, error.message);
}

/// `launch` result payload.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchData {
	pub host: String,
	pub control_port: u16,
	pub webhook_port: u16,
	pub server: String,
}

/// `launch` teardown payload, printed after Ctrl-C.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeardownData {
	pub stopped_server: bool,
	pub killed: Vec<u32>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub failures: Vec<String>,
}

/// `ports` result payload.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortData {
	pub host: String,
	pub requested: u16,
	pub port: u16,
}

/// `procs` result payload.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessListData {
	pub filter: String,
	pub pids: Vec<u32>,
}
