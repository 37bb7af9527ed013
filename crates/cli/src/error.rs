use std::path::PathBuf;

use thiserror::Error;

use crate::output::{CommandError, ErrorCode};

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("failed to load config {path}: {source}")]
	Config {
		path: PathBuf,
		#[source]
		source: safari_sim::Error,
	},

	#[error("invalid arguments: {0}")]
	InvalidArgs(String),

	#[error("interrupted: {0}")]
	Interrupted(String),

	#[error(transparent)]
	Launcher(#[from] safari_sim::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl CliError {
	/// Convert this error to a CommandError for structured output
	pub fn to_command_error(&self) -> CommandError {
		let (code, details) = match self {
			CliError::Config { path, .. } => (ErrorCode::InvalidInput, Some(serde_json::json!({ "path": path }))),
			CliError::InvalidArgs(_) => (ErrorCode::InvalidInput, None),
			CliError::Interrupted(_) => (ErrorCode::Interrupted, None),
			CliError::Launcher(err) => (launcher_code(err), launcher_details(err)),
			CliError::Io(_) => (ErrorCode::IoError, None),
			CliError::Json(_) => (ErrorCode::InternalError, None),
		};

		CommandError {
			code,
			message: self.to_string(),
			details,
		}
	}
}

fn launcher_code(err: &safari_sim::Error) -> ErrorCode {
	use safari_sim::Error;

	match err {
		Error::PortExhausted { .. } => ErrorCode::PortExhausted,
		Error::ProcessQuery(_) => ErrorCode::ProcessQueryFailed,
		Error::ServerStart(_) => ErrorCode::ServerStartFailed,
		Error::ServerStop(_) => ErrorCode::ServerStopFailed,
		Error::Timeout(_) => ErrorCode::Timeout,
		Error::NotIdle { .. } => ErrorCode::SessionBusy,
		Error::InvalidConfig(_) | Error::Json(_) => ErrorCode::InvalidInput,
		Error::Io(_) => ErrorCode::IoError,
		Error::ProcessTermination { .. } => ErrorCode::InternalError,
	}
}

fn launcher_details(err: &safari_sim::Error) -> Option<serde_json::Value> {
	match err {
		safari_sim::Error::PortExhausted { host, start, end } => Some(serde_json::json!({ "host": host, "start": start, "end": end })),
		_ => None,
	}
}
