//! Launch command.
//!
//! Starts the automation server, prints the negotiated ports, and holds the
//! session open until Ctrl-C. Teardown then stops the server and reaps any
//! simulator processes the session created.
//!
//! # Examples
//!
//! ```bash
//! safari-sim launch                                  # defaults: 4723 / 9003
//! safari-sim launch --port-range 6100 6120 --device tablet
//! safari-sim launch --config launcher.json --ready-timeout-ms 60000
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, ValueEnum};
use safari_sim::{DevicePreset, LauncherOverrides, Orientation, ProcessServer, ServerOverrides, SimulatorDriver, StaticHostConfig, TracingSink};
use tracing::{info, warn};

use crate::error::{CliError, Result};
use crate::output::{LaunchData, OutputFormat, ResultBuilder, TeardownData, print_result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DeviceArg {
	Phone,
	Tablet,
}

impl From<DeviceArg> for DevicePreset {
	fn from(device: DeviceArg) -> Self {
		match device {
			DeviceArg::Phone => DevicePreset::Phone,
			DeviceArg::Tablet => DevicePreset::Tablet,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OrientationArg {
	Portrait,
	Landscape,
}

impl From<OrientationArg> for Orientation {
	fn from(orientation: OrientationArg) -> Self {
		match orientation {
			OrientationArg::Portrait => Orientation::Portrait,
			OrientationArg::Landscape => Orientation::Landscape,
		}
	}
}

#[derive(Debug, Clone, Default, Args)]
pub struct LaunchArgs {
	/// JSON file with launcher overrides; flags given here take precedence
	#[arg(long, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Preferred control port (searches up to 90 ports above it)
	#[arg(short, long)]
	pub port: Option<u16>,

	/// Explicit control port search window
	#[arg(long, num_args = 2, value_names = ["LO", "HI"])]
	pub port_range: Option<Vec<u16>>,

	/// Preferred webhook port
	#[arg(long)]
	pub webhook_port: Option<u16>,

	/// Explicit webhook port search window
	#[arg(long, num_args = 2, value_names = ["LO", "HI"])]
	pub webhook_port_range: Option<Vec<u16>>,

	/// Interface the automation server binds to
	#[arg(long)]
	pub host: Option<String>,

	/// Device preset; detected from --browser names when omitted
	#[arg(long, value_enum)]
	pub device: Option<DeviceArg>,

	/// Browser names requested by the test run (repeatable)
	#[arg(long = "browser", value_name = "NAME")]
	pub browsers: Vec<String>,

	/// Process name used to find simulator processes
	#[arg(long, value_name = "NAME")]
	pub process_filter: Option<String>,

	/// Automation server executable
	#[arg(long, value_name = "CMD")]
	pub server_cmd: Option<String>,

	/// Extra argument passed to the server before the generated flags (repeatable)
	#[arg(long = "server-arg", value_name = "ARG", allow_hyphen_values = true)]
	pub server_args: Vec<String>,

	/// Give up if the server is not ready in time (default: wait indefinitely)
	#[arg(long, value_name = "MS")]
	pub ready_timeout_ms: Option<u64>,

	/// Delay between stopping the server and reaping simulators
	#[arg(long, value_name = "MS")]
	pub settle_delay_ms: Option<u64>,

	/// Ask the server to keep its own logging quiet
	#[arg(long)]
	pub quiet: bool,

	/// Keep app state between sessions
	#[arg(long)]
	pub no_reset: bool,

	/// Reset the simulator completely after the session
	#[arg(long)]
	pub full_reset: bool,

	#[arg(long, value_enum)]
	pub orientation: Option<OrientationArg>,
}

impl LaunchArgs {
	/// Overrides expressed by flags alone.
	pub fn to_overrides(&self) -> Result<LauncherOverrides> {
		Ok(LauncherOverrides {
			device: self.device.map(Into::into),
			port: self.port,
			port_range: port_pair(self.port_range.as_deref(), "--port-range")?,
			webhook_port: self.webhook_port,
			webhook_port_range: port_pair(self.webhook_port_range.as_deref(), "--webhook-port-range")?,
			host: self.host.clone(),
			process_filter: self.process_filter.clone(),
			settle_delay_ms: self.settle_delay_ms,
			ready_timeout_ms: self.ready_timeout_ms,
			quiet: self.quiet.then_some(true),
			no_reset: self.no_reset.then_some(true),
			full_reset: self.full_reset.then_some(true),
			orientation: self.orientation.map(Into::into),
			server: self.server_overrides(),
			..Default::default()
		})
	}

	/// File overrides with flags layered on top.
	pub fn resolve_overrides(&self) -> Result<LauncherOverrides> {
		let flags = self.to_overrides()?;
		let Some(path) = &self.config else {
			return Ok(flags);
		};
		let file = LauncherOverrides::load(path).map_err(|source| CliError::Config { path: path.clone(), source })?;
		Ok(file.merge(flags))
	}

	fn server_overrides(&self) -> Option<ServerOverrides> {
		if self.server_cmd.is_none() && self.server_args.is_empty() {
			return None;
		}
		Some(ServerOverrides {
			command: self.server_cmd.clone(),
			args: self.server_args.clone(),
		})
	}
}

fn port_pair(values: Option<&[u16]>, flag: &str) -> Result<Option<[u16; 2]>> {
	match values {
		None => Ok(None),
		Some([lo, hi]) => Ok(Some([*lo, *hi])),
		Some(other) => Err(CliError::InvalidArgs(format!("{flag} takes two ports, got {}", other.len()))),
	}
}

pub async fn execute(args: LaunchArgs, format: OutputFormat) -> Result<()> {
	let overrides = args.resolve_overrides()?;
	let server = ProcessServer::from_overrides(overrides.server.as_ref());
	let program = server.program().to_string();
	let host_config = StaticHostConfig::new(args.browsers.iter().cloned());
	let mut driver = SimulatorDriver::new(Arc::new(server));

	info!(server = %program, "launching automation server");
	tokio::select! {
		launched = driver.launch(&overrides, Arc::new(TracingSink), &host_config) => launched?,
		signal = tokio::signal::ctrl_c() => {
			signal?;
			warn!("interrupted before the automation server was ready");
			return Err(CliError::Interrupted("launch cancelled before the automation server was ready".into()));
		}
	}

	let (Some(host), Some(ports)) = (driver.host(), driver.resolved_ports()) else {
		return Err(safari_sim::Error::ServerStart("no active session after launch".into()).into());
	};
	let launched = ResultBuilder::new("launch")
		.data(LaunchData {
			host: host.to_string(),
			control_port: ports.control,
			webhook_port: ports.webhook,
			server: program,
		})
		.build();
	print_result(&launched, format);

	let waited = tokio::signal::ctrl_c().await;
	info!("shutting down simulator session");
	let report = driver.shutdown().await;
	waited?;

	let teardown = ResultBuilder::new("launch")
		.data(TeardownData {
			stopped_server: report.stopped_server,
			killed: report.killed.clone(),
			failures: report
				.failures
				.iter()
				.map(|(pid, reason)| format!("{pid}: {reason}"))
				.chain(report.stop_error.clone())
				.chain(report.reap_error.clone())
				.collect(),
		})
		.build();
	print_result(&teardown, format);
	Ok(())
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	#[test]
	fn flags_become_overrides() {
		let args = LaunchArgs {
			port_range: Some(vec![6100, 6120]),
			device: Some(DeviceArg::Tablet),
			no_reset: true,
			server_cmd: Some("/opt/appium/bin/appium".into()),
			..Default::default()
		};
		let overrides = args.to_overrides().unwrap();

		assert_eq!(overrides.port_range, Some([6100, 6120]));
		assert_eq!(overrides.device, Some(DevicePreset::Tablet));
		assert_eq!(overrides.no_reset, Some(true));
		assert_eq!(overrides.full_reset, None);
		assert_eq!(overrides.server.unwrap().command.as_deref(), Some("/opt/appium/bin/appium"));
	}

	#[test]
	fn unset_switches_leave_overrides_empty() {
		let overrides = LaunchArgs::default().to_overrides().unwrap();
		assert_eq!(overrides, LauncherOverrides::default());
	}

	#[test]
	fn malformed_range_is_rejected() {
		let args = LaunchArgs {
			webhook_port_range: Some(vec![9003]),
			..Default::default()
		};
		let err = args.to_overrides().unwrap_err();
		assert!(err.to_string().contains("--webhook-port-range"));
	}

	#[test]
	fn flags_win_over_config_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, r#"{{ "port": 5000, "host": "0.0.0.0", "readyTimeoutMs": 30000 }}"#).unwrap();

		let args = LaunchArgs {
			config: Some(file.path().to_path_buf()),
			port: Some(5100),
			..Default::default()
		};
		let overrides = args.resolve_overrides().unwrap();

		assert_eq!(overrides.port, Some(5100));
		assert_eq!(overrides.host.as_deref(), Some("0.0.0.0"));
		assert_eq!(overrides.ready_timeout_ms, Some(30000));
	}

	#[test]
	fn unreadable_config_names_the_path() {
		let args = LaunchArgs {
			config: Some(PathBuf::from("/nonexistent/launcher.json")),
			..Default::default()
		};
		match args.resolve_overrides() {
			Err(CliError::Config { path, .. }) => assert_eq!(path, PathBuf::from("/nonexistent/launcher.json")),
			other => panic!("expected config error, got {other:?}"),
		}
	}
}
