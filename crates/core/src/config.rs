//! Session configuration
//!
//! [`LauncherOverrides`] is the user-facing, serde-friendly bag of overrides
//! (typically loaded from a JSON file). [`SessionConfigBuilder`] folds those
//! overrides over the compiled-in defaults into an immutable
//! [`SessionConfig`], built once per session.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use safari_sim_runtime::{Error, PortRange, Result};
use serde::{Deserialize, Serialize};

/// Default automation server control port.
pub const DEFAULT_CONTROL_PORT: u16 = 4723;
/// Default webhook (log callback) port.
pub const DEFAULT_WEBHOOK_PORT: u16 = 9003;
/// Host the ports are negotiated on.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Substring identifying simulator rows in the process listing.
pub const DEFAULT_PROCESS_FILTER: &str = "iOS Simulator";
/// Pause between stopping the server and re-enumerating simulator processes.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1000);

/// Simulated device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreset {
	#[default]
	Phone,
	Tablet,
}

impl fmt::Display for DevicePreset {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DevicePreset::Phone => write!(f, "phone"),
			DevicePreset::Tablet => write!(f, "tablet"),
		}
	}
}

/// Initial simulator orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Orientation {
	Portrait,
	Landscape,
}

impl fmt::Display for Orientation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Orientation::Portrait => write!(f, "PORTRAIT"),
			Orientation::Landscape => write!(f, "LANDSCAPE"),
		}
	}
}

/// Pass-through flags handed to the automation server untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerFlags {
	#[serde(default)]
	pub quiet: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub no_reset: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub full_reset: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub orientation: Option<Orientation>,
	/// Additional `--key value` arguments.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub extra: BTreeMap<String, serde_json::Value>,
}

/// Command used to start the automation server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerOverrides {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub command: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub args: Vec<String>,
}

/// User-supplied overrides.
///
/// An explicit `portRange` wins over `port`; a single `port` searches
/// `[port, port + 90]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LauncherOverrides {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub device: Option<DevicePreset>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub port: Option<u16>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub port_range: Option<[u16; 2]>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub webhook_port: Option<u16>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub webhook_port_range: Option<[u16; 2]>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub host: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub process_filter: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub settle_delay_ms: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ready_timeout_ms: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub quiet: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub no_reset: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub full_reset: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub orientation: Option<Orientation>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub extra: BTreeMap<String, serde_json::Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub server: Option<ServerOverrides>,
}

impl LauncherOverrides {
	pub fn from_json_str(json: &str) -> Result<Self> {
		Ok(serde_json::from_str(json)?)
	}

	/// Reads overrides from a JSON file.
	pub fn load(path: &Path) -> Result<Self> {
		let contents = std::fs::read_to_string(path)?;
		Self::from_json_str(&contents)
	}

	/// Layers `other` on top of `self`; fields set in `other` win.
	pub fn merge(self, other: LauncherOverrides) -> Self {
		let mut extra = self.extra;
		extra.extend(other.extra);

		Self {
			device: other.device.or(self.device),
			port: other.port.or(self.port),
			port_range: other.port_range.or(self.port_range),
			webhook_port: other.webhook_port.or(self.webhook_port),
			webhook_port_range: other.webhook_port_range.or(self.webhook_port_range),
			host: other.host.or(self.host),
			process_filter: other.process_filter.or(self.process_filter),
			settle_delay_ms: other.settle_delay_ms.or(self.settle_delay_ms),
			ready_timeout_ms: other.ready_timeout_ms.or(self.ready_timeout_ms),
			quiet: other.quiet.or(self.quiet),
			no_reset: other.no_reset.or(self.no_reset),
			full_reset: other.full_reset.or(self.full_reset),
			orientation: other.orientation.or(self.orientation),
			extra,
			server: other.server.or(self.server),
		}
	}
}

/// Resolves a port search window from an optional fixed port and range.
pub fn port_window(default: u16, port: Option<u16>, range: Option<[u16; 2]>) -> Result<PortRange> {
	match (range, port) {
		(Some([start, end]), _) => PortRange::new(start, end),
		(None, Some(0)) => Err(Error::InvalidConfig("port cannot be 0".to_string())),
		(None, Some(port)) => Ok(PortRange::from_preferred(port)),
		(None, None) => Ok(PortRange::from_preferred(default)),
	}
}

/// Immutable per-session configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
	control: PortRange,
	webhook: PortRange,
	host: String,
	device: DevicePreset,
	flags: ServerFlags,
	process_filter: String,
	settle_delay: Duration,
	ready_timeout: Option<Duration>,
}

impl Default for SessionConfig {
	fn default() -> Self {
		SessionConfigBuilder::new().build()
	}
}

impl SessionConfig {
	pub fn builder() -> SessionConfigBuilder {
		SessionConfigBuilder::new()
	}

	/// Control port search window; its start is the preferred port.
	pub fn control_ports(&self) -> PortRange {
		self.control
	}

	/// Webhook port search window; its start is the preferred port.
	pub fn webhook_ports(&self) -> PortRange {
		self.webhook
	}

	pub fn host(&self) -> &str {
		&self.host
	}

	pub fn device(&self) -> DevicePreset {
		self.device
	}

	pub fn flags(&self) -> &ServerFlags {
		&self.flags
	}

	pub fn process_filter(&self) -> &str {
		&self.process_filter
	}

	pub fn settle_delay(&self) -> Duration {
		self.settle_delay
	}

	/// `None` waits for readiness indefinitely.
	pub fn ready_timeout(&self) -> Option<Duration> {
		self.ready_timeout
	}
}

/// Builds a [`SessionConfig`] from compiled-in defaults.
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
	config: SessionConfig,
}

impl Default for SessionConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl SessionConfigBuilder {
	pub fn new() -> Self {
		Self {
			config: SessionConfig {
				control: PortRange::from_preferred(DEFAULT_CONTROL_PORT),
				webhook: PortRange::from_preferred(DEFAULT_WEBHOOK_PORT),
				host: DEFAULT_HOST.to_string(),
				device: DevicePreset::default(),
				flags: ServerFlags::default(),
				process_filter: DEFAULT_PROCESS_FILTER.to_string(),
				settle_delay: DEFAULT_SETTLE_DELAY,
				ready_timeout: None,
			},
		}
	}

	pub fn control_ports(mut self, range: PortRange) -> Self {
		self.config.control = range;
		self
	}

	pub fn webhook_ports(mut self, range: PortRange) -> Self {
		self.config.webhook = range;
		self
	}

	pub fn host(mut self, host: impl Into<String>) -> Self {
		self.config.host = host.into();
		self
	}

	pub fn device(mut self, device: DevicePreset) -> Self {
		self.config.device = device;
		self
	}

	pub fn flags(mut self, flags: ServerFlags) -> Self {
		self.config.flags = flags;
		self
	}

	pub fn process_filter(mut self, filter: impl Into<String>) -> Self {
		self.config.process_filter = filter.into();
		self
	}

	pub fn settle_delay(mut self, delay: Duration) -> Self {
		self.config.settle_delay = delay;
		self
	}

	pub fn ready_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.config.ready_timeout = timeout;
		self
	}

	/// Applies user overrides on top of the current values.
	///
	/// # Errors
	///
	/// Returns `Error::InvalidConfig` for inverted or zero port ranges, an
	/// empty host, or an empty process filter.
	pub fn apply_overrides(mut self, overrides: &LauncherOverrides) -> Result<Self> {
		if overrides.port.is_some() || overrides.port_range.is_some() {
			self.config.control = port_window(DEFAULT_CONTROL_PORT, overrides.port, overrides.port_range)?;
		}
		if overrides.webhook_port.is_some() || overrides.webhook_port_range.is_some() {
			self.config.webhook = port_window(DEFAULT_WEBHOOK_PORT, overrides.webhook_port, overrides.webhook_port_range)?;
		}
		if let Some(host) = &overrides.host {
			if host.trim().is_empty() {
				return Err(Error::InvalidConfig("host cannot be empty".to_string()));
			}
			self.config.host = host.clone();
		}
		if let Some(device) = overrides.device {
			self.config.device = device;
		}
		if let Some(filter) = &overrides.process_filter {
			if filter.is_empty() {
				return Err(Error::InvalidConfig("process filter cannot be empty".to_string()));
			}
			self.config.process_filter = filter.clone();
		}
		if let Some(ms) = overrides.settle_delay_ms {
			self.config.settle_delay = Duration::from_millis(ms);
		}
		if let Some(ms) = overrides.ready_timeout_ms {
			self.config.ready_timeout = (ms > 0).then(|| Duration::from_millis(ms));
		}

		let flags = &mut self.config.flags;
		if let Some(quiet) = overrides.quiet {
			flags.quiet = quiet;
		}
		flags.no_reset = overrides.no_reset.or(flags.no_reset);
		flags.full_reset = overrides.full_reset.or(flags.full_reset);
		flags.orientation = overrides.orientation.or(flags.orientation);
		flags.extra.extend(overrides.extra.iter().map(|(k, v)| (k.clone(), v.clone())));

		Ok(self)
	}

	pub fn build(self) -> SessionConfig {
		self.config
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	#[test]
	fn defaults_match_compiled_in_ports() {
		let config = SessionConfig::default();
		assert_eq!(config.control_ports(), PortRange::new(4723, 4813).unwrap());
		assert_eq!(config.webhook_ports(), PortRange::new(9003, 9093).unwrap());
		assert_eq!(config.host(), DEFAULT_HOST);
		assert_eq!(config.device(), DevicePreset::Phone);
		assert_eq!(config.ready_timeout(), None);
		assert_eq!(config.settle_delay(), DEFAULT_SETTLE_DELAY);
	}

	#[test]
	fn explicit_range_is_used_verbatim() {
		let overrides = LauncherOverrides::from_json_str(r#"{ "portRange": [6100, 6120] }"#).unwrap();
		let config = SessionConfig::builder().apply_overrides(&overrides).unwrap().build();
		assert_eq!(config.control_ports(), PortRange::new(6100, 6120).unwrap());
		assert_eq!(config.webhook_ports().start(), DEFAULT_WEBHOOK_PORT);
	}

	#[test]
	fn fixed_port_gets_ninety_port_window() {
		let overrides = LauncherOverrides {
			port: Some(5000),
			webhook_port: Some(7000),
			..Default::default()
		};
		let config = SessionConfig::builder().apply_overrides(&overrides).unwrap().build();
		assert_eq!(config.control_ports(), PortRange::new(5000, 5090).unwrap());
		assert_eq!(config.webhook_ports(), PortRange::new(7000, 7090).unwrap());
	}

	#[test]
	fn range_wins_over_fixed_port() {
		let window = port_window(DEFAULT_CONTROL_PORT, Some(5000), Some([6100, 6120])).unwrap();
		assert_eq!((window.start(), window.end()), (6100, 6120));
	}

	#[test]
	fn inverted_range_is_invalid() {
		let overrides = LauncherOverrides::from_json_str(r#"{ "webhookPortRange": [9100, 9000] }"#).unwrap();
		let err = SessionConfig::builder().apply_overrides(&overrides).unwrap_err();
		assert!(matches!(err, Error::InvalidConfig(_)));
	}

	#[test]
	fn overrides_do_not_leak_into_defaults() {
		let overrides = LauncherOverrides {
			port: Some(5000),
			..Default::default()
		};
		let _ = SessionConfig::builder().apply_overrides(&overrides).unwrap().build();
		assert_eq!(SessionConfig::default().control_ports().start(), DEFAULT_CONTROL_PORT);
	}

	#[test]
	fn pass_through_flags_are_parsed() {
		let overrides = LauncherOverrides::from_json_str(
			r#"{
				"device": "tablet",
				"quiet": true,
				"noReset": true,
				"orientation": "LANDSCAPE",
				"extra": { "language": "en" },
				"readyTimeoutMs": 30000
			}"#,
		)
		.unwrap();
		let config = SessionConfig::builder().apply_overrides(&overrides).unwrap().build();

		assert_eq!(config.device(), DevicePreset::Tablet);
		assert!(config.flags().quiet);
		assert_eq!(config.flags().no_reset, Some(true));
		assert_eq!(config.flags().full_reset, None);
		assert_eq!(config.flags().orientation, Some(Orientation::Landscape));
		assert_eq!(config.flags().extra.get("language"), Some(&serde_json::json!("en")));
		assert_eq!(config.ready_timeout(), Some(Duration::from_secs(30)));
	}

	#[test]
	fn zero_ready_timeout_means_wait_forever() {
		let overrides = LauncherOverrides {
			ready_timeout_ms: Some(0),
			..Default::default()
		};
		let config = SessionConfig::builder().apply_overrides(&overrides).unwrap().build();
		assert_eq!(config.ready_timeout(), None);
	}

	#[test]
	fn merge_prefers_later_layer() {
		let file = LauncherOverrides {
			port: Some(5000),
			host: Some("10.0.0.2".into()),
			..Default::default()
		};
		let flags = LauncherOverrides {
			port: Some(6000),
			..Default::default()
		};
		let merged = file.merge(flags);
		assert_eq!(merged.port, Some(6000));
		assert_eq!(merged.host.as_deref(), Some("10.0.0.2"));
	}

	#[test]
	fn load_reads_json_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, r#"{{ "host": "localhost", "server": {{ "command": "appium", "args": ["--log-no-colors"] }} }}"#).unwrap();

		let overrides = LauncherOverrides::load(file.path()).unwrap();
		assert_eq!(overrides.host.as_deref(), Some("localhost"));
		let server = overrides.server.unwrap();
		assert_eq!(server.command.as_deref(), Some("appium"));
		assert_eq!(server.args, vec!["--log-no-colors".to_string()]);
	}

	#[test]
	fn unknown_device_is_rejected() {
		assert!(LauncherOverrides::from_json_str(r#"{ "device": "watch" }"#).is_err());
	}
}
