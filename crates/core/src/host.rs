//! Collaborators supplied by the host test framework.

use tracing::info;

use crate::config::DevicePreset;

/// Sink for user-visible operational notices (port substitutions, overrides).
pub trait EventSink: Send + Sync {
	fn log_system_message(&self, message: &str);
}

/// Host configuration lookup.
pub trait HostConfig: Send + Sync {
	/// Names of the browsers the host framework is configured to launch.
	fn browsers(&self) -> Vec<String>;
}

/// [`EventSink`] that writes notices to the `safari_sim` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
	fn log_system_message(&self, message: &str) {
		info!(target: "safari_sim", "{message}");
	}
}

/// [`HostConfig`] over a fixed browser list.
#[derive(Debug, Clone, Default)]
pub struct StaticHostConfig {
	browsers: Vec<String>,
}

impl StaticHostConfig {
	pub fn new(browsers: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			browsers: browsers.into_iter().map(Into::into).collect(),
		}
	}
}

impl HostConfig for StaticHostConfig {
	fn browsers(&self) -> Vec<String> {
		self.browsers.clone()
	}
}

/// Picks the device preset: an explicit choice wins, otherwise any configured
/// browser named like an iPad selects the tablet preset.
pub fn resolve_device(explicit: Option<DevicePreset>, browsers: &[String]) -> DevicePreset {
	if let Some(device) = explicit {
		return device;
	}
	if browsers.iter().any(|name| name.to_ascii_lowercase().contains("ipad")) {
		DevicePreset::Tablet
	} else {
		DevicePreset::Phone
	}
}
