//! Free-port negotiation
//!
//! The negotiator probes a preferred port and walks upward until it finds one
//! nothing is listening on. This is a check, not a reservation: another
//! process can still bind the port before the automation server does.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Error, Result};

/// Width of the search window derived from a single fixed port.
pub const DEFAULT_PORT_SPAN: u16 = 90;

/// Inclusive port search window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
	start: u16,
	end: u16,
}

impl PortRange {
	/// Creates a validated range.
	///
	/// # Errors
	///
	/// Returns `Error::InvalidConfig` if `start > end` or `start == 0`.
	pub fn new(start: u16, end: u16) -> Result<Self> {
		if start == 0 {
			return Err(Error::InvalidConfig("port range cannot start at 0".to_string()));
		}
		if start > end {
			return Err(Error::InvalidConfig(format!("port range start {start} is above end {end}")));
		}
		Ok(Self { start, end })
	}

	/// Window of [`DEFAULT_PORT_SPAN`] ports above a fixed port.
	pub fn from_preferred(preferred: u16) -> Self {
		Self {
			start: preferred,
			end: preferred.saturating_add(DEFAULT_PORT_SPAN),
		}
	}

	pub fn start(&self) -> u16 {
		self.start
	}

	pub fn end(&self) -> u16 {
		self.end
	}
}

/// Answers whether something is listening on `host:port`.
#[async_trait]
pub trait PortProbe: Send + Sync {
	async fn in_use(&self, host: &str, port: u16) -> bool;
}

/// Probes by opening a TCP connection. A refused or timed-out connect means
/// the port is free.
#[derive(Debug, Clone, Copy)]
pub struct TcpProbe {
	connect_timeout: Duration,
}

impl Default for TcpProbe {
	fn default() -> Self {
		Self {
			connect_timeout: Duration::from_millis(400),
		}
	}
}

impl TcpProbe {
	pub fn with_timeout(connect_timeout: Duration) -> Self {
		Self { connect_timeout }
	}
}

#[async_trait]
impl PortProbe for TcpProbe {
	async fn in_use(&self, host: &str, port: u16) -> bool {
		matches!(tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port))).await, Ok(Ok(_)))
	}
}

/// Finds the first free port in `[preferred, max]`.
///
/// `preferred` is returned immediately if free. Without `max` the scan may run
/// up to 65535.
///
/// # Errors
///
/// Returns `Error::PortExhausted` when every port in the window is occupied.
pub async fn find_free_port(probe: &dyn PortProbe, host: &str, preferred: u16, max: Option<u16>) -> Result<u16> {
	let end = max.unwrap_or(u16::MAX).max(preferred);

	for port in preferred..=end {
		if !probe.in_use(host, port).await {
			return Ok(port);
		}
		debug!(target: "safari_sim.ports", host, port, "port in use");
	}

	Err(Error::PortExhausted {
		host: host.to_string(),
		start: preferred,
		end,
	})
}

/// Negotiates ports on a single host with a shared probe.
pub struct PortNegotiator<'a> {
	probe: &'a dyn PortProbe,
	host: &'a str,
}

impl<'a> PortNegotiator<'a> {
	pub fn new(probe: &'a dyn PortProbe, host: &'a str) -> Self {
		Self { probe, host }
	}

	/// Resolves `label`'s port within `range`, starting at its first port.
	pub async fn negotiate(&self, label: &str, range: PortRange) -> Result<u16> {
		let port = find_free_port(self.probe, self.host, range.start(), Some(range.end())).await?;
		if port != range.start() {
			debug!(
				target: "safari_sim.ports",
				label,
				requested = range.start(),
				resolved = port,
				"requested port busy; using next free port"
			);
		} else {
			debug!(target: "safari_sim.ports", label, port, "requested port free");
		}
		Ok(port)
	}
}
