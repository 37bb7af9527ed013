//! Driver lifecycle
//!
//! One [`SimulatorDriver`] runs one session at a time through these states:
//!
//! ```text
//! Idle -> PortsResolving -> ProcessesSnapshotting -> ServerStarting -> Ready
//!                                                                       |
//! Idle <- ProcessesReaping <- (settle delay) <- ServerStopping <--------+
//! ```
//!
//! A failure before `Ready` returns the driver to `Idle` with nothing left
//! running. Teardown is best-effort: every step is attempted and failures are
//! collected in a [`TeardownReport`] instead of aborting.

use std::fmt;
use std::sync::Arc;

use safari_sim_runtime::{
	ConsoleGate, Error, Pid, PortNegotiator, PortProbe, PortRange, ProcessEnumerator, ProcessRegistry, ProcessTerminator, PsEnumerator,
	Result, SignalTerminator, TcpProbe,
};
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_CONTROL_PORT, DEFAULT_WEBHOOK_PORT, LauncherOverrides, SessionConfig};
use crate::host::{EventSink, HostConfig, resolve_device};
use crate::server::{AutomationServer, ServerArgs, ServerHandle};

/// Lifecycle position of a [`SimulatorDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
	Idle,
	PortsResolving,
	ProcessesSnapshotting,
	ServerStarting,
	Ready,
	ServerStopping,
	ProcessesReaping,
}

impl fmt::Display for LifecycleState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			LifecycleState::Idle => "idle",
			LifecycleState::PortsResolving => "ports-resolving",
			LifecycleState::ProcessesSnapshotting => "processes-snapshotting",
			LifecycleState::ServerStarting => "server-starting",
			LifecycleState::Ready => "ready",
			LifecycleState::ServerStopping => "server-stopping",
			LifecycleState::ProcessesReaping => "processes-reaping",
		};
		f.write_str(name)
	}
}

/// Ports the automation server was started with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPorts {
	pub control: u16,
	pub webhook: u16,
}

/// What teardown managed to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
	/// Whether a server handle was stopped without error.
	pub stopped_server: bool,
	pub stop_error: Option<String>,
	/// Simulator processes started during the session and terminated.
	pub killed: Vec<Pid>,
	/// Processes whose termination failed.
	pub failures: Vec<(Pid, String)>,
	/// Set when the post-stop process listing could not run.
	pub reap_error: Option<String>,
}

impl TeardownReport {
	pub fn is_clean(&self) -> bool {
		self.stop_error.is_none() && self.failures.is_empty() && self.reap_error.is_none()
	}
}

struct ActiveSession {
	config: SessionConfig,
	ports: ResolvedPorts,
	registry: ProcessRegistry,
	handle: Box<dyn ServerHandle>,
}

/// Launches and tears down a mobile Safari session on the simulator.
pub struct SimulatorDriver {
	server: Arc<dyn AutomationServer>,
	probe: Arc<dyn PortProbe>,
	enumerator: Arc<dyn ProcessEnumerator>,
	terminator: Arc<dyn ProcessTerminator>,
	console: ConsoleGate,
	state: LifecycleState,
	session: Option<ActiveSession>,
}

impl SimulatorDriver {
	/// Creates a driver using TCP probing, `ps -A`, and `SIGTERM`.
	pub fn new(server: Arc<dyn AutomationServer>) -> Self {
		Self {
			server,
			probe: Arc::new(TcpProbe::default()),
			enumerator: Arc::new(PsEnumerator::default()),
			terminator: Arc::new(SignalTerminator),
			console: ConsoleGate::new(),
			state: LifecycleState::Idle,
			session: None,
		}
	}

	pub fn with_probe(mut self, probe: Arc<dyn PortProbe>) -> Self {
		self.probe = probe;
		self
	}

	pub fn with_enumerator(mut self, enumerator: Arc<dyn ProcessEnumerator>) -> Self {
		self.enumerator = enumerator;
		self
	}

	pub fn with_terminator(mut self, terminator: Arc<dyn ProcessTerminator>) -> Self {
		self.terminator = terminator;
		self
	}

	/// Gate the server's output is forwarded through.
	pub fn with_console(mut self, console: ConsoleGate) -> Self {
		self.console = console;
		self
	}

	pub fn state(&self) -> LifecycleState {
		self.state
	}

	pub fn console(&self) -> &ConsoleGate {
		&self.console
	}

	pub fn resolved_ports(&self) -> Option<ResolvedPorts> {
		self.session.as_ref().map(|s| s.ports)
	}

	pub fn control_port(&self) -> Option<u16> {
		self.resolved_ports().map(|p| p.control)
	}

	pub fn webhook_port(&self) -> Option<u16> {
		self.resolved_ports().map(|p| p.webhook)
	}

	pub fn host(&self) -> Option<&str> {
		self.session.as_ref().map(|s| s.config.host())
	}

	/// Builds the session config from user overrides and the host's browser
	/// list, then launches it.
	///
	/// # Errors
	///
	/// See [`SimulatorDriver::launch_session`]; additionally
	/// `Error::InvalidConfig` for bad overrides.
	pub async fn launch(&mut self, overrides: &LauncherOverrides, sink: Arc<dyn EventSink>, host: &dyn HostConfig) -> Result<()> {
		let device = resolve_device(overrides.device, &host.browsers());
		let config = SessionConfig::builder().apply_overrides(overrides)?.device(device).build();
		self.launch_session(config, sink).await
	}

	/// Resolves ports, snapshots simulator processes, and starts the server.
	///
	/// Completes once the server reports readiness. Without a readiness
	/// timeout this waits indefinitely; dropping the future cancels the launch
	/// and takes any half-started server down with it.
	///
	/// # Errors
	///
	/// - `Error::NotIdle` if a session is already running
	/// - `Error::PortExhausted` if no control or webhook port is free
	/// - `Error::ProcessQuery` if the process listing cannot run
	/// - `Error::ServerStart` / `Error::Timeout` if the server never becomes ready
	pub async fn launch_session(&mut self, config: SessionConfig, sink: Arc<dyn EventSink>) -> Result<()> {
		if self.session.is_some() {
			return Err(Error::NotIdle {
				state: self.state.to_string(),
			});
		}
		if self.state != LifecycleState::Idle {
			// A previous launch future was dropped mid-flight.
			debug!(target: "safari_sim.lifecycle", state = %self.state, "recovering from cancelled launch");
			self.transition(LifecycleState::Idle);
		}

		let result = self.run_launch(config, sink.as_ref()).await;
		if let Err(err) = &result {
			warn!(target: "safari_sim.lifecycle", state = %self.state, error = %err, "launch failed");
			self.transition(LifecycleState::Idle);
		}
		result
	}

	async fn run_launch(&mut self, config: SessionConfig, sink: &dyn EventSink) -> Result<()> {
		self.transition(LifecycleState::PortsResolving);
		report_port_override(sink, "control", DEFAULT_CONTROL_PORT, config.control_ports());
		report_port_override(sink, "webhook", DEFAULT_WEBHOOK_PORT, config.webhook_ports());

		let probe = Arc::clone(&self.probe);
		let negotiator = PortNegotiator::new(probe.as_ref(), config.host());
		let control = negotiator.negotiate("control", config.control_ports()).await?;
		report_port_switch(sink, "control", config.control_ports().start(), control);
		let webhook = negotiator.negotiate("webhook", config.webhook_ports()).await?;
		report_port_switch(sink, "webhook", config.webhook_ports().start(), webhook);

		self.transition(LifecycleState::ProcessesSnapshotting);
		let mut registry = ProcessRegistry::new(Arc::clone(&self.enumerator), Arc::clone(&self.terminator), config.process_filter());
		registry.snapshot().await?;

		self.transition(LifecycleState::ServerStarting);
		let args = ServerArgs::for_session(&config, control, webhook);
		let handle = {
			let _quiet = self.console.suppress();
			let start = self.server.start(&args, &self.console);
			match config.ready_timeout() {
				Some(limit) => tokio::time::timeout(limit, start)
					.await
					.map_err(|_| Error::Timeout(format!("automation server not ready after {}ms", limit.as_millis())))??,
				None => start.await?,
			}
		};

		info!(
			target: "safari_sim.lifecycle",
			host = config.host(),
			control,
			webhook,
			device = %config.device(),
			"simulator session ready"
		);
		self.session = Some(ActiveSession {
			config,
			ports: ResolvedPorts { control, webhook },
			registry,
			handle,
		});
		self.transition(LifecycleState::Ready);
		Ok(())
	}

	/// Best-effort teardown; failures are logged. Safe to call when idle.
	pub async fn kill(&mut self) -> &mut Self {
		let report = self.shutdown().await;
		if !report.is_clean() {
			warn!(
				target: "safari_sim.lifecycle",
				stop_error = ?report.stop_error,
				failures = report.failures.len(),
				reap_error = ?report.reap_error,
				"teardown finished with errors"
			);
		}
		self
	}

	/// Stops the server, waits the settling delay, and reaps simulator
	/// processes that did not exist before launch.
	pub async fn shutdown(&mut self) -> TeardownReport {
		let Some(mut session) = self.session.take() else {
			debug!(target: "safari_sim.lifecycle", "no active session to tear down");
			return TeardownReport::default();
		};
		let mut report = TeardownReport::default();

		self.transition(LifecycleState::ServerStopping);
		match session.handle.stop().await {
			Ok(()) => report.stopped_server = true,
			Err(err) => {
				warn!(target: "safari_sim.lifecycle", error = %err, "failed to stop automation server");
				report.stop_error = Some(err.to_string());
			}
		}

		tokio::time::sleep(session.config.settle_delay()).await;

		self.transition(LifecycleState::ProcessesReaping);
		{
			let _quiet = self.console.suppress();
			match session.registry.reap().await {
				Ok(termination) => {
					report.killed = termination.terminated;
					report.failures = termination.failures;
				}
				Err(err) => {
					warn!(target: "safari_sim.lifecycle", error = %err, "could not list simulator processes for reaping");
					report.reap_error = Some(err.to_string());
				}
			}
		}

		self.transition(LifecycleState::Idle);
		info!(target: "safari_sim.lifecycle", killed = ?report.killed, "simulator session torn down");
		report
	}

	fn transition(&mut self, next: LifecycleState) {
		debug!(target: "safari_sim.lifecycle", from = %self.state, to = %next, "state transition");
		self.state = next;
	}
}

fn report_port_override(sink: &dyn EventSink, label: &str, default: u16, range: PortRange) {
	if range.start() != default {
		sink.log_system_message(&format!(
			"Using configured {label} port {} (search up to {}) instead of default {default}",
			range.start(),
			range.end()
		));
	}
}

fn report_port_switch(sink: &dyn EventSink, label: &str, requested: u16, resolved: u16) {
	if requested != resolved {
		sink.log_system_message(&format!("{label} port {requested} is in use, switched to {resolved}"));
	}
}
