//! External automation server contract
//!
//! The launcher treats the automation server as a black box that can be
//! started with a set of arguments (resolving once it is ready) and stopped
//! through the handle it returned. [`ProcessServer`] is the stock
//! implementation: it spawns the server command and waits for the control
//! port to accept connections.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use safari_sim_runtime::{ConsoleGate, Error, OutputStream, PortProbe, ProcessGroup, Result, TcpProbe};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{DevicePreset, ServerFlags, ServerOverrides, SessionConfig};

/// Command started when no override is configured.
pub const DEFAULT_SERVER_COMMAND: &str = "appium";

/// Fully resolved arguments for one server start.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerArgs {
	host: String,
	control_port: u16,
	webhook_port: u16,
	device: DevicePreset,
	flags: ServerFlags,
}

impl ServerArgs {
	pub fn new(host: impl Into<String>, control_port: u16, webhook_port: u16, device: DevicePreset, flags: ServerFlags) -> Self {
		Self {
			host: host.into(),
			control_port,
			webhook_port,
			device,
			flags,
		}
	}

	/// Arguments for `config` with negotiated ports.
	pub fn for_session(config: &SessionConfig, control_port: u16, webhook_port: u16) -> Self {
		Self::new(config.host(), control_port, webhook_port, config.device(), config.flags().clone())
	}

	pub fn host(&self) -> &str {
		&self.host
	}

	pub fn control_port(&self) -> u16 {
		self.control_port
	}

	pub fn webhook_port(&self) -> u16 {
		self.webhook_port
	}

	pub fn device(&self) -> DevicePreset {
		self.device
	}

	pub fn flags(&self) -> &ServerFlags {
		&self.flags
	}

	/// `host:webhookPort`, where the server posts its log callbacks.
	pub fn webhook_address(&self) -> String {
		format!("{}:{}", self.host, self.webhook_port)
	}

	/// Renders the arguments as command-line flags.
	///
	/// `true` booleans become bare flags; `false` and `null` are omitted.
	pub fn to_argv(&self) -> Vec<String> {
		let mut argv = vec![
			"--address".to_string(),
			self.host.clone(),
			"--port".to_string(),
			self.control_port.to_string(),
			"--webhook".to_string(),
			self.webhook_address(),
		];

		argv.push(
			match self.device {
				DevicePreset::Phone => "--iphone",
				DevicePreset::Tablet => "--ipad",
			}
			.to_string(),
		);

		if self.flags.quiet {
			argv.push("--quiet".to_string());
		}
		if self.flags.no_reset == Some(true) {
			argv.push("--no-reset".to_string());
		}
		if self.flags.full_reset == Some(true) {
			argv.push("--full-reset".to_string());
		}
		if let Some(orientation) = self.flags.orientation {
			argv.push("--orientation".to_string());
			argv.push(orientation.to_string());
		}

		for (key, value) in &self.flags.extra {
			match value {
				serde_json::Value::Null | serde_json::Value::Bool(false) => {}
				serde_json::Value::Bool(true) => argv.push(format!("--{key}")),
				serde_json::Value::String(s) => {
					argv.push(format!("--{key}"));
					argv.push(s.clone());
				}
				other => {
					argv.push(format!("--{key}"));
					argv.push(other.to_string());
				}
			}
		}

		argv
	}
}

/// Starts the automation server.
#[async_trait]
pub trait AutomationServer: Send + Sync {
	/// Starts the server and resolves once it is ready to accept sessions.
	///
	/// Server output must go through `console`. On failure no server process
	/// may be left running.
	///
	/// # Errors
	///
	/// Returns `Error::ServerStart` if the server cannot be spawned or exits
	/// before becoming ready.
	async fn start(&self, args: &ServerArgs, console: &ConsoleGate) -> Result<Box<dyn ServerHandle>>;
}

/// Handle to a running automation server.
#[async_trait]
pub trait ServerHandle: Send {
	/// Stops the server's control and callback listeners. Idempotent.
	async fn stop(&mut self) -> Result<()>;
}

/// [`AutomationServer`] that runs the server as a child process.
#[derive(Clone)]
pub struct ProcessServer {
	program: String,
	base_args: Vec<String>,
	probe: Arc<dyn PortProbe>,
	poll_interval: Duration,
}

impl ProcessServer {
	pub fn new(program: impl Into<String>) -> Self {
		Self {
			program: program.into(),
			base_args: Vec::new(),
			probe: Arc::new(TcpProbe::default()),
			poll_interval: Duration::from_millis(250),
		}
	}

	/// Uses the configured command, falling back to [`DEFAULT_SERVER_COMMAND`].
	pub fn from_overrides(overrides: Option<&ServerOverrides>) -> Self {
		let program = overrides
			.and_then(|o| o.command.clone())
			.unwrap_or_else(|| DEFAULT_SERVER_COMMAND.to_string());
		let args = overrides.map(|o| o.args.clone()).unwrap_or_default();
		Self::new(program).with_args(args)
	}

	/// Arguments placed before the generated flags.
	pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.base_args = args.into_iter().map(Into::into).collect();
		self
	}

	/// Probe used to detect readiness on the control port.
	pub fn with_probe(mut self, probe: Arc<dyn PortProbe>) -> Self {
		self.probe = probe;
		self
	}

	pub fn with_poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval = interval;
		self
	}

	pub fn program(&self) -> &str {
		&self.program
	}
}

#[async_trait]
impl AutomationServer for ProcessServer {
	async fn start(&self, args: &ServerArgs, console: &ConsoleGate) -> Result<Box<dyn ServerHandle>> {
		let argv = args.to_argv();
		debug!(target: "safari_sim.server", program = %self.program, args = ?argv, "spawning automation server");

		let mut command = Command::new(&self.program);
		command
			.args(&self.base_args)
			.args(&argv)
			.stdin(std::process::Stdio::null())
			.stdout(std::process::Stdio::piped())
			.stderr(std::process::Stdio::piped())
			.kill_on_drop(true);

		// Own group so wrapper scripts (`npx appium`, `sh -c`) are torn down with their children.
		#[cfg(unix)]
		command.process_group(0);

		let mut child = command
			.spawn()
			.map_err(|e| Error::ServerStart(format!("failed to spawn {}: {}", self.program, e)))?;
		let group = child.id().map(ProcessGroup::adopt);

		let mut forwarders = Vec::with_capacity(2);
		if let Some(stdout) = child.stdout.take() {
			forwarders.push(forward_lines(stdout, OutputStream::Stdout, console.clone()));
		}
		if let Some(stderr) = child.stderr.take() {
			forwarders.push(forward_lines(stderr, OutputStream::Stderr, console.clone()));
		}

		// Dropping the handle (failed start, or the start future being cancelled) kills the group.
		let mut handle = ProcessServerHandle {
			group,
			child: Some(child),
			forwarders,
		};

		loop {
			let Some(child) = handle.child.as_mut() else {
				return Err(Error::ServerStart("server handle lost its process".to_string()));
			};
			match child.try_wait() {
				Ok(Some(status)) => {
					handle.abort_forwarders();
					return Err(Error::ServerStart(format!("{} exited before becoming ready ({status})", self.program)));
				}
				Ok(None) => {}
				Err(e) => {
					return Err(Error::ServerStart(format!("failed to check server status: {e}")));
				}
			}

			if self.probe.in_use(args.host(), args.control_port()).await {
				break;
			}
			tokio::time::sleep(self.poll_interval).await;
		}

		info!(
			target: "safari_sim.server",
			port = args.control_port(),
			webhook = %args.webhook_address(),
			"automation server ready"
		);
		Ok(Box::new(handle))
	}
}

/// Handle for a [`ProcessServer`] child.
#[derive(Debug)]
pub struct ProcessServerHandle {
	group: Option<ProcessGroup>,
	child: Option<Child>,
	forwarders: Vec<JoinHandle<()>>,
}

impl ProcessServerHandle {
	fn abort_forwarders(&mut self) {
		for task in self.forwarders.drain(..) {
			task.abort();
		}
	}
}

#[async_trait]
impl ServerHandle for ProcessServerHandle {
	async fn stop(&mut self) -> Result<()> {
		let Some(mut child) = self.child.take() else {
			return Ok(());
		};

		let group_result = self.group.take().map_or(Ok(()), |mut group| group.kill());
		let child_result = match child.try_wait() {
			Ok(Some(_)) => Ok(()),
			_ => child.kill().await.map_err(|e| Error::ServerStop(format!("failed to kill automation server: {e}"))),
		};
		self.abort_forwarders();
		debug!(target: "safari_sim.server", "automation server stopped");
		group_result.and(child_result)
	}
}

fn forward_lines<R>(reader: R, stream: OutputStream, console: ConsoleGate) -> JoinHandle<()>
where
	R: AsyncRead + Unpin + Send + 'static,
{
	tokio::spawn(async move {
		let mut lines = BufReader::new(reader).lines();
		while let Ok(Some(line)) = lines.next_line().await {
			console.emit(stream, &line);
		}
	})
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeMap;

	use super::*;
	use crate::config::Orientation;

	struct AlwaysListening;

	#[async_trait]
	impl PortProbe for AlwaysListening {
		async fn in_use(&self, _host: &str, _port: u16) -> bool {
			true
		}
	}

	#[test]
	fn argv_carries_ports_and_device() {
		let args = ServerArgs::new("127.0.0.1", 4723, 9003, DevicePreset::Tablet, ServerFlags::default());
		assert_eq!(
			args.to_argv(),
			vec!["--address", "127.0.0.1", "--port", "4723", "--webhook", "127.0.0.1:9003", "--ipad"]
		);
	}

	#[test]
	fn argv_renders_pass_through_flags() {
		let mut extra = BTreeMap::new();
		extra.insert("language".to_string(), serde_json::json!("fr"));
		extra.insert("native-instruments-lib".to_string(), serde_json::json!(true));
		extra.insert("pre-launch".to_string(), serde_json::json!(false));
		extra.insert("udid".to_string(), serde_json::Value::Null);
		extra.insert("launch-timeout".to_string(), serde_json::json!(90000));

		let flags = ServerFlags {
			quiet: true,
			no_reset: Some(false),
			full_reset: Some(true),
			orientation: Some(Orientation::Landscape),
			extra,
		};
		let argv = ServerArgs::new("localhost", 4800, 9010, DevicePreset::Phone, flags).to_argv();

		assert_eq!(
			argv[6..],
			[
				"--iphone",
				"--quiet",
				"--full-reset",
				"--orientation",
				"LANDSCAPE",
				"--language",
				"fr",
				"--launch-timeout",
				"90000",
				"--native-instruments-lib",
			]
		);
	}

	#[test]
	fn from_overrides_defaults_to_appium() {
		assert_eq!(ProcessServer::from_overrides(None).program(), DEFAULT_SERVER_COMMAND);

		let overrides = ServerOverrides {
			command: Some("/opt/appium/bin/appium".into()),
			args: vec!["--log-no-colors".into()],
		};
		let server = ProcessServer::from_overrides(Some(&overrides));
		assert_eq!(server.program(), "/opt/appium/bin/appium");
		assert_eq!(server.base_args, vec!["--log-no-colors".to_string()]);
	}

	#[tokio::test]
	async fn missing_binary_is_a_start_error() {
		let server = ProcessServer::new("safari-sim-no-such-server");
		let args = ServerArgs::new("127.0.0.1", 4723, 9003, DevicePreset::Phone, ServerFlags::default());
		let err = server.start(&args, &ConsoleGate::new()).await.err().unwrap();
		assert!(matches!(err, Error::ServerStart(_)), "unexpected error: {err:?}");
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn early_exit_is_a_start_error() {
		// `false` ignores its arguments and exits 1 immediately.
		let server = ProcessServer::new("false").with_poll_interval(Duration::from_millis(20));
		let args = ServerArgs::new("127.0.0.1", 1, 9003, DevicePreset::Phone, ServerFlags::default());
		let err = server.start(&args, &ConsoleGate::new()).await.err().unwrap();
		assert!(err.is_start_failure());
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn ready_server_can_be_stopped_twice() {
		let server = ProcessServer::new("sh")
			.with_args(["-c", "sleep 30", "--"])
			.with_probe(Arc::new(AlwaysListening));
		let args = ServerArgs::new("127.0.0.1", 4723, 9003, DevicePreset::Phone, ServerFlags::default());

		let mut handle = server.start(&args, &ConsoleGate::new()).await.unwrap();
		handle.stop().await.unwrap();
		handle.stop().await.unwrap();
	}

	#[cfg(target_os = "linux")]
	struct NeverListening;

	#[cfg(target_os = "linux")]
	#[async_trait]
	impl PortProbe for NeverListening {
		async fn in_use(&self, _host: &str, _port: u16) -> bool {
			false
		}
	}

	/// `sh` server that forks a long-lived child and records its pid, the way
	/// `npx appium` leaves the real server one level down.
	#[cfg(target_os = "linux")]
	fn forking_server(pid_file: &std::path::Path, tail: &str) -> ProcessServer {
		let script = format!("sleep 30 & echo $! > {}; {tail}", pid_file.display());
		ProcessServer::new("sh")
			.with_args(["-c".to_string(), script, "sh".to_string()])
			.with_poll_interval(Duration::from_millis(20))
	}

	#[cfg(target_os = "linux")]
	async fn forked_pid(pid_file: &std::path::Path) -> u32 {
		for _ in 0..200 {
			if let Some(pid) = std::fs::read_to_string(pid_file).ok().and_then(|c| c.trim().parse().ok()) {
				return pid;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		panic!("server never recorded its child pid");
	}

	/// Waits until `pid` is gone or a zombie.
	#[cfg(target_os = "linux")]
	async fn exited(pid: u32) -> bool {
		for _ in 0..250 {
			match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
				Err(_) => return true,
				Ok(stat) if stat.rsplit(')').next().is_some_and(|rest| rest.trim_start().starts_with('Z')) => return true,
				Ok(_) => tokio::time::sleep(Duration::from_millis(20)).await,
			}
		}
		false
	}

	#[cfg(target_os = "linux")]
	#[tokio::test]
	async fn cancelled_start_kills_forked_children() {
		let dir = tempfile::tempdir().unwrap();
		let pid_file = dir.path().join("child.pid");
		let server = forking_server(&pid_file, "wait").with_probe(Arc::new(NeverListening));
		let args = ServerArgs::new("127.0.0.1", 4723, 9003, DevicePreset::Phone, ServerFlags::default());

		let gate = ConsoleGate::new();
		let waiting = tokio::time::timeout(Duration::from_millis(500), server.start(&args, &gate)).await;
		assert!(waiting.is_err(), "server should still be starting");

		let forked = forked_pid(&pid_file).await;
		assert!(exited(forked).await, "child {forked} survived the cancelled start");
	}

	#[cfg(target_os = "linux")]
	#[tokio::test]
	async fn failed_start_kills_forked_children() {
		let dir = tempfile::tempdir().unwrap();
		let pid_file = dir.path().join("child.pid");
		let server = forking_server(&pid_file, "exit 3").with_probe(Arc::new(NeverListening));
		let args = ServerArgs::new("127.0.0.1", 4723, 9003, DevicePreset::Phone, ServerFlags::default());

		let err = server.start(&args, &ConsoleGate::new()).await.err().unwrap();
		assert!(err.is_start_failure());

		let forked = forked_pid(&pid_file).await;
		assert!(exited(forked).await, "child {forked} survived the failed start");
	}

	#[cfg(target_os = "linux")]
	#[tokio::test]
	async fn stop_kills_forked_children() {
		let dir = tempfile::tempdir().unwrap();
		let pid_file = dir.path().join("child.pid");
		let server = forking_server(&pid_file, "wait").with_probe(Arc::new(AlwaysListening));
		let args = ServerArgs::new("127.0.0.1", 4723, 9003, DevicePreset::Phone, ServerFlags::default());

		let mut handle = server.start(&args, &ConsoleGate::new()).await.unwrap();
		let forked = forked_pid(&pid_file).await;
		handle.stop().await.unwrap();

		assert!(exited(forked).await, "child {forked} survived teardown");
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn stopping_an_exited_server_succeeds() {
		let server = ProcessServer::new("sh")
			.with_args(["-c", "sleep 0.2", "sh"])
			.with_probe(Arc::new(AlwaysListening));
		let args = ServerArgs::new("127.0.0.1", 4723, 9003, DevicePreset::Phone, ServerFlags::default());

		let mut handle = server.start(&args, &ConsoleGate::new()).await.unwrap();
		tokio::time::sleep(Duration::from_millis(600)).await;
		handle.stop().await.unwrap();
	}
}
