//! safari-sim: launch mobile Safari on the iOS simulator
//!
//! This crate drives an external automation server (Appium by default) on
//! behalf of a test framework. Its own job is narrow: negotiate free control
//! and webhook ports, remember which simulator processes were already running,
//! start the server with its console noise suppressed, and on teardown stop the
//! server and reap only the simulator processes this session created.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use safari_sim::{LauncherOverrides, ProcessServer, SimulatorDriver, StaticHostConfig, TracingSink};
//!
//! #[tokio::main]
//! async fn main() -> safari_sim::Result<()> {
//!     let overrides = LauncherOverrides::from_json_str(r#"{ "portRange": [6100, 6120] }"#)?;
//!     let server = Arc::new(ProcessServer::from_overrides(overrides.server.as_ref()));
//!     let mut driver = SimulatorDriver::new(server);
//!
//!     driver
//!         .launch(&overrides, Arc::new(TracingSink), &StaticHostConfig::new(["MobileSafari"]))
//!         .await?;
//!     println!("automation server on port {:?}", driver.control_port());
//!
//!     driver.kill().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod host;
pub mod lifecycle;
pub mod server;

pub use config::{
	DEFAULT_CONTROL_PORT, DEFAULT_HOST, DEFAULT_PROCESS_FILTER, DEFAULT_SETTLE_DELAY, DEFAULT_WEBHOOK_PORT, DevicePreset, LauncherOverrides,
	Orientation, ServerFlags, ServerOverrides, SessionConfig, SessionConfigBuilder, port_window,
};
pub use host::{EventSink, HostConfig, StaticHostConfig, TracingSink, resolve_device};
pub use lifecycle::{LifecycleState, ResolvedPorts, SimulatorDriver, TeardownReport};
pub use safari_sim_runtime::{
	ConsoleGate, DEFAULT_PORT_SPAN, Error, OutputStream, Pid, PortProbe, PortRange, ProcessEnumerator, ProcessSnapshot, ProcessTerminator,
	PsEnumerator, Result, SignalTerminator, TcpProbe, find_free_port,
};
pub use server::{AutomationServer, DEFAULT_SERVER_COMMAND, ProcessServer, ProcessServerHandle, ServerArgs, ServerHandle};
