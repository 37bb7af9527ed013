//! safari-sim runtime - ports, processes, and console output
//!
//! This crate provides the low-level pieces the launcher needs before and
//! after the external automation server runs:
//!
//! - **Port negotiation**: finding a free control/webhook port on a host
//! - **Process enumeration**: listing simulator processes by name
//! - **Process registry**: snapshotting pre-existing processes and reaping
//!   only the ones that appeared afterwards
//! - **Console gate**: scoped suppression of server output
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │    safari-sim    │  Driver lifecycle, session config
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐
//! │safari-sim-runtime│  This crate
//! │  ┌────────────┐  │
//! │  │ ports      │  │  PortProbe + negotiator
//! │  └────────────┘  │
//! │  ┌────────────┐  │
//! │  │ process    │  │  ps listing + termination
//! │  └────────────┘  │
//! │  ┌────────────┐  │
//! │  │ registry   │  │  baseline snapshot / kill set
//! │  └────────────┘  │
//! └──────────────────┘
//! ```

pub mod console;
pub mod error;
pub mod ports;
pub mod process;
pub mod registry;

pub use console::{ConsoleGate, OutputStream, SuppressGuard};
pub use error::{Error, Result};
pub use ports::{DEFAULT_PORT_SPAN, PortNegotiator, PortProbe, PortRange, TcpProbe, find_free_port};
pub use process::{NO_TERMINAL_MARKER, Pid, ProcessEnumerator, ProcessGroup, ProcessTerminator, PsEnumerator, SignalTerminator, parse_listing};
pub use registry::{ProcessRegistry, ProcessSnapshot, TerminationReport};
