//! Scoped suppression of automation server output
//!
//! The automation server is noisy while it boots. Rather than swapping a
//! process-wide console, each session owns a [`ConsoleGate`]: server output is
//! forwarded through it, and [`ConsoleGate::suppress`] hands out a guard that
//! silences the gate until it is dropped. Restoration therefore happens on
//! every exit path, including early returns and unwinding.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tracing::{info, warn};

/// Which server stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
	Stdout,
	Stderr,
}

#[derive(Debug, Default)]
struct GateState {
	suppressors: AtomicUsize,
	dropped_lines: AtomicU64,
}

/// Per-session console sink for automation server output.
///
/// Clones share state, so a clone handed to output forwarders observes
/// suppression started elsewhere.
#[derive(Debug, Clone, Default)]
pub struct ConsoleGate {
	state: Arc<GateState>,
}

impl ConsoleGate {
	pub fn new() -> Self {
		Self::default()
	}

	/// Silences the gate until the returned guard is dropped. Guards nest.
	#[must_use = "output is restored as soon as the guard is dropped"]
	pub fn suppress(&self) -> SuppressGuard {
		self.state.suppressors.fetch_add(1, Ordering::SeqCst);
		SuppressGuard { state: Arc::clone(&self.state) }
	}

	pub fn is_suppressed(&self) -> bool {
		self.state.suppressors.load(Ordering::SeqCst) > 0
	}

	/// Number of lines swallowed while suppressed.
	pub fn dropped_lines(&self) -> u64 {
		self.state.dropped_lines.load(Ordering::SeqCst)
	}

	/// Forwards one line of server output, or drops it while suppressed.
	pub fn emit(&self, stream: OutputStream, line: &str) {
		if self.is_suppressed() {
			self.state.dropped_lines.fetch_add(1, Ordering::Relaxed);
			return;
		}

		match stream {
			OutputStream::Stdout => info!(target: "automation_server", "{line}"),
			OutputStream::Stderr => warn!(target: "automation_server", "{line}"),
		}
	}
}

/// Restores console output when dropped.
#[derive(Debug)]
pub struct SuppressGuard {
	state: Arc<GateState>,
}

impl Drop for SuppressGuard {
	fn drop(&mut self) {
		self.state.suppressors.fetch_sub(1, Ordering::SeqCst);
	}
}
