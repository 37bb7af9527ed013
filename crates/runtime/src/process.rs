//! Simulator process enumeration and termination
//!
//! Matching processes are found by running the platform process listing
//! (`ps -A` by default) and parsing its whitespace-delimited table. Only rows
//! detached from a controlling terminal count: the simulator is launched by
//! launchd, so its TTY column reads `??`, while a user's `tail -f` on the
//! simulator log does not.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Numeric OS process identifier.
pub type Pid = u32;

/// TTY column value `ps` prints for processes without a controlling terminal.
pub const NO_TERMINAL_MARKER: &str = "??";

/// Token index of the TTY column in `ps -A` output (`PID TTY TIME CMD`).
const TERMINAL_COLUMN: usize = 1;

/// Lists OS processes whose listing row matches a name filter.
#[async_trait]
pub trait ProcessEnumerator: Send + Sync {
	/// Returns the ids of matching processes. An empty result is not an error.
	async fn list_matching(&self, name_filter: &str) -> Result<Vec<Pid>>;
}

/// Sends a termination signal to a single process.
pub trait ProcessTerminator: Send + Sync {
	/// # Errors
	///
	/// Returns `Error::ProcessTermination` when the signal could not be
	/// delivered (typically because the process already exited).
	fn terminate(&self, pid: Pid) -> Result<()>;
}

/// Parses a process table, keeping rows detached from a terminal.
///
/// A row matches only if it has at least two tokens and the TTY token equals
/// [`NO_TERMINAL_MARKER`]. The first token is the pid; short, malformed, or
/// non-numeric rows are skipped.
pub fn parse_listing(output: &str) -> Vec<Pid> {
	output
		.lines()
		.filter_map(|line| {
			let tokens: Vec<&str> = line.split_whitespace().collect();
			if tokens.len() <= TERMINAL_COLUMN || tokens[TERMINAL_COLUMN] != NO_TERMINAL_MARKER {
				return None;
			}
			tokens[0].parse::<Pid>().ok()
		})
		.collect()
}

/// [`ProcessEnumerator`] backed by an external `ps` invocation.
#[derive(Debug, Clone)]
pub struct PsEnumerator {
	program: String,
	args: Vec<String>,
}

impl Default for PsEnumerator {
	fn default() -> Self {
		Self {
			program: "ps".to_string(),
			args: vec!["-A".to_string()],
		}
	}
}

impl PsEnumerator {
	/// Uses a custom listing command. Its output must follow the
	/// `PID TTY ...` column layout.
	pub fn with_command(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			program: program.into(),
			args: args.into_iter().map(Into::into).collect(),
		}
	}
}

#[async_trait]
impl ProcessEnumerator for PsEnumerator {
	async fn list_matching(&self, name_filter: &str) -> Result<Vec<Pid>> {
		let output = Command::new(&self.program)
			.args(&self.args)
			.output()
			.await
			.map_err(|e| Error::ProcessQuery(format!("failed to run {}: {}", self.program, e)))?;

		if !output.status.success() {
			warn!(
				target: "safari_sim.process",
				program = %self.program,
				status = %output.status,
				"process listing exited unsuccessfully; parsing partial output"
			);
		}

		let stdout = String::from_utf8_lossy(&output.stdout);
		let filtered: String = stdout
			.lines()
			.filter(|line| line.contains(name_filter))
			.map(|line| format!("{line}\n"))
			.collect();
		let pids = parse_listing(&filtered);

		debug!(target: "safari_sim.process", filter = name_filter, count = pids.len(), "listed matching processes");
		Ok(pids)
	}
}

/// Terminates processes with `SIGTERM` (Unix) or `taskkill /F` (Windows).
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalTerminator;

impl ProcessTerminator for SignalTerminator {
	fn terminate(&self, pid: Pid) -> Result<()> {
		#[cfg(unix)]
		{
			let Ok(raw) = libc::pid_t::try_from(pid) else {
				return Err(Error::ProcessTermination {
					pid,
					reason: "pid out of range".to_string(),
				});
			};
			let rc = unsafe { libc::kill(raw, libc::SIGTERM) };
			if rc != 0 {
				return Err(Error::ProcessTermination {
					pid,
					reason: std::io::Error::last_os_error().to_string(),
				});
			}
			Ok(())
		}

		#[cfg(windows)]
		{
			let status = std::process::Command::new("taskkill")
				.args(["/PID", &pid.to_string(), "/F"])
				.status()
				.map_err(|e| Error::ProcessTermination { pid, reason: e.to_string() })?;
			if !status.success() {
				return Err(Error::ProcessTermination {
					pid,
					reason: format!("taskkill exited with {status}"),
				});
			}
			Ok(())
		}
	}
}

/// Process group led by a spawned child.
///
/// The leader must have been spawned as the head of a new group
/// (`process_group(0)`), so the group id equals its pid. Every member,
/// including grandchildren forked by wrapper scripts, is killed when the
/// group is dropped.
#[derive(Debug)]
pub struct ProcessGroup {
	pgid: Option<Pid>,
}

impl ProcessGroup {
	pub fn adopt(leader: Pid) -> Self {
		Self { pgid: Some(leader) }
	}

	pub fn id(&self) -> Option<Pid> {
		self.pgid
	}

	/// Sends `SIGKILL` to every member. A group with no members left is not
	/// an error. Later calls are no-ops.
	///
	/// # Errors
	///
	/// Returns `Error::ProcessTermination` when the signal could not be sent.
	pub fn kill(&mut self) -> Result<()> {
		let Some(pgid) = self.pgid.take() else {
			return Ok(());
		};
		kill_group(pgid).map_err(|e| Error::ProcessTermination {
			pid: pgid,
			reason: format!("process group: {e}"),
		})?;
		debug!(target: "safari_sim.process", pgid, "killed process group");
		Ok(())
	}
}

impl Drop for ProcessGroup {
	fn drop(&mut self) {
		if let Err(err) = self.kill() {
			warn!(target: "safari_sim.process", error = %err, "failed to kill process group");
		}
	}
}

#[cfg(unix)]
fn kill_group(pgid: Pid) -> std::io::Result<()> {
	let raw = libc::pid_t::try_from(pgid).map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
	let rc = unsafe { libc::killpg(raw, libc::SIGKILL) };
	if rc == 0 {
		return Ok(());
	}
	let err = std::io::Error::last_os_error();
	if err.raw_os_error() == Some(libc::ESRCH) { Ok(()) } else { Err(err) }
}

#[cfg(not(unix))]
fn kill_group(_pgid: Pid) -> std::io::Result<()> {
	Ok(())
}
