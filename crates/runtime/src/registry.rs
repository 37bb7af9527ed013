//! Pre-launch process baseline and teardown reaping
//!
//! Simulator instances the user already had open must survive teardown. The
//! registry records which matching processes existed before the automation
//! server started and, after it stops, terminates only the ones that appeared
//! in between.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::process::{Pid, ProcessEnumerator, ProcessTerminator};

/// Immutable set of process ids captured at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSnapshot {
	pids: BTreeSet<Pid>,
	captured_at: SystemTime,
}

impl ProcessSnapshot {
	pub fn new(pids: impl IntoIterator<Item = Pid>) -> Self {
		Self {
			pids: pids.into_iter().collect(),
			captured_at: SystemTime::now(),
		}
	}

	pub fn contains(&self, pid: Pid) -> bool {
		self.pids.contains(&pid)
	}

	pub fn pids(&self) -> impl Iterator<Item = Pid> + '_ {
		self.pids.iter().copied()
	}

	pub fn captured_at(&self) -> SystemTime {
		self.captured_at
	}

	pub fn len(&self) -> usize {
		self.pids.len()
	}

	pub fn is_empty(&self) -> bool {
		self.pids.is_empty()
	}
}

/// Outcome of a termination pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminationReport {
	/// Processes that accepted the termination signal.
	pub terminated: Vec<Pid>,
	/// Processes whose termination failed, with the reason.
	pub failures: Vec<(Pid, String)>,
}

/// Tracks the pre-launch baseline for one session.
pub struct ProcessRegistry {
	enumerator: Arc<dyn ProcessEnumerator>,
	terminator: Arc<dyn ProcessTerminator>,
	name_filter: String,
	baseline: Option<ProcessSnapshot>,
}

impl ProcessRegistry {
	pub fn new(enumerator: Arc<dyn ProcessEnumerator>, terminator: Arc<dyn ProcessTerminator>, name_filter: impl Into<String>) -> Self {
		Self {
			enumerator,
			terminator,
			name_filter: name_filter.into(),
			baseline: None,
		}
	}

	pub fn baseline(&self) -> Option<&ProcessSnapshot> {
		self.baseline.as_ref()
	}

	/// Captures the pre-launch baseline.
	///
	/// The first capture is kept for the life of the registry; later calls
	/// return it without enumerating again.
	///
	/// # Errors
	///
	/// Returns `Error::ProcessQuery` if the process listing cannot run.
	pub async fn snapshot(&mut self) -> Result<ProcessSnapshot> {
		if let Some(existing) = &self.baseline {
			warn!(target: "safari_sim.process", "baseline already captured; keeping the original snapshot");
			return Ok(existing.clone());
		}

		let pids = self.enumerator.list_matching(&self.name_filter).await?;
		let snapshot = ProcessSnapshot::new(pids);
		debug!(
			target: "safari_sim.process",
			filter = %self.name_filter,
			count = snapshot.len(),
			"captured pre-launch process baseline"
		);
		self.baseline = Some(snapshot.clone());
		Ok(snapshot)
	}

	/// Returns `current - baseline`, deduplicated and in ascending order.
	///
	/// With no baseline recorded nothing is safe to kill, so the set is empty.
	pub fn compute_kill_set(&self, current: &[Pid]) -> Vec<Pid> {
		let Some(baseline) = &self.baseline else {
			return Vec::new();
		};

		current
			.iter()
			.copied()
			.filter(|pid| !baseline.contains(*pid))
			.collect::<BTreeSet<_>>()
			.into_iter()
			.collect()
	}

	/// Signals each id. Failures are logged and collected, never escalated.
	pub fn terminate(&self, ids: &[Pid]) -> TerminationReport {
		let mut report = TerminationReport::default();
		for &pid in ids {
			match self.terminator.terminate(pid) {
				Ok(()) => {
					debug!(target: "safari_sim.process", pid, "terminated process");
					report.terminated.push(pid);
				}
				Err(err) => {
					warn!(target: "safari_sim.process", pid, error = %err, "failed to terminate process");
					report.failures.push((pid, err.to_string()));
				}
			}
		}
		report
	}

	/// Enumerates current matches and terminates the ones not in the baseline.
	///
	/// # Errors
	///
	/// Returns `Error::ProcessQuery` if the process listing cannot run.
	pub async fn reap(&self) -> Result<TerminationReport> {
		let current = self.enumerator.list_matching(&self.name_filter).await?;
		let kill_set = self.compute_kill_set(&current);
		if kill_set.is_empty() {
			debug!(target: "safari_sim.process", "no new simulator processes to reap");
			return Ok(TerminationReport::default());
		}

		info!(target: "safari_sim.process", pids = ?kill_set, "reaping simulator processes started by this session");
		Ok(self.terminate(&kill_set))
	}
}
