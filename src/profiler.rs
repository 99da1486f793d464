use std::collections::HashMap;
use std::io::{self, Write};
use std::time::Instant;

use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use tracing::debug;

/// Aggregated wait activity for one profiling session. The engine feeds the
/// hook after every foreground `waitpid`; interpretation of the status stays
/// on this side of the boundary.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WaitStats {
	pub waits: u64,
	pub exits: u64,
	pub nonzero_exits: u64,
	pub signaled: u64,
	pub stops: u64,
}

struct Session {
	started: Instant,
	stats: WaitStats,
	per_pid: HashMap<i32, u64>,
}

pub struct Profiler {
	session: Option<Session>,
}

impl Profiler {
	pub fn new() -> Profiler {
		Profiler { session: None }
	}

	/// Returns false if a session was already active.
	pub fn enable(&mut self) -> bool {
		if self.session.is_some() {
			return false;
		}
		self.session = Some(Session {
			started: Instant::now(),
			stats: WaitStats::default(),
			per_pid: HashMap::new(),
		});
		debug!("profiling session started");
		true
	}

	/// Returns false if no session was active.
	pub fn disable(&mut self) -> bool {
		let was_active = self.session.take().is_some();
		if was_active {
			debug!("profiling session stopped");
		}
		was_active
	}

	pub fn is_enabled(&self) -> bool {
		self.session.is_some()
	}

	pub fn stats(&self) -> Option<&WaitStats> {
		self.session.as_ref().map(|s| &s.stats)
	}

	/// Post-waitpid hook: attributes one wait result to the waited process.
	pub fn collect(&mut self, pid: Pid, status: WaitStatus) {
		let Some(session) = &mut self.session else { return };
		session.stats.waits += 1;
		*session.per_pid.entry(pid.as_raw()).or_insert(0) += 1;
		match status {
			WaitStatus::Exited(_, code) => {
				session.stats.exits += 1;
				if code != 0 {
					session.stats.nonzero_exits += 1;
				}
			},
			WaitStatus::Signaled(..) => session.stats.signaled += 1,
			WaitStatus::Stopped(..) => session.stats.stops += 1,
			_ => {},
		}
	}

	pub fn report<W: Write>(&self, out: &mut W) -> io::Result<()> {
		let Some(session) = &self.session else {
			return writeln!(out, "profiling is disabled");
		};
		let stats = &session.stats;
		writeln!(out, "profiling session: {:.3}s", session.started.elapsed().as_secs_f64())?;
		writeln!(out, "  waits observed:   {}", stats.waits)?;
		writeln!(out, "  normal exits:     {} ({} nonzero)", stats.exits, stats.nonzero_exits)?;
		writeln!(out, "  killed by signal: {}", stats.signaled)?;
		writeln!(out, "  stopped:          {}", stats.stops)?;
		writeln!(out, "  processes seen:   {}", session.per_pid.len())?;
		Ok(())
	}
}
