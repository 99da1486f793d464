use std::mem;

use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use thiserror::Error;
use tracing::debug;

pub const JOB_CAPACITY: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
	#[error("job table full")]
	TableFull,
	#[error("no such job: {0}")]
	NoSuchJob(String),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum JobState { Running, Stopped, Done }

/// Opaque reference to a registered job. The only pgid carrier handed out of
/// the table, so callers cannot hold a raw pgid past the job's removal.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct JobHandle {
	id: u32,
	pgid: Pid,
}

impl JobHandle {
	pub fn id(&self) -> u32 {
		self.id
	}

	pub fn pgid(&self) -> Pid {
		self.pgid
	}
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Job {
	pub pgid: Pid,
	/// Every pipeline member; the last entry carries the pipeline's status.
	pub pids: Vec<Pid>,
	pub cmd: String,
	pub state: JobState,
	pub status: i32,
	pub background: bool,
	pub id: u32,
	live: usize,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Notification {
	pub id: u32,
	pub state: JobState,
	pub cmd: String,
}

/// Bounded registry of process groups. Job ids come from a monotonic counter
/// independent of slot position, so compaction never aliases a live id.
pub struct JobTable {
	jobs: Vec<Job>,
	next_id: u32,
	notifications: Vec<Notification>,
}

impl JobTable {
	pub fn new() -> JobTable {
		JobTable {
			jobs: Vec::with_capacity(JOB_CAPACITY),
			next_id: 1,
			notifications: vec![],
		}
	}

	pub fn push(
		&mut self,
		pgid: Pid,
		pids: Vec<Pid>,
		cmd: String,
		background: bool,
	) -> Result<JobHandle, JobError> {
		if self.jobs.len() >= JOB_CAPACITY {
			return Err(JobError::TableFull);
		}
		let id = self.next_id;
		self.next_id += 1;
		let live = pids.len();
		self.jobs.push(Job {
			pgid,
			pids,
			cmd,
			state: JobState::Running,
			status: 0,
			background,
			id,
			live,
		});
		debug!(id, pgid = pgid.as_raw(), background, "job registered");
		Ok(JobHandle { id, pgid })
	}

	pub fn len(&self) -> usize {
		self.jobs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.jobs.is_empty()
	}

	pub fn running_count(&self) -> usize {
		self.jobs.iter().filter(|j| j.state == JobState::Running).count()
	}

	pub fn jobs(&self) -> &[Job] {
		&self.jobs
	}

	pub fn get(&self, id: u32) -> Option<&Job> {
		self.jobs.iter().find(|j| j.id == id)
	}

	pub fn handle(&self, id: u32) -> Option<JobHandle> {
		self.get(id).map(|j| JobHandle { id: j.id, pgid: j.pgid })
	}

	pub fn latest(&self) -> Option<JobHandle> {
		self.jobs.last().map(|j| JobHandle { id: j.id, pgid: j.pgid })
	}

	/// Accepts both `%N` and bare `N`.
	pub fn lookup_spec(&self, spec: &str) -> Result<JobHandle, JobError> {
		let digits = spec.strip_prefix('%').unwrap_or(spec);
		let id: u32 = digits
			.parse()
			.map_err(|_| JobError::NoSuchJob(spec.to_owned()))?;
		self.handle(id).ok_or_else(|| JobError::NoSuchJob(spec.to_owned()))
	}

	/// Removes a job and any notification it queued; a removed job never
	/// announces itself afterward.
	pub fn remove(&mut self, id: u32) -> Option<Job> {
		let i = self.jobs.iter().position(|j| j.id == id)?;
		self.notifications.retain(|n| n.id != id);
		Some(self.jobs.remove(i))
	}

	pub fn mark_running(&mut self, id: u32, background: bool) {
		if let Some(job) = self.jobs.iter_mut().find(|j| j.id == id) {
			job.state = JobState::Running;
			job.background = background;
		}
	}

	fn find_pid(&self, pid: Pid) -> Option<usize> {
		self.jobs.iter().position(|j| j.pids.contains(&pid))
	}

	/// Folds one `waitpid` result into the table.
	pub fn record_wait(&mut self, status: WaitStatus) {
		match status {
			WaitStatus::Exited(pid, code) => self.record_exit(pid, code),
			WaitStatus::Signaled(pid, sig, _) => self.record_exit(pid, 128 + sig as i32),
			WaitStatus::Stopped(pid, _) => self.record_stop(pid),
			WaitStatus::Continued(pid) => self.record_continue(pid),
			_ => {},
		}
	}

	fn record_exit(&mut self, pid: Pid, code: i32) {
		let Some(i) = self.find_pid(pid) else { return };
		let notification = {
			let job = &mut self.jobs[i];
			if job.pids.last() == Some(&pid) {
				job.status = code;
			}
			job.live = job.live.saturating_sub(1);
			if job.live == 0 && job.state != JobState::Done {
				job.state = JobState::Done;
				debug!(id = job.id, status = job.status, "job done");
				job.background.then(|| Notification {
					id: job.id,
					state: JobState::Done,
					cmd: job.cmd.clone(),
				})
			} else {
				None
			}
		};
		if let Some(n) = notification {
			self.notifications.push(n);
		}
	}

	fn record_stop(&mut self, pid: Pid) {
		let Some(i) = self.find_pid(pid) else { return };
		let notification = {
			let job = &mut self.jobs[i];
			if job.state == JobState::Stopped {
				None
			} else {
				job.state = JobState::Stopped;
				Some(Notification {
					id: job.id,
					state: JobState::Stopped,
					cmd: job.cmd.clone(),
				})
			}
		};
		if let Some(n) = notification {
			self.notifications.push(n);
		}
	}

	fn record_continue(&mut self, pid: Pid) {
		let Some(i) = self.find_pid(pid) else { return };
		let job = &mut self.jobs[i];
		if job.state == JobState::Stopped {
			job.state = JobState::Running;
		}
	}

	/// Non-blocking reap of every exited/stopped child, run from the main loop
	/// (never from a signal handler).
	pub fn reap(&mut self) {
		loop {
			let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
			match waitpid(Pid::from_raw(-1), Some(flags)) {
				Ok(WaitStatus::StillAlive) => break,
				Ok(status) => self.record_wait(status),
				// ECHILD: no children left
				Err(_) => break,
			}
		}
	}

	pub fn take_notifications(&mut self) -> Vec<Notification> {
		mem::take(&mut self.notifications)
	}

	/// Drops finished jobs, compacting the table. Ids are never reused.
	pub fn prune_done(&mut self) {
		self.jobs.retain(|j| j.state != JobState::Done);
	}
}
