use crate::job::{JobHandle, JobState, JobTable};
use crate::profiler::Profiler;
use crate::signals;

use std::os::unix::io::RawFd;

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::sys::termios::{tcgetattr, tcsetattr, SetArg, Termios};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{self, Pid};
use tracing::debug;

/// The shell's side of terminal ownership: its own process group, the
/// controlling fd, and the attributes restored after every foreground job.
pub struct Terminal {
	pub interactive: bool,
	fd: RawFd,
	shell_pgid: Pid,
	saved_tmodes: Option<Termios>,
}

impl Terminal {
	pub fn init() -> Terminal {
		let fd = libc::STDIN_FILENO;
		let interactive = unistd::isatty(fd).unwrap_or(false);
		let mut shell_pgid = unistd::getpgrp();
		let mut saved_tmodes = None;
		if interactive {
			signals::ignore_job_control();
			saved_tmodes = tcgetattr(fd).ok();
			let pid = unistd::getpid();
			if shell_pgid != pid {
				let _ = unistd::setpgid(pid, pid);
				shell_pgid = pid;
			}
			let _ = unistd::tcsetpgrp(fd, shell_pgid);
		}
		debug!(interactive, shell_pgid = shell_pgid.as_raw(), "terminal initialized");
		Terminal { interactive, fd, shell_pgid, saved_tmodes }
	}

	pub fn shell_pgid(&self) -> Pid {
		self.shell_pgid
	}

	// tcsetpgrp/tcsetattr failures are tolerated: in non-interactive contexts
	// there is no terminal to hand over.
	fn give_to(&self, pgid: Pid) {
		if self.interactive {
			let _ = unistd::tcsetpgrp(self.fd, pgid);
		}
	}

	fn reclaim(&self) {
		if self.interactive {
			if let Some(tmodes) = &self.saved_tmodes {
				let _ = tcsetattr(self.fd, SetArg::TCSADRAIN, tmodes);
			}
			let _ = unistd::tcsetpgrp(self.fd, self.shell_pgid);
		}
	}
}

pub struct ForegroundOutcome {
	pub status: i32,
	pub stopped: bool,
}

/// Hands the terminal to the job's process group, optionally continues it, and
/// blocks until every member has exited or the group has stopped. The terminal
/// and foreground-pgid field are restored before returning, whatever happened.
pub fn wait_foreground(
	term: &Terminal,
	jobs: &mut JobTable,
	profiler: &mut Profiler,
	handle: JobHandle,
	cont: bool,
) -> ForegroundOutcome {
	signals::set_foreground(handle.pgid());
	term.give_to(handle.pgid());
	if cont {
		let _ = killpg(handle.pgid(), Signal::SIGCONT);
	}

	let mut stopped = false;
	loop {
		match waitpid(Pid::from_raw(-handle.pgid().as_raw()), Some(WaitPidFlag::WUNTRACED)) {
			Ok(status) => {
				if let Some(pid) = status.pid() {
					profiler.collect(pid, status);
				}
				jobs.record_wait(status);
				if let WaitStatus::Stopped(..) = status {
					stopped = true;
					break;
				}
				match jobs.get(handle.id()) {
					Some(job) if job.state == JobState::Running => continue,
					_ => break,
				}
			},
			Err(Errno::EINTR) => continue,
			// ECHILD: every member already reaped
			Err(_) => break,
		}
	}

	term.reclaim();
	signals::clear_foreground();

	let status = if stopped {
		debug!(id = handle.id(), "foreground job stopped");
		128 + Signal::SIGTSTP as i32
	} else {
		jobs.get(handle.id()).map_or(0, |j| j.status)
	};
	ForegroundOutcome { status, stopped }
}
