use crate::builtin;
use crate::global::State;
use crate::redirect;
use crate::signals;
use crate::term;
use crate::types::{Command, Operator};

use std::ffi::{CString, NulError};
use std::io::{self, Write};
use std::os::unix::io::RawFd;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::{self, ForkResult, Pid};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ExecError {
	#[error("{0}")]
	Nix(#[from] nix::Error),
	#[error("{0}")]
	Io(#[from] io::Error),
	#[error("nul byte in argument: {0}")]
	Nul(#[from] NulError),
	#[error("{target}: {source}")]
	Open { target: String, source: io::Error },
	#[error("missing redirection target")]
	MissingTarget,
	#[error(transparent)]
	Job(#[from] crate::job::JobError),
}

/// Walks a command chain, applying operator semantics. Returns the last
/// observed exit status; never fails the shell itself.
pub fn execute_chain(state: &mut State, chain: &Command) -> i32 {
	let mut status = 0;
	let mut cur = Some(chain);
	while let Some(cmd) = cur {
		let mut after = cmd.next.as_deref();
		match cmd.operator {
			Operator::Pipe => {
				// Consume every stage up to and including the first non-pipe
				// operator; that stage's operator joins the pipeline to the
				// rest of the chain.
				let mut stages = vec![cmd];
				let mut joining = Operator::None;
				let mut it = cmd.next.as_deref();
				while let Some(stage) = it {
					stages.push(stage);
					it = stage.next.as_deref();
					if stage.operator != Operator::Pipe {
						joining = stage.operator;
						break;
					}
				}
				after = it;
				if stages.len() < 2 {
					// only reachable through hand-built chains; the parser
					// never emits a trailing pipe
					eprintln!("qsh: malformed pipeline");
					status = 2;
					cur = after;
					continue;
				}
				let background = joining == Operator::Background;
				status = run_group(state, &stages, background);
				match joining {
					Operator::And if status != 0 => return status,
					Operator::Or if status == 0 => return status,
					_ => {},
				}
			},
			Operator::Background => {
				status = run_stage(state, cmd, true);
			},
			op => {
				status = run_stage(state, cmd, false);
				match op {
					Operator::And if status != 0 => return status,
					Operator::Or if status == 0 => return status,
					_ => {},
				}
			},
		}
		if state.should_exit {
			return status;
		}
		cur = after;
	}
	status
}

fn run_stage(state: &mut State, cmd: &Command, background: bool) -> i32 {
	if !background {
		if let Some(b) = builtin::lookup(cmd.name()) {
			return run_builtin(state, b, cmd);
		}
	}
	run_group(state, &[cmd], background)
}

/// Builtins outside pipelines never fork: stdio is snapshotted, redirections
/// are applied in place, and the snapshot is restored whatever the handler
/// returned.
fn run_builtin(state: &mut State, b: &'static builtin::Builtin, cmd: &Command) -> i32 {
	let backup = match redirect::StdioBackup::save() {
		Ok(backup) => backup,
		Err(e) => {
			eprintln!("qsh: {}", e);
			return 1;
		},
	};
	let status = match redirect::apply_redirects(&cmd.redirects) {
		Ok(()) => (b.run)(state, &cmd.argv[1 ..]),
		Err(e) => {
			eprintln!("qsh: {}", e);
			1
		},
	};
	let _ = io::stdout().flush();
	let _ = io::stderr().flush();
	drop(backup);
	status
}

fn run_group(state: &mut State, stages: &[&Command], background: bool) -> i32 {
	match spawn_group(state, stages, background) {
		Ok(status) => status,
		Err(e) => {
			eprintln!("qsh: {}", e);
			1
		},
	}
}

/// Forks one process per stage into a single process group, with all pipes
/// allocated up front, then either waits in the foreground or registers a
/// background job.
fn spawn_group(state: &mut State, stages: &[&Command], background: bool) -> Result<i32, ExecError> {
	let n = stages.len();
	let mut pipes: Vec<(RawFd, RawFd)> = Vec::with_capacity(n.saturating_sub(1));
	for _ in 1 .. n {
		pipes.push(unistd::pipe2(OFlag::O_CLOEXEC)?);
	}

	let mut pgid: Option<Pid> = None;
	let mut pids: Vec<Pid> = Vec::with_capacity(n);
	for (i, stage) in stages.iter().enumerate() {
		match unsafe { unistd::fork() } {
			Ok(ForkResult::Parent { child }) => {
				let leader = *pgid.get_or_insert(child);
				// Mirrors the child's own setpgid; whichever side runs first
				// wins and the group exists before anyone execs.
				let _ = unistd::setpgid(child, leader);
				pids.push(child);
			},
			Ok(ForkResult::Child) => {
				child_exec(state, stage, pgid, &pipes, i, n);
			},
			Err(e) => {
				for (r, w) in &pipes {
					let _ = unistd::close(*r);
					let _ = unistd::close(*w);
				}
				for &pid in &pids {
					let _ = signal::kill(pid, Signal::SIGTERM);
					let _ = waitpid(pid, None);
				}
				return Err(e.into());
			},
		}
	}
	for (r, w) in &pipes {
		let _ = unistd::close(*r);
		let _ = unistd::close(*w);
	}

	let pgid = pgid.expect("spawn_group called with no stages");
	let cmdline = stages.iter().map(|c| c.cmdline()).collect::<Vec<_>>().join(" | ");
	debug!(pgid = pgid.as_raw(), stages = n, background, %cmdline, "group spawned");
	let handle = match state.jobs.push(pgid, pids, cmdline, background) {
		Ok(handle) => handle,
		Err(e) => {
			// table full: a foreground group is collected here so it cannot
			// linger as zombies; unregistered background children are swept
			// up by the main loop's reap
			if !background {
				while waitpid(Pid::from_raw(-pgid.as_raw()), None).is_ok() {}
			}
			return Err(e.into());
		},
	};

	if background {
		println!("[{}] {}", handle.id(), pgid);
		Ok(0)
	} else {
		let State { ref term, ref mut jobs, ref mut profiler, .. } = *state;
		let outcome = term::wait_foreground(term, jobs, profiler, handle, false);
		if !outcome.stopped {
			state.jobs.remove(handle.id());
		}
		Ok(outcome.status)
	}
}

fn child_exec(
	state: &mut State,
	stage: &Command,
	pgid: Option<Pid>,
	pipes: &[(RawFd, RawFd)],
	i: usize,
	n: usize,
) -> ! {
	signals::reset_for_child();
	match pgid {
		None => {
			let _ = unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0));
		},
		Some(leader) => {
			let _ = unistd::setpgid(Pid::from_raw(0), leader);
		},
	}
	let status = match do_child(state, stage, pipes, i, n) {
		Ok(status) => status,
		Err(e) => {
			let _ = writeln!(io::stderr(), "qsh: {}", e);
			1
		},
	};
	let _ = io::stdout().flush();
	let _ = io::stderr().flush();
	unsafe { libc::_exit(status) }
}

fn do_child(
	state: &mut State,
	stage: &Command,
	pipes: &[(RawFd, RawFd)],
	i: usize,
	n: usize,
) -> Result<i32, ExecError> {
	if i > 0 {
		unistd::dup2(pipes[i - 1].0, libc::STDIN_FILENO)?;
	}
	if i < n - 1 {
		unistd::dup2(pipes[i].1, libc::STDOUT_FILENO)?;
	}
	for (r, w) in pipes {
		let _ = unistd::close(*r);
		let _ = unistd::close(*w);
	}
	// Explicit redirections are applied after pipe wiring and override it;
	// middle stages never carry any.
	if i == 0 || i == n - 1 {
		redirect::apply_redirects(&stage.redirects)?;
	}
	if let Some(b) = builtin::lookup(stage.name()) {
		return Ok((b.run)(state, &stage.argv[1 ..]));
	}
	exec_external(state, stage)
}

fn exec_external(state: &State, stage: &Command) -> Result<i32, ExecError> {
	let mut argv: Vec<CString> = Vec::with_capacity(stage.argv.len());
	for arg in &stage.argv {
		argv.push(CString::new(arg.as_str())?);
	}
	let path = if stage.name().contains('/') {
		Some(CString::new(stage.name())?)
	} else {
		state.search_cache.lookup(stage.name()).cloned()
	};
	let Some(path) = path else {
		return Ok(report_not_found(stage.name()));
	};
	match unistd::execv(&path, &argv) {
		Err(Errno::ENOENT) => Ok(report_not_found(stage.name())),
		Err(e) => Err(e.into()),
		Ok(infallible) => match infallible {},
	}
}

fn report_not_found(name: &str) -> i32 {
	let mut stderr = io::stderr();
	let _ = writeln!(stderr, "qsh: command not found: {}", name);
	let _ = stderr.flush();
	127
}
