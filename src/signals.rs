use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use nix::sys::signal::{sigaction, signal, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::Pid;
use tracing::debug;

// Shared with the signal handlers; handlers may only touch these atomics and
// call async-signal-safe libc functions.
static SIGCHLD_PENDING: AtomicBool = AtomicBool::new(false);
static FOREGROUND_PGID: AtomicI32 = AtomicI32::new(0);

extern "C" fn on_sigchld(_: libc::c_int) {
	SIGCHLD_PENDING.store(true, Ordering::Relaxed);
}

extern "C" fn on_sigint(_: libc::c_int) {
	forward(libc::SIGINT);
}

extern "C" fn on_sigtstp(_: libc::c_int) {
	forward(libc::SIGTSTP);
}

// Negative pid addresses the whole foreground group, so every pipeline stage
// sees the signal, not just the leader. The shell is in its own group and is
// never part of the target.
fn forward(sig: libc::c_int) {
	let pgid = FOREGROUND_PGID.load(Ordering::Relaxed);
	if pgid > 0 {
		unsafe {
			libc::kill(-pgid, sig);
		}
	}
}

pub fn install() -> nix::Result<()> {
	let flags = SaFlags::SA_RESTART;
	let mask = SigSet::empty();
	unsafe {
		sigaction(Signal::SIGCHLD, &SigAction::new(SigHandler::Handler(on_sigchld), flags, mask))?;
		sigaction(Signal::SIGINT, &SigAction::new(SigHandler::Handler(on_sigint), flags, mask))?;
		sigaction(Signal::SIGTSTP, &SigAction::new(SigHandler::Handler(on_sigtstp), flags, mask))?;
	}
	debug!("signal handlers installed");
	Ok(())
}

/// Interactive shells must not be stopped or killed by terminal-generated
/// job-control signals aimed at their children.
pub fn ignore_job_control() {
	unsafe {
		let _ = signal(Signal::SIGQUIT, SigHandler::SigIgn);
		let _ = signal(Signal::SIGTTOU, SigHandler::SigIgn);
		let _ = signal(Signal::SIGTTIN, SigHandler::SigIgn);
	}
}

/// Restores default dispositions in a forked child, between fork and exec.
pub fn reset_for_child() {
	let defaults = [
		Signal::SIGINT,
		Signal::SIGQUIT,
		Signal::SIGTSTP,
		Signal::SIGTTOU,
		Signal::SIGTTIN,
		Signal::SIGCHLD,
	];
	for sig in defaults {
		unsafe {
			let _ = signal(sig, SigHandler::SigDfl);
		}
	}
}

pub fn set_foreground(pgid: Pid) {
	FOREGROUND_PGID.store(pgid.as_raw(), Ordering::Relaxed);
}

pub fn clear_foreground() {
	FOREGROUND_PGID.store(0, Ordering::Relaxed);
}

pub fn foreground_pgid() -> Option<Pid> {
	match FOREGROUND_PGID.load(Ordering::Relaxed) {
		0 => None,
		raw => Some(Pid::from_raw(raw)),
	}
}

/// Consumes the pending-SIGCHLD flag. The caller owns the actual reaping.
pub fn take_sigchld() -> bool {
	SIGCHLD_PENDING.swap(false, Ordering::Relaxed)
}
