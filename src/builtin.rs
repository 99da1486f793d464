use crate::global::State;
use crate::job::{JobHandle, JobState};
use crate::term;

use std::env;
use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::Pid;

pub struct Builtin {
	pub name: &'static str,
	pub run: fn(&mut State, &[String]) -> i32,
	pub help: &'static str,
}

pub static BUILTINS: &[Builtin] = &[
	Builtin { name: "alias", run: builtin_alias, help: "Define or list command aliases" },
	Builtin { name: "bg", run: builtin_bg, help: "Continue a stopped job in the background" },
	Builtin { name: "cd", run: builtin_cd, help: "Change the current directory" },
	Builtin { name: "exit", run: builtin_exit, help: "Exit the shell" },
	Builtin { name: "export", run: builtin_export, help: "Export variables to the environment" },
	Builtin { name: "fg", run: builtin_fg, help: "Bring a job to the foreground" },
	Builtin { name: "help", run: builtin_help, help: "Show help for built-in commands" },
	Builtin { name: "history", run: builtin_history, help: "Show command history" },
	Builtin { name: "jobs", run: builtin_jobs, help: "List background and stopped jobs" },
	Builtin { name: "kill", run: builtin_kill, help: "Send a signal to a job or process" },
	Builtin { name: "profile", run: builtin_profile, help: "Manage syscall profiling" },
	Builtin { name: "rehash", run: builtin_rehash, help: "Rebuild the command search cache" },
	Builtin { name: "unalias", run: builtin_unalias, help: "Remove command aliases" },
	Builtin { name: "unset", run: builtin_unset, help: "Remove shell variables" },
	Builtin { name: "wait", run: builtin_wait, help: "Wait for background jobs to finish" },
];

/// Case-sensitive exact lookup; unknown names fall through to external
/// execution.
pub fn lookup(name: &str) -> Option<&'static Builtin> {
	BUILTINS.iter().find(|b| b.name == name)
}

fn builtin_cd(state: &mut State, args: &[String]) -> i32 {
	let (target, announce) = match args.first().map(String::as_str) {
		Some("-") => match state.previous_dir.clone() {
			Some(prev) => (prev, true),
			None => {
				eprintln!("qsh: cd: no previous directory");
				return 1;
			},
		},
		Some(path) => (PathBuf::from(path), false),
		None => match env::var_os("HOME") {
			Some(home) => (PathBuf::from(home), false),
			None => {
				eprintln!("qsh: cd: no home directory");
				return 1;
			},
		},
	};
	let before = env::current_dir().ok();
	match env::set_current_dir(&target) {
		Ok(()) => {
			state.previous_dir = before;
			if announce {
				println!("{}", target.display());
			}
			0
		},
		Err(e) => {
			eprintln!("qsh: cd: {}: {}", target.display(), e);
			1
		},
	}
}

fn builtin_exit(state: &mut State, args: &[String]) -> i32 {
	state.should_exit = true;
	match args.first() {
		None => state.last_status,
		Some(arg) => match arg.parse::<i32>() {
			Ok(status) => status,
			Err(_) => {
				eprintln!("qsh: exit: numeric argument required");
				2
			},
		},
	}
}

fn builtin_help(_: &mut State, _: &[String]) -> i32 {
	println!("Built-in commands:");
	for b in BUILTINS {
		println!("  {:<10} {}", b.name, b.help);
	}
	0
}

fn builtin_history(state: &mut State, _: &[String]) -> i32 {
	for (i, entry) in state.history.iter().enumerate() {
		println!("{:5}  {}", i + 1, entry.line);
	}
	0
}

fn builtin_export(state: &mut State, args: &[String]) -> i32 {
	if args.is_empty() {
		let mut pairs: Vec<(&String, &String)> = state.vars.iter().collect();
		pairs.sort();
		for (name, value) in pairs {
			println!("export {}={}", name, value);
		}
		return 0;
	}
	for arg in args {
		match arg.split_once('=') {
			Some((name, value)) => state.vars.export(name, value),
			None => {
				let value = state.vars.get(arg).unwrap_or_default();
				state.vars.export(arg, &value);
			},
		}
	}
	0
}

fn builtin_unset(state: &mut State, args: &[String]) -> i32 {
	for arg in args {
		state.vars.unset(arg);
	}
	0
}

fn builtin_alias(state: &mut State, args: &[String]) -> i32 {
	if args.is_empty() {
		let mut pairs: Vec<(&String, &String)> = state.aliases.iter().collect();
		pairs.sort();
		for (name, value) in pairs {
			println!("alias {}='{}'", name, value);
		}
		return 0;
	}
	let mut status = 0;
	for arg in args {
		match arg.split_once('=') {
			Some((name, value)) => state.aliases.set(name, value),
			None => match state.aliases.get(arg) {
				Some(value) => println!("alias {}='{}'", arg, value),
				None => {
					eprintln!("qsh: alias: {}: not found", arg);
					status = 1;
				},
			},
		}
	}
	status
}

fn builtin_unalias(state: &mut State, args: &[String]) -> i32 {
	let mut status = 0;
	for arg in args {
		if !state.aliases.unset(arg) {
			eprintln!("qsh: unalias: {}: not found", arg);
			status = 1;
		}
	}
	status
}

fn builtin_rehash(state: &mut State, _: &[String]) -> i32 {
	state.search_cache.rehash();
	0
}

fn state_label(state: JobState) -> &'static str {
	match state {
		JobState::Running => "Running",
		JobState::Stopped => "Stopped",
		JobState::Done => "Done",
	}
}

fn builtin_jobs(state: &mut State, _: &[String]) -> i32 {
	for job in state.jobs.jobs() {
		let suffix = if job.background && job.state == JobState::Running { " &" } else { "" };
		println!("[{}] {}\t{}{}", job.id, state_label(job.state), job.cmd, suffix);
	}
	0
}

fn resolve_jobspec(state: &State, spec: Option<&String>) -> Result<JobHandle, i32> {
	match spec {
		Some(s) => state.jobs.lookup_spec(s).map_err(|e| {
			eprintln!("qsh: {}", e);
			1
		}),
		None => state.jobs.latest().ok_or_else(|| {
			eprintln!("qsh: no current job");
			1
		}),
	}
}

fn builtin_fg(state: &mut State, args: &[String]) -> i32 {
	let handle = match resolve_jobspec(state, args.first()) {
		Ok(handle) => handle,
		Err(status) => return status,
	};
	let cont = state.jobs.get(handle.id()).map(|j| j.state) == Some(JobState::Stopped);
	if let Some(job) = state.jobs.get(handle.id()) {
		println!("{}", job.cmd);
	}
	state.jobs.mark_running(handle.id(), false);
	let State { ref term, ref mut jobs, ref mut profiler, .. } = *state;
	let outcome = term::wait_foreground(term, jobs, profiler, handle, cont);
	if !outcome.stopped {
		state.jobs.remove(handle.id());
	}
	outcome.status
}

fn builtin_bg(state: &mut State, args: &[String]) -> i32 {
	let handle = match resolve_jobspec(state, args.first()) {
		Ok(handle) => handle,
		Err(status) => return status,
	};
	if let Err(e) = killpg(handle.pgid(), Signal::SIGCONT) {
		eprintln!("qsh: bg: {}", e);
		return 1;
	}
	state.jobs.mark_running(handle.id(), true);
	if let Some(job) = state.jobs.get(handle.id()) {
		println!("[{}] {} &", job.id, job.cmd);
	}
	0
}

fn wait_one(state: &mut State, handle: JobHandle) -> i32 {
	loop {
		match state.jobs.get(handle.id()) {
			None => return 0,
			Some(job) if job.state != JobState::Running => break,
			Some(_) => {},
		}
		match waitpid(Pid::from_raw(-handle.pgid().as_raw()), Some(WaitPidFlag::WUNTRACED)) {
			Ok(status) => state.jobs.record_wait(status),
			Err(Errno::EINTR) => continue,
			// ECHILD: already reaped elsewhere
			Err(_) => break,
		}
	}
	let (status, done) = match state.jobs.get(handle.id()) {
		Some(job) => (job.status, job.state == JobState::Done),
		None => (0, false),
	};
	if done {
		state.jobs.remove(handle.id());
	}
	status
}

fn builtin_wait(state: &mut State, args: &[String]) -> i32 {
	let handles: Vec<JobHandle> = if args.is_empty() {
		state
			.jobs
			.jobs()
			.iter()
			.filter(|j| j.background && j.state == JobState::Running)
			.filter_map(|j| state.jobs.handle(j.id))
			.collect()
	} else {
		let mut handles = vec![];
		for arg in args {
			match state.jobs.lookup_spec(arg) {
				Ok(handle) => handles.push(handle),
				Err(e) => {
					eprintln!("qsh: {}", e);
					return 1;
				},
			}
		}
		handles
	};
	let mut status = 0;
	for handle in handles {
		status = wait_one(state, handle);
	}
	status
}

fn parse_signal(s: &str) -> Option<Signal> {
	if let Ok(n) = s.parse::<i32>() {
		return Signal::try_from(n).ok();
	}
	let name = if s.starts_with("SIG") { s.to_owned() } else { format!("SIG{}", s) };
	name.parse::<Signal>().ok()
}

fn builtin_kill(state: &mut State, args: &[String]) -> i32 {
	let mut sig = Signal::SIGTERM;
	let mut targets = args;
	if let Some(first) = args.first() {
		if let Some(rest) = first.strip_prefix('-') {
			match parse_signal(rest) {
				Some(parsed) => {
					sig = parsed;
					targets = &args[1 ..];
				},
				None => {
					eprintln!("qsh: kill: invalid signal: {}", rest);
					return 1;
				},
			}
		}
	}
	if targets.is_empty() {
		eprintln!("usage: kill [-signal] %job|pid ...");
		return 1;
	}
	let mut status = 0;
	for target in targets {
		if target.starts_with('%') {
			match state.jobs.lookup_spec(target) {
				Ok(handle) => {
					if let Err(e) = killpg(handle.pgid(), sig) {
						eprintln!("qsh: kill: {}: {}", target, e);
						status = 1;
					}
				},
				Err(e) => {
					eprintln!("qsh: {}", e);
					status = 1;
				},
			}
		} else {
			match target.parse::<i32>() {
				Ok(pid) => {
					if let Err(e) = kill(Pid::from_raw(pid), sig) {
						eprintln!("qsh: kill: {}: {}", target, e);
						status = 1;
					}
				},
				Err(_) => {
					eprintln!("qsh: kill: invalid target: {}", target);
					status = 1;
				},
			}
		}
	}
	status
}

fn builtin_profile(state: &mut State, args: &[String]) -> i32 {
	match args.first().map(String::as_str) {
		Some("on") => {
			if state.profiler.enable() {
				println!("Profiling enabled");
			} else {
				println!("Profiling already enabled");
			}
			0
		},
		Some("off") => {
			if state.profiler.disable() {
				println!("Profiling disabled");
			} else {
				println!("Profiling was not enabled");
			}
			0
		},
		Some("status") => {
			let word = if state.profiler.is_enabled() { "enabled" } else { "disabled" };
			println!("Profiling is {}", word);
			0
		},
		Some("report") => {
			let _ = state.profiler.report(&mut io::stdout());
			0
		},
		_ => {
			eprintln!("usage: profile <on|off|status|report>");
			1
		},
	}
}
