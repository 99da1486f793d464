use std::env;
use std::io::{self, BufRead, Write};
use std::process;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use qsh::eval;
use qsh::global::State;
use qsh::history::History;
use qsh::job::JobState;
use qsh::parser;
use qsh::signals;
use qsh::vars;

fn run_line(state: &mut State, line: &str) -> i32 {
	if line.trim().is_empty() {
		return state.last_status;
	}
	let line = state.aliases.expand_first_word(line);
	let line = vars::expand(&line, &state.vars, state.last_status);
	match parser::parse(&line) {
		Ok(Some(chain)) => eval::execute_chain(state, &chain),
		Ok(None) => state.last_status,
		Err(e) => {
			eprintln!("qsh: {}", e);
			2
		},
	}
}

fn drain_job_events(state: &mut State) {
	if signals::take_sigchld() {
		state.jobs.reap();
	}
	for n in state.jobs.take_notifications() {
		let label = match n.state {
			JobState::Done => "Done",
			JobState::Stopped => "Stopped",
			JobState::Running => continue,
		};
		println!("[{}] {}\t{}", n.id, label, n.cmd);
	}
	state.jobs.prune_done();
}

fn prompt() -> String {
	match env::current_dir() {
		Ok(cwd) => format!("qsh:{}$ ", cwd.display()),
		Err(_) => "qsh$ ".to_owned(),
	}
}

fn repl(state: &mut State) -> Result<()> {
	let stdin = io::stdin();
	let mut input = stdin.lock();
	loop {
		drain_job_events(state);
		if state.should_exit {
			break;
		}

		let mut stdout = io::stdout();
		stdout.write_all(prompt().as_bytes())?;
		stdout.flush()?;

		let mut line = String::new();
		match input.read_line(&mut line) {
			Ok(0) => {
				println!();
				break;
			},
			Ok(_) => {},
			Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
			Err(e) => return Err(e.into()),
		}

		let line = line.trim_end_matches('\n');
		let status = run_line(state, line);
		if !line.trim().is_empty() {
			state.history.add(line, status);
		}
		state.last_status = status;
	}
	Ok(())
}

fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.with_writer(io::stderr)
		.init();

	let mut state = State::new();
	if let Err(e) = signals::install() {
		eprintln!("qsh: failed to install signal handlers: {}", e);
	}

	let args: Vec<String> = env::args().collect();
	if args.len() >= 2 && args[1] == "-c" {
		let line = args.get(2).map(String::as_str).unwrap_or("");
		let status = run_line(&mut state, line);
		process::exit(status);
	}

	state.history = History::new(History::default_path());
	if state.term.interactive {
		println!("qsh - a Unix shell with syscall profiling");
		println!("Type 'help' for a list of built-in commands");
	}
	repl(&mut state)?;
	let _ = state.history.save();
	process::exit(state.last_status);
}
