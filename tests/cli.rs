use std::fs;
use std::io::Write;
use std::process::{Command, Output, Stdio};
use std::time::Instant;

fn qsh() -> Command {
	Command::new(env!("CARGO_BIN_EXE_qsh"))
}

fn run(line: &str) -> Output {
	qsh().arg("-c").arg(line).output().unwrap()
}

fn stdout_of(out: &Output) -> String {
	String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr_of(out: &Output) -> String {
	String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
fn echo_hello() {
	let out = run("echo hello");
	assert_eq!(out.status.code(), Some(0));
	assert_eq!(stdout_of(&out), "hello\n");
}

#[test]
fn quoting_preserves_words() {
	let out = run("echo 'a b'");
	assert_eq!(stdout_of(&out), "a b\n");
}

#[test]
fn command_not_found_is_127() {
	let out = run("qsh-no-such-command-xyzzy");
	assert_eq!(out.status.code(), Some(127));
	assert!(stderr_of(&out).contains("command not found"));
}

#[test]
fn and_short_circuits_on_failure() {
	let out = run("false && echo x");
	assert_eq!(out.status.code(), Some(1));
	assert_eq!(stdout_of(&out), "");
}

#[test]
fn and_continues_on_success() {
	let out = run("true && echo x");
	assert_eq!(out.status.code(), Some(0));
	assert_eq!(stdout_of(&out), "x\n");
}

#[test]
fn or_short_circuits_on_success() {
	let out = run("true || echo x");
	assert_eq!(out.status.code(), Some(0));
	assert_eq!(stdout_of(&out), "");
}

#[test]
fn or_continues_on_failure() {
	let out = run("false || echo x");
	assert_eq!(out.status.code(), Some(0));
	assert_eq!(stdout_of(&out), "x\n");
}

#[test]
fn sequence_runs_both() {
	let out = run("echo a ; echo b");
	assert_eq!(stdout_of(&out), "a\nb\n");
}

#[test]
fn pipeline_moves_data() {
	let out = run("echo hi | cat | cat");
	assert_eq!(out.status.code(), Some(0));
	assert_eq!(stdout_of(&out), "hi\n");
}

#[test]
fn pipeline_status_is_last_stage() {
	assert_eq!(run("false | true").status.code(), Some(0));
	assert_eq!(run("true | false").status.code(), Some(1));
}

#[test]
fn pipeline_feeds_into_chain_operators() {
	let out = run("echo hi | cat && echo ok");
	assert_eq!(stdout_of(&out), "hi\nok\n");
	let out = run("true | false && echo never");
	assert_eq!(out.status.code(), Some(1));
	assert_eq!(stdout_of(&out), "");
}

#[test]
fn output_and_input_redirection() {
	let dir = tempfile::tempdir().unwrap();
	let f = dir.path().join("f.txt");
	let out = run(&format!("echo hi > {}", f.display()));
	assert_eq!(out.status.code(), Some(0));
	assert_eq!(fs::read_to_string(&f).unwrap(), "hi\n");

	let out = run(&format!("cat < {}", f.display()));
	assert_eq!(stdout_of(&out), "hi\n");
}

#[test]
fn append_redirection() {
	let dir = tempfile::tempdir().unwrap();
	let f = dir.path().join("f.txt");
	run(&format!("echo one > {}", f.display()));
	run(&format!("echo two >> {}", f.display()));
	assert_eq!(fs::read_to_string(&f).unwrap(), "one\ntwo\n");
}

#[test]
fn output_redirection_creates_parent_dirs() {
	let dir = tempfile::tempdir().unwrap();
	let f = dir.path().join("a/b/f.txt");
	let out = run(&format!("echo deep > {}", f.display()));
	assert_eq!(out.status.code(), Some(0));
	assert_eq!(fs::read_to_string(&f).unwrap(), "deep\n");
}

#[test]
fn stderr_redirection() {
	let dir = tempfile::tempdir().unwrap();
	let err = dir.path().join("err.txt");
	let out = run(&format!("ls {}/definitely-missing 2> {}", dir.path().display(), err.display()));
	assert_ne!(out.status.code(), Some(0));
	assert_eq!(stderr_of(&out), "");
	assert!(!fs::read_to_string(&err).unwrap().is_empty());
}

#[test]
fn stderr_to_stdout_follows_earlier_redirection() {
	let dir = tempfile::tempdir().unwrap();
	let f = dir.path().join("all.txt");
	let out = run(&format!("ls {}/definitely-missing > {} 2>&1", dir.path().display(), f.display()));
	assert_ne!(out.status.code(), Some(0));
	assert_eq!(stderr_of(&out), "");
	assert!(!fs::read_to_string(&f).unwrap().is_empty());
}

#[test]
fn combined_output_redirection() {
	let dir = tempfile::tempdir().unwrap();
	let f = dir.path().join("both.txt");
	let out = run(&format!("ls {}/definitely-missing &> {}", dir.path().display(), f.display()));
	assert_ne!(out.status.code(), Some(0));
	assert_eq!(stderr_of(&out), "");
	assert!(!fs::read_to_string(&f).unwrap().is_empty());
}

// First stage's explicit output redirection wins over the pipe.
#[test]
fn redirection_overrides_pipe() {
	let dir = tempfile::tempdir().unwrap();
	let f = dir.path().join("f.txt");
	let out = run(&format!("echo hi > {} | cat", f.display()));
	assert_eq!(out.status.code(), Some(0));
	assert_eq!(stdout_of(&out), "");
	assert_eq!(fs::read_to_string(&f).unwrap(), "hi\n");
}

#[test]
fn heredoc_feeds_stdin() {
	let mut child = qsh()
		.arg("-c")
		.arg("cat << EOF")
		.stdin(Stdio::piped())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.spawn()
		.unwrap();
	child
		.stdin
		.as_mut()
		.unwrap()
		.write_all(b"first\nsecond\nEOF\nignored\n")
		.unwrap();
	let out = child.wait_with_output().unwrap();
	assert_eq!(out.status.code(), Some(0));
	assert_eq!(String::from_utf8_lossy(&out.stdout), "first\nsecond\n");
}

#[test]
fn background_returns_immediately() {
	let started = Instant::now();
	let out = run("sleep 2 &");
	assert_eq!(out.status.code(), Some(0));
	assert!(started.elapsed().as_millis() < 1500, "background launch blocked");
	// exactly one job was registered
	assert!(stdout_of(&out).starts_with("[1] "));
}

#[test]
fn background_job_listed_by_jobs() {
	let out = run("sleep 0.5 & jobs");
	assert_eq!(out.status.code(), Some(0));
	let stdout = stdout_of(&out);
	assert!(stdout.contains("Running"), "jobs output: {}", stdout);
	assert!(stdout.contains("sleep 0.5"), "jobs output: {}", stdout);
}

#[test]
fn wait_blocks_until_background_job_finishes() {
	let started = Instant::now();
	let out = run("sleep 0.3 & wait");
	assert_eq!(out.status.code(), Some(0));
	assert!(started.elapsed().as_millis() >= 250, "wait returned early");
}

#[test]
fn failing_command_reports_its_status() {
	let dir = tempfile::tempdir().unwrap();
	let out = run(&format!("ls {}/nonexistentfile123", dir.path().display()));
	let code = out.status.code().unwrap();
	assert_ne!(code, 0);
	assert!(!stderr_of(&out).is_empty());
}

#[test]
fn exit_builtin_sets_status() {
	assert_eq!(run("exit 7").status.code(), Some(7));
	assert_eq!(run("exit").status.code(), Some(0));
}

#[test]
fn exit_stops_the_chain() {
	let out = run("exit 0 ; echo x");
	assert_eq!(out.status.code(), Some(0));
	assert_eq!(stdout_of(&out), "");
}

#[test]
fn cd_builtin_changes_directory() {
	let out = run("cd / ; pwd");
	assert_eq!(out.status.code(), Some(0));
	assert_eq!(stdout_of(&out), "/\n");
}

#[test]
fn builtin_redirection_is_bracketed() {
	let dir = tempfile::tempdir().unwrap();
	let f = dir.path().join("help.txt");
	let out = run(&format!("help > {} ; echo after", f.display()));
	assert_eq!(out.status.code(), Some(0));
	// stdout was restored before the second stage ran
	assert_eq!(stdout_of(&out), "after\n");
	assert!(fs::read_to_string(&f).unwrap().contains("Built-in commands"));
}

#[test]
fn environment_variables_expand() {
	let out = qsh()
		.arg("-c")
		.arg("echo $QSH_E2E_VAR")
		.env("QSH_E2E_VAR", "seen")
		.output()
		.unwrap();
	assert_eq!(String::from_utf8_lossy(&out.stdout), "seen\n");
}

#[test]
fn syntax_error_is_reported_not_fatal() {
	let out = run("a | | b");
	assert_eq!(out.status.code(), Some(2));
	assert!(stderr_of(&out).contains("qsh:"));
}
