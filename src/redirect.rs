use crate::eval::ExecError;
use crate::types::{Redirect, RedirectKind};

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, Seek, SeekFrom, Write};
use std::os::unix::io::{IntoRawFd, RawFd};
use std::path::Path;

use nix::unistd;

fn open_target(kind: RedirectKind, path: &Path) -> io::Result<File> {
	match kind {
		RedirectKind::Input => File::open(path),
		RedirectKind::Output | RedirectKind::ErrOutput | RedirectKind::BothOutput => {
			OpenOptions::new().write(true).create(true).truncate(true).open(path)
		},
		RedirectKind::Append | RedirectKind::ErrAppend => {
			OpenOptions::new().append(true).create(true).open(path)
		},
		RedirectKind::ErrToOut | RedirectKind::Heredoc => unreachable!(),
	}
}

fn ensure_parent_dir(path: &Path) -> io::Result<()> {
	if let Some(parent) = path.parent() {
		if !parent.as_os_str().is_empty() {
			fs::create_dir_all(parent)?;
		}
	}
	Ok(())
}

/// Captures here-document input up to the delimiter line into an anonymous,
/// already-unlinked temporary file, rewound to the start.
pub fn read_heredoc<R: BufRead>(input: &mut R, delimiter: &str) -> io::Result<File> {
	let mut file = tempfile::tempfile()?;
	let mut line = String::new();
	loop {
		line.clear();
		if input.read_line(&mut line)? == 0 {
			break;
		}
		if line.strip_suffix('\n').unwrap_or(&line) == delimiter {
			break;
		}
		file.write_all(line.as_bytes())?;
	}
	file.seek(SeekFrom::Start(0))?;
	Ok(file)
}

/// Overlays a stage's redirection list onto fds 0/1/2 of the current process
/// image. Must only run in a child image or inside a `StdioBackup` bracket.
pub fn apply_redirects(redirects: &[Redirect]) -> Result<(), ExecError> {
	for redirect in redirects {
		match redirect.kind {
			RedirectKind::ErrToOut => {
				unistd::dup2(libc::STDOUT_FILENO, libc::STDERR_FILENO)?;
			},
			RedirectKind::Heredoc => {
				let delimiter = redirect.target.as_deref().ok_or(ExecError::MissingTarget)?;
				let file = read_heredoc(&mut io::stdin().lock(), delimiter)?;
				let fd = file.into_raw_fd();
				unistd::dup2(fd, libc::STDIN_FILENO)?;
				unistd::close(fd)?;
			},
			kind => {
				let target = redirect.target.as_deref().ok_or(ExecError::MissingTarget)?;
				let path = Path::new(target);
				if kind != RedirectKind::Input {
					ensure_parent_dir(path).map_err(|source| ExecError::Open {
						target: target.to_owned(),
						source,
					})?;
				}
				let file = open_target(kind, path).map_err(|source| ExecError::Open {
					target: target.to_owned(),
					source,
				})?;
				let fd = file.into_raw_fd();
				match kind {
					RedirectKind::Input => {
						unistd::dup2(fd, libc::STDIN_FILENO)?;
					},
					RedirectKind::Output | RedirectKind::Append => {
						unistd::dup2(fd, libc::STDOUT_FILENO)?;
					},
					RedirectKind::ErrOutput | RedirectKind::ErrAppend => {
						unistd::dup2(fd, libc::STDERR_FILENO)?;
					},
					RedirectKind::BothOutput => {
						unistd::dup2(fd, libc::STDOUT_FILENO)?;
						unistd::dup2(fd, libc::STDERR_FILENO)?;
					},
					_ => unreachable!(),
				}
				unistd::close(fd)?;
			},
		}
	}
	Ok(())
}

/// Snapshot of the shell's own stdio, taken before a builtin runs with
/// redirections applied in place. Dropping the backup restores fds 0/1/2
/// unconditionally.
pub struct StdioBackup {
	saved: [RawFd; 3],
}

impl StdioBackup {
	pub fn save() -> nix::Result<StdioBackup> {
		Ok(StdioBackup {
			saved: [unistd::dup(0)?, unistd::dup(1)?, unistd::dup(2)?],
		})
	}
}

impl Drop for StdioBackup {
	fn drop(&mut self) {
		for (fd, &saved) in self.saved.iter().enumerate() {
			let _ = unistd::dup2(saved, fd as RawFd);
			let _ = unistd::close(saved);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::{Cursor, Read};

	#[test]
	fn heredoc_stops_at_delimiter() {
		let mut input = Cursor::new("one\ntwo\nEOF\nafter\n");
		let mut file = read_heredoc(&mut input, "EOF").unwrap();
		let mut captured = String::new();
		file.read_to_string(&mut captured).unwrap();
		assert_eq!(captured, "one\ntwo\n");

		// the reader is left positioned after the delimiter line
		let mut rest = String::new();
		input.read_to_string(&mut rest).unwrap();
		assert_eq!(rest, "after\n");
	}

	#[test]
	fn heredoc_tolerates_missing_delimiter() {
		let mut input = Cursor::new("only\n");
		let mut file = read_heredoc(&mut input, "EOF").unwrap();
		let mut captured = String::new();
		file.read_to_string(&mut captured).unwrap();
		assert_eq!(captured, "only\n");
	}

	#[test]
	fn open_modes() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("f");

		let mut f = open_target(RedirectKind::Output, &path).unwrap();
		f.write_all(b"first\n").unwrap();
		drop(f);
		let mut f = open_target(RedirectKind::Append, &path).unwrap();
		f.write_all(b"second\n").unwrap();
		drop(f);
		assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");

		let mut f = open_target(RedirectKind::Output, &path).unwrap();
		f.write_all(b"third\n").unwrap();
		drop(f);
		assert_eq!(fs::read_to_string(&path).unwrap(), "third\n");

		assert!(open_target(RedirectKind::Input, &dir.path().join("missing")).is_err());
	}

	#[test]
	fn parent_dirs_created_for_outputs() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("a/b/out");
		ensure_parent_dir(&path).unwrap();
		assert!(path.parent().unwrap().is_dir());
	}
}
