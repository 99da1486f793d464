use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

pub const MAX_HISTORY_ENTRIES: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
	pub line: String,
	pub status: i32,
}

/// Bounded command history. Entries are recorded after execution together with
/// the resulting exit status; persistence is best-effort plain text.
pub struct History {
	entries: Vec<HistoryEntry>,
	path: Option<PathBuf>,
}

impl History {
	pub fn new(path: Option<PathBuf>) -> History {
		let mut history = History { entries: vec![], path };
		history.load();
		history
	}

	pub fn default_path() -> Option<PathBuf> {
		if let Some(path) = env::var_os("QSH_HISTFILE") {
			return Some(PathBuf::from(path));
		}
		env::var_os("HOME").map(|home| PathBuf::from(home).join(".qsh_history"))
	}

	pub fn add(&mut self, line: &str, status: i32) {
		if self.entries.len() == MAX_HISTORY_ENTRIES {
			self.entries.remove(0);
		}
		self.entries.push(HistoryEntry { line: line.to_owned(), status });
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
		self.entries.iter()
	}

	pub fn clear(&mut self) {
		self.entries.clear();
	}

	fn load(&mut self) {
		let Some(path) = &self.path else { return };
		let Ok(content) = fs::read_to_string(path) else { return };
		for line in content.lines().filter(|l| !l.is_empty()) {
			self.add(line, 0);
		}
	}

	pub fn save(&self) -> io::Result<()> {
		let Some(path) = &self.path else { return Ok(()) };
		let mut file = fs::File::create(path)?;
		for entry in &self.entries {
			writeln!(file, "{}", entry.line)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn add_and_iterate() {
		let mut history = History::new(None);
		history.add("echo one", 0);
		history.add("false", 1);
		assert_eq!(history.len(), 2);
		let lines: Vec<&str> = history.iter().map(|e| e.line.as_str()).collect();
		assert_eq!(lines, ["echo one", "false"]);
		assert_eq!(history.iter().last().unwrap().status, 1);
	}

	#[test]
	fn bounded() {
		let mut history = History::new(None);
		for i in 0 .. MAX_HISTORY_ENTRIES + 10 {
			history.add(&format!("cmd {}", i), 0);
		}
		assert_eq!(history.len(), MAX_HISTORY_ENTRIES);
		assert_eq!(history.iter().next().unwrap().line, "cmd 10");
	}

	#[test]
	fn save_and_reload() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("hist");
		let mut history = History::new(Some(path.clone()));
		assert!(history.is_empty());
		history.add("echo persisted", 0);
		history.save().unwrap();

		let reloaded = History::new(Some(path));
		let lines: Vec<&str> = reloaded.iter().map(|e| e.line.as_str()).collect();
		assert_eq!(lines, ["echo persisted"]);
	}

	#[test]
	fn missing_file_is_empty() {
		let dir = tempfile::tempdir().unwrap();
		let history = History::new(Some(dir.path().join("nope")));
		assert!(history.is_empty());
	}
}
