use std::collections::HashMap;
use std::ffi::CString;
use std::{env, fs, io};

/// Cache of `$PATH` lookups: program name to full path, first directory wins.
/// Rebuilt on demand by the `rehash` builtin.
pub struct SearchCache {
	imp: HashMap<String, CString>,
}

impl SearchCache {
	pub fn new() -> SearchCache {
		let mut this = SearchCache { imp: HashMap::new() };
		this.rehash();
		this
	}

	fn add_entry(&mut self, entry: io::Result<fs::DirEntry>) -> io::Result<()> {
		use std::os::unix::ffi::OsStringExt;
		let e = entry?;
		let name = e.file_name().to_string_lossy().into_owned();
		let path = CString::new(e.path().into_os_string().into_vec())?;
		self.imp.entry(name).or_insert(path);
		Ok(())
	}

	pub fn rehash(&mut self) {
		self.imp.clear();
		let Some(path) = env::var_os("PATH") else { return };
		for dir in env::split_paths(&path) {
			if let Ok(entries) = fs::read_dir(dir) {
				for entry in entries {
					let _ = self.add_entry(entry);
				}
			}
		}
	}

	pub fn lookup(&self, name: &str) -> Option<&CString> {
		self.imp.get(name)
	}

	pub fn len(&self) -> usize {
		self.imp.len()
	}

	pub fn is_empty(&self) -> bool {
		self.imp.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs::File;

	#[test]
	fn finds_programs_and_rehashes() {
		let dir_a = tempfile::tempdir().unwrap();
		let dir_b = tempfile::tempdir().unwrap();
		File::create(dir_a.path().join("prog")).unwrap();
		File::create(dir_b.path().join("prog")).unwrap();
		File::create(dir_b.path().join("other")).unwrap();

		let saved = env::var_os("PATH");
		env::set_var(
			"PATH",
			env::join_paths([dir_a.path(), dir_b.path()]).unwrap(),
		);
		let mut cache = SearchCache::new();

		// first PATH entry wins
		let hit = cache.lookup("prog").unwrap();
		assert!(hit.to_str().unwrap().starts_with(dir_a.path().to_str().unwrap()));
		assert!(cache.lookup("other").is_some());
		assert!(cache.lookup("missing").is_none());

		env::set_var("PATH", dir_b.path());
		cache.rehash();
		let hit = cache.lookup("prog").unwrap();
		assert!(hit.to_str().unwrap().starts_with(dir_b.path().to_str().unwrap()));

		match saved {
			Some(p) => env::set_var("PATH", p),
			None => env::remove_var("PATH"),
		}
	}
}
