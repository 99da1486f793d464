use crate::history::History;
use crate::job::JobTable;
use crate::profiler::Profiler;
use crate::search::SearchCache;
use crate::term::Terminal;
use crate::vars::{Aliases, Variables};

use std::path::PathBuf;

/// Single-threaded owner of all shell state. Signal handlers never touch this;
/// they communicate through the atomics in the signals module.
pub struct State {
	pub vars: Variables,
	pub aliases: Aliases,
	pub history: History,
	pub search_cache: SearchCache,
	pub jobs: JobTable,
	pub term: Terminal,
	pub profiler: Profiler,
	pub previous_dir: Option<PathBuf>,
	pub last_status: i32,
	pub should_exit: bool,
}

impl State {
	pub fn new() -> State {
		State {
			vars: Variables::new(),
			aliases: Aliases::new(),
			history: History::new(None),
			search_cache: SearchCache::new(),
			jobs: JobTable::new(),
			term: Terminal::init(),
			profiler: Profiler::new(),
			previous_dir: None,
			last_status: 0,
			should_exit: false,
		}
	}
}
