use std::collections::HashMap;
use std::env;

/// Shell variables: a local table with environment fallback on read.
/// `export` writes through to the process environment so children inherit.
pub struct Variables {
	vars: HashMap<String, String>,
}

impl Variables {
	pub fn new() -> Variables {
		Variables { vars: HashMap::new() }
	}

	pub fn get(&self, name: &str) -> Option<String> {
		self.vars.get(name).cloned().or_else(|| env::var(name).ok())
	}

	pub fn set(&mut self, name: &str, value: &str) {
		self.vars.insert(name.to_owned(), value.to_owned());
	}

	pub fn export(&mut self, name: &str, value: &str) {
		self.vars.insert(name.to_owned(), value.to_owned());
		env::set_var(name, value);
	}

	pub fn unset(&mut self, name: &str) {
		self.vars.remove(name);
		env::remove_var(name);
	}

	pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
		self.vars.iter()
	}
}

pub struct Aliases {
	map: HashMap<String, String>,
}

impl Aliases {
	pub fn new() -> Aliases {
		Aliases { map: HashMap::new() }
	}

	pub fn set(&mut self, name: &str, value: &str) {
		self.map.insert(name.to_owned(), value.to_owned());
	}

	pub fn get(&self, name: &str) -> Option<&str> {
		self.map.get(name).map(String::as_str)
	}

	pub fn unset(&mut self, name: &str) -> bool {
		self.map.remove(name).is_some()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
		self.map.iter()
	}

	/// Substitutes the first word of the line, once (no recursive expansion).
	pub fn expand_first_word(&self, line: &str) -> String {
		let start = line.len() - line.trim_start().len();
		let rest = &line[start ..];
		let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
		if let Some(value) = self.map.get(&rest[.. end]) {
			format!("{}{}{}", &line[.. start], value, &rest[end ..])
		} else {
			line.to_owned()
		}
	}
}

fn is_name_byte(c: u8) -> bool {
	c == b'_' || c.is_ascii_alphanumeric()
}

/// Expands `$NAME`, `${NAME}` and `$?` against the variable table, string-level
/// before parsing. Expansion is suppressed inside single quotes.
pub fn expand(line: &str, vars: &Variables, last_status: i32) -> String {
	let bytes = line.as_bytes();
	let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
	let mut i = 0;
	let mut in_single = false;
	let mut in_double = false;
	while i < bytes.len() {
		let c = bytes[i];
		match c {
			b'\'' if !in_double => {
				in_single = !in_single;
				out.push(c);
				i += 1;
			},
			b'"' if !in_single => {
				in_double = !in_double;
				out.push(c);
				i += 1;
			},
			b'$' if !in_single => {
				i += 1;
				match bytes.get(i) {
					Some(b'?') => {
						out.extend_from_slice(last_status.to_string().as_bytes());
						i += 1;
					},
					Some(b'{') => {
						match bytes[i + 1 ..].iter().position(|&c| c == b'}') {
							Some(end) => {
								let name = &line[i + 1 .. i + 1 + end];
								out.extend_from_slice(vars.get(name).unwrap_or_default().as_bytes());
								i += end + 2;
							},
							None => out.push(b'$'),
						}
					},
					Some(&c) if is_name_byte(c) => {
						let start = i;
						while i < bytes.len() && is_name_byte(bytes[i]) {
							i += 1;
						}
						let name = &line[start .. i];
						out.extend_from_slice(vars.get(name).unwrap_or_default().as_bytes());
					},
					_ => out.push(b'$'),
				}
			},
			_ => {
				out.push(c);
				i += 1;
			},
		}
	}
	// Input was valid UTF-8 and substitutions are valid UTF-8.
	String::from_utf8(out).unwrap()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn expansion_basics() {
		let mut vars = Variables::new();
		vars.set("NAME", "world");
		assert_eq!(expand("hello $NAME", &vars, 0), "hello world");
		assert_eq!(expand("hello ${NAME}!", &vars, 0), "hello world!");
		assert_eq!(expand("$NAME$NAME", &vars, 0), "worldworld");
	}

	#[test]
	fn last_status() {
		let vars = Variables::new();
		assert_eq!(expand("echo $?", &vars, 42), "echo 42");
	}

	#[test]
	fn unknown_expands_empty() {
		let vars = Variables::new();
		assert_eq!(expand("x$QSH_NO_SUCH_VAR_123-y", &vars, 0), "x-y");
	}

	#[test]
	fn single_quotes_suppress() {
		let mut vars = Variables::new();
		vars.set("V", "x");
		assert_eq!(expand("'$V' \"$V\" $V", &vars, 0), "'$V' \"x\" x");
	}

	#[test]
	fn lone_dollar_is_literal() {
		let vars = Variables::new();
		assert_eq!(expand("a $ b", &vars, 0), "a $ b");
		assert_eq!(expand("tail$", &vars, 0), "tail$");
	}

	#[test]
	fn env_fallback() {
		let vars = Variables::new();
		env::set_var("QSH_TEST_ENV_FALLBACK", "seen");
		assert_eq!(expand("$QSH_TEST_ENV_FALLBACK", &vars, 0), "seen");
		env::remove_var("QSH_TEST_ENV_FALLBACK");
	}

	#[test]
	fn export_writes_environment() {
		let mut vars = Variables::new();
		vars.export("QSH_TEST_EXPORTED", "v1");
		assert_eq!(env::var("QSH_TEST_EXPORTED").as_deref(), Ok("v1"));
		vars.unset("QSH_TEST_EXPORTED");
		assert!(env::var("QSH_TEST_EXPORTED").is_err());
	}

	#[test]
	fn alias_first_word_only() {
		let mut aliases = Aliases::new();
		aliases.set("ll", "ls -l");
		assert_eq!(aliases.expand_first_word("ll /tmp"), "ls -l /tmp");
		assert_eq!(aliases.expand_first_word("echo ll"), "echo ll");
		assert_eq!(aliases.expand_first_word("  ll"), "  ls -l");
	}
}
