use crate::types::{Command, Operator, Redirect, RedirectKind, MAX_REDIRECTS};

use std::env;
use std::str;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
	#[error("empty command")]
	EmptyCommand,
	#[error("missing redirection target")]
	MissingRedirectTarget,
	#[error("too many redirections (max {0})")]
	TooManyRedirects(usize),
	#[error("unsupported file descriptor {0}")]
	BadDescriptor(String),
	#[error("unexpected character '{0}'")]
	Unexpected(char),
	#[error("unterminated quote")]
	UnterminatedQuote,
}

struct Parser<'a> {
	line: &'a [u8],
	i: usize,
}

impl<'a> Parser<'a> {
	fn peek(&self) -> Option<u8> {
		self.line.get(self.i).copied()
	}

	fn peek_at(&self, off: usize) -> Option<u8> {
		self.line.get(self.i + off).copied()
	}

	fn proceed_while<F>(&mut self, f: F) where F: Fn(u8) -> bool {
		while let Some(c) = self.peek() {
			if !f(c) { break; }
			self.i += 1;
		}
	}

	fn is_whitespace(c: u8) -> bool {
		matches!(c, b' ' | b'\t' | b'\n')
	}

	fn is_word_byte(c: u8) -> bool {
		!Parser::is_whitespace(c) && !matches!(c, b'|' | b'&' | b';' | b'<' | b'>' | b'\'' | b'"')
	}

	fn is_digit(c: u8) -> bool {
		c.is_ascii_digit()
	}

	fn skip_whitespaces(&mut self) {
		self.proceed_while(Parser::is_whitespace);
	}

	fn read_word(&mut self) -> Result<Option<String>, ParseError> {
		let mut word = String::new();
		let mut seen = false;
		let mut expand_tilde = false;
		loop {
			match self.peek() {
				Some(q @ (b'\'' | b'"')) => {
					seen = true;
					self.i += 1;
					let orig = self.i;
					self.proceed_while(|c| c != q);
					if self.peek().is_none() {
						return Err(ParseError::UnterminatedQuote);
					}
					word.push_str(&String::from_utf8_lossy(&self.line[orig .. self.i]));
					self.i += 1;
				},
				Some(c) if Parser::is_word_byte(c) => {
					if !seen && c == b'~' {
						expand_tilde = true;
					}
					seen = true;
					let orig = self.i;
					self.proceed_while(Parser::is_word_byte);
					word.push_str(&String::from_utf8_lossy(&self.line[orig .. self.i]));
				},
				_ => break,
			}
		}
		if !seen {
			return Ok(None);
		}
		if expand_tilde {
			word = expand_home(&word);
		}
		Ok(Some(word))
	}

	// An optional descriptor digit is only a descriptor when a redirection
	// operator follows directly; otherwise the position is rewound and the
	// digits are an ordinary word.
	fn parse_redirect(&mut self) -> Result<Option<Redirect>, ParseError> {
		let orig = self.i;
		let fd = {
			let dorig = self.i;
			self.proceed_while(Parser::is_digit);
			if self.i == dorig {
				None
			} else {
				Some(str::from_utf8(&self.line[dorig .. self.i]).unwrap().to_owned())
			}
		};

		let kind = match self.peek() {
			Some(b'<') => {
				if self.peek_at(1) == Some(b'<') {
					self.i += 2;
					if let Some(d) = fd {
						return Err(ParseError::BadDescriptor(d));
					}
					RedirectKind::Heredoc
				} else {
					self.i += 1;
					match fd.as_deref() {
						None | Some("0") => RedirectKind::Input,
						Some(d) => return Err(ParseError::BadDescriptor(d.to_owned())),
					}
				}
			},
			Some(b'>') => {
				let append = self.peek_at(1) == Some(b'>');
				self.i += if append { 2 } else { 1 };
				match fd.as_deref() {
					None | Some("1") => {
						if append { RedirectKind::Append } else { RedirectKind::Output }
					},
					Some("2") => {
						if !append && self.peek() == Some(b'&') {
							if self.peek_at(1) == Some(b'1') {
								self.i += 2;
								return Ok(Some(Redirect { kind: RedirectKind::ErrToOut, target: None }));
							}
							return Err(ParseError::Unexpected('&'));
						}
						if append { RedirectKind::ErrAppend } else { RedirectKind::ErrOutput }
					},
					Some(d) => return Err(ParseError::BadDescriptor(d.to_owned())),
				}
			},
			Some(b'&') if fd.is_none() && self.peek_at(1) == Some(b'>') => {
				self.i += 2;
				RedirectKind::BothOutput
			},
			_ => {
				self.i = orig;
				return Ok(None);
			},
		};

		self.skip_whitespaces();
		match self.read_word()? {
			Some(target) => Ok(Some(Redirect { kind, target: Some(target) })),
			None => Err(ParseError::MissingRedirectTarget),
		}
	}

	fn parse_stage(&mut self) -> Result<Option<(Vec<String>, Vec<Redirect>)>, ParseError> {
		let mut argv: Vec<String> = vec![];
		let mut redirects: Vec<Redirect> = vec![];
		loop {
			self.skip_whitespaces();
			if let Some(redirect) = self.parse_redirect()? {
				if redirects.len() == MAX_REDIRECTS {
					return Err(ParseError::TooManyRedirects(MAX_REDIRECTS));
				}
				redirects.push(redirect);
				continue;
			}
			match self.read_word()? {
				Some(word) => argv.push(word),
				None => break,
			}
		}
		if argv.is_empty() {
			if redirects.is_empty() {
				Ok(None)
			} else {
				Err(ParseError::EmptyCommand)
			}
		} else {
			Ok(Some((argv, redirects)))
		}
	}

	fn parse_chain(&mut self) -> Result<Option<Command>, ParseError> {
		let mut stages: Vec<(Vec<String>, Vec<Redirect>, Operator)> = vec![];
		loop {
			let stage = self.parse_stage()?;
			self.skip_whitespaces();
			let (argv, redirects) = match stage {
				Some(s) => s,
				None => {
					if stages.is_empty() && self.peek().is_none() {
						return Ok(None);
					}
					return Err(ParseError::EmptyCommand);
				},
			};
			let operator = match self.peek() {
				None => Operator::None,
				Some(b';') => {
					self.i += 1;
					Operator::None
				},
				Some(b'|') => {
					if self.peek_at(1) == Some(b'|') {
						self.i += 2;
						Operator::Or
					} else {
						self.i += 1;
						Operator::Pipe
					}
				},
				Some(b'&') => {
					if self.peek_at(1) == Some(b'&') {
						self.i += 2;
						Operator::And
					} else {
						self.i += 1;
						Operator::Background
					}
				},
				Some(c) => return Err(ParseError::Unexpected(c as char)),
			};
			stages.push((argv, redirects, operator));
			self.skip_whitespaces();
			if self.peek().is_none() {
				match stages.last().unwrap().2 {
					Operator::None | Operator::Background => break,
					_ => return Err(ParseError::EmptyCommand),
				}
			}
		}

		let mut chain: Option<Command> = None;
		for (argv, redirects, operator) in stages.into_iter().rev() {
			chain = Some(Command { argv, operator, redirects, next: chain.map(Box::new) });
		}
		Ok(chain)
	}
}

fn expand_home(word: &str) -> String {
	if let Ok(home) = env::var("HOME") {
		if word == "~" {
			return home;
		}
		if word.starts_with("~/") {
			return format!("{}{}", home, &word[1 ..]);
		}
	}
	word.to_owned()
}

/// Parses one input line into a command chain. `Ok(None)` is a blank line.
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
	Parser { line: line.as_bytes(), i: 0 }.parse_chain()
}
