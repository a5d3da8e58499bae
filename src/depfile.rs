//! Parsing of GCC/Clang-style Makefile dependency files, in place.
//!
//! The parser mutates its input buffer as it de-escapes backslash sequences,
//! and returns filenames that borrow from that buffer rather than allocating
//! copies. See the module-level escape table in [`parse`] for the exact
//! discipline this follows (it matches what GCC and Clang actually emit, not
//! full Make syntax).

use crate::error::{Error, Result};
use raw_string::RawStr;

/// The outputs and dependencies parsed from one depfile.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Depfile<'a> {
	pub outs: Vec<&'a RawStr>,
	pub ins: Vec<&'a RawStr>,
}

/// `true` for bytes that never need special handling and can be copied
/// through as part of a run (everything except whitespace/control bytes and
/// the handful of punctuation characters the parser treats specially).
fn is_plain(b: u8) -> bool {
	!matches!(
		b,
		0x00..=0x1F
			| b' ' | b'"' | b'#' | b'$' | b'&' | b'\'' | b'*' | b';' | b'<' | b'>' | b'?' | b'\\' | b'^' | b'`' | b'|' | 0x7F
	)
}

/// Parse a depfile in place.
///
/// Escapes recognised:
/// - `$$` -> literal `$`.
/// - `\#` -> literal `#` (any number of leading backslashes, only the last
///   one is consumed).
/// - a space preceded by `2N+1` backslashes -> `N` backslashes plus a
///   literal space, filename continues.
/// - a space preceded by `2N` backslashes -> `2N` backslashes, filename
///   ends.
/// - `\` followed by a newline, or by a CRLF pair -> line continuation,
///   filename ends but the rule continues.
/// - a bare newline ends both the filename and the rule.
/// - any other byte following a backslash run is copied through verbatim,
///   backslashes included.
///
/// A token ending in `:` marks the end of the rule's targets and the start
/// of its dependencies. Once a dependency has been seen, a later token that
/// repeats it as a target poisons the rule: any further new dependency is a
/// parse error. Duplicate targets and duplicate dependencies are silently
/// dropped.
pub fn parse(content: &mut [u8]) -> Result<Depfile<'_>> {
	let len = content.len();
	let mut read = 0usize;
	let mut write = 0usize;
	let mut have_target = false;
	let mut parsing_targets = true;
	let mut poisoned_input = false;
	let mut ins: Vec<(usize, usize)> = Vec::new();
	let mut outs: Vec<(usize, usize)> = Vec::new();

	while read < len {
		let token_start = write;
		let mut have_newline = false;

		loop {
			if read >= len {
				break;
			}
			let c = content[read];
			if is_plain(c) {
				let start = read;
				while read < len && is_plain(content[read]) {
					read += 1;
				}
				content.copy_within(start..read, write);
				write += read - start;
				continue;
			}
			match c {
				b'\n' => {
					read += 1;
					have_newline = true;
					break;
				}
				b'\r' => {
					if content.get(read + 1) == Some(&b'\n') {
						read += 2;
						have_newline = true;
					} else {
						read += 1;
					}
					break;
				}
				b'$' => {
					if content.get(read + 1) == Some(&b'$') {
						content[write] = b'$';
						write += 1;
						read += 2;
						continue;
					}
					read += 1;
					break;
				}
				b'\\' => {
					let run_start = read;
					let mut n = 0usize;
					while content.get(read + n) == Some(&b'\\') {
						n += 1;
					}
					let after = run_start + n;
					match content.get(after).copied() {
						Some(b' ') if n % 2 == 1 => {
							let keep = n / 2;
							content.copy_within(run_start..run_start + keep, write);
							write += keep;
							content[write] = b' ';
							write += 1;
							read = after + 1;
							continue;
						}
						Some(b' ') => {
							content.copy_within(run_start..after, write);
							write += n;
							read = after + 1;
							break;
						}
						Some(b'#') => {
							let keep = n - 1;
							content.copy_within(run_start..run_start + keep, write);
							write += keep;
							content[write] = b'#';
							write += 1;
							read = after + 1;
							continue;
						}
						Some(b'\n') if n % 2 == 1 => {
							read = after + 1;
							break;
						}
						Some(b'\r') if n % 2 == 1 && content.get(after + 1) == Some(&b'\n') => {
							read = after + 2;
							break;
						}
						Some(_) => {
							let copy_end = after + 1;
							content.copy_within(run_start..copy_end, write);
							write += copy_end - run_start;
							read = copy_end;
							continue;
						}
						None => {
							content.copy_within(run_start..after, write);
							write += n;
							read = after;
							break;
						}
					}
				}
				_ => {
					// A terminator with no escape meaning of its own: quote,
					// ampersand, stray control byte, etc. Swallowed, ends
					// the token, rule continues.
					read += 1;
					break;
				}
			}
		}

		// Captured before the trailing-colon check below, matching the
		// reference parser: once we're past the rule's first colon, every
		// later token is a dependency for classification purposes, even
		// one that itself ends in a colon.
		let is_dependency = !parsing_targets;
		let mut end = write;
		let mut had_colon = false;
		if end > token_start && content[end - 1] == b':' {
			end -= 1;
			had_colon = true;
			parsing_targets = false;
			have_target = true;
		}

		if end > token_start {
			let piece = (token_start, end);
			if is_dependency {
				if had_colon {
					// A target-like token showed up after dependencies had
					// already started: poison the rule.
					poisoned_input = true;
				} else if poisoned_input {
					return Err(Error::Protocol("inputs may not also have inputs".to_string()));
				} else if !ins.iter().any(|&p| slice_eq(content, p, piece)) {
					ins.push(piece);
				}
			} else if !outs.iter().any(|&p| slice_eq(content, p, piece)) {
				outs.push(piece);
			}
		}

		if have_newline {
			parsing_targets = true;
			poisoned_input = false;
		}
	}

	if !have_target {
		return Err(Error::Format("expected ':' in depfile".to_string()));
	}

	Ok(Depfile {
		outs: outs.into_iter().map(|(a, b)| RawStr::from_bytes(&content[a..b])).collect(),
		ins: ins.into_iter().map(|(a, b)| RawStr::from_bytes(&content[a..b])).collect(),
	})
}

fn slice_eq(content: &[u8], a: (usize, usize), b: (usize, usize)) -> bool {
	content[a.0..a.1] == content[b.0..b.1]
}

#[cfg(test)]
mod test {
	use super::*;

	fn names(raws: &[&RawStr]) -> Vec<String> {
		raws.iter().map(|s| s.to_string()).collect()
	}

	#[test]
	fn simple_rule() {
		let mut buf = b"foo.o: foo.c foo.h\n".to_vec();
		let parsed = parse(&mut buf).unwrap();
		assert_eq!(names(&parsed.outs), vec!["foo.o"]);
		assert_eq!(names(&parsed.ins), vec!["foo.c", "foo.h"]);
	}

	#[test]
	fn escaped_space_and_hash() {
		let mut buf = b"foo\\ bar.o: a\\#b.c\n".to_vec();
		let parsed = parse(&mut buf).unwrap();
		assert_eq!(names(&parsed.outs), vec!["foo bar.o"]);
		assert_eq!(names(&parsed.ins), vec!["a#b.c"]);
	}

	#[test]
	fn doubled_dollar() {
		let mut buf = b"foo.o: a$$b.c\n".to_vec();
		let parsed = parse(&mut buf).unwrap();
		assert_eq!(names(&parsed.ins), vec!["a$b.c"]);
	}

	#[test]
	fn backslash_parity_before_space() {
		// One backslash before a space: de-escapes to a literal space,
		// filename continues.
		let mut buf = b"out: a\\ b\n".to_vec();
		let parsed = parse(&mut buf).unwrap();
		assert_eq!(names(&parsed.ins), vec!["a b"]);

		// Two backslashes before a space: kept as two backslashes, filename
		// ends there.
		let mut buf = b"out: a\\\\ b\n".to_vec();
		let parsed = parse(&mut buf).unwrap();
		assert_eq!(names(&parsed.ins), vec!["a\\\\", "b"]);
	}

	#[test]
	fn line_continuation() {
		let mut buf = b"out: a b \\\nc\n".to_vec();
		let parsed = parse(&mut buf).unwrap();
		assert_eq!(names(&parsed.ins), vec!["a", "b", "c"]);
	}

	#[test]
	fn duplicate_suppression() {
		let mut buf = b"a.o: b c b\n".to_vec();
		let parsed = parse(&mut buf).unwrap();
		assert_eq!(names(&parsed.outs), vec!["a.o"]);
		assert_eq!(names(&parsed.ins), vec!["b", "c"]);
	}

	#[test]
	fn poisoned_input_is_an_error() {
		let mut buf = b"a.o: b c a.o: d\n".to_vec();
		let err = parse(&mut buf).unwrap_err();
		assert_eq!(err.to_string(), "inputs may not also have inputs");
	}

	#[test]
	fn missing_colon_is_an_error() {
		let mut buf = b"just some words\n".to_vec();
		let err = parse(&mut buf).unwrap_err();
		assert_eq!(err.to_string(), "expected ':' in depfile");
	}

	#[test]
	fn multiple_rules() {
		let mut buf = b"a.o: a.c\nb.o: b.c\n".to_vec();
		let parsed = parse(&mut buf).unwrap();
		assert_eq!(names(&parsed.outs), vec!["a.o", "b.o"]);
		assert_eq!(names(&parsed.ins), vec!["a.c", "b.c"]);
	}
}
