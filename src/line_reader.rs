//! Buffered, newline-terminated reads from a byte stream.
//!
//! This mirrors the line reader used to stream build-log files: a single
//! fixed buffer is refilled in big chunks (one `read()` worth at a time)
//! rather than growing to fit arbitrarily long lines, because the on-disk
//! format this reader is built for guarantees lines stay well under the
//! buffer size.

use std::io::{self, Read};

/// Large enough that no legitimate build-log line should ever come close
/// to filling it.
pub const DEFAULT_BUFFER_SIZE: usize = 256 * 1024;

/// One line read from a [`LineReader`].
pub struct Line<'a> {
	/// The line's bytes, not including the terminating `\n`.
	pub content: &'a [u8],
	/// Whether a terminating `\n` was actually found.
	///
	/// `false` means this line was longer than the reader's buffer; its
	/// content has been truncated and the remainder of the original line
	/// was discarded. Callers of a format that promises short lines should
	/// treat this as "skip this entry" rather than try to reassemble it.
	pub has_newline: bool,
}

/// A buffered reader that yields one line at a time.
pub struct LineReader<R> {
	reader: R,
	buf: Box<[u8]>,
	buf_end: usize,
	line_start: usize,
	line_end: Option<usize>,
}

impl<R: Read> LineReader<R> {
	/// Wrap `reader` in a [`LineReader`] with the default buffer size.
	pub fn new(reader: R) -> Self {
		Self::with_capacity(reader, DEFAULT_BUFFER_SIZE)
	}

	/// Wrap `reader` in a [`LineReader`] with a buffer of `capacity` bytes.
	pub fn with_capacity(reader: R, capacity: usize) -> Self {
		LineReader {
			reader,
			buf: vec![0; capacity].into_boxed_slice(),
			buf_end: 0,
			line_start: 0,
			line_end: None,
		}
	}

	/// Read the next line.
	///
	/// Returns `Ok(None)` at end of stream (no more bytes available at
	/// all, not even a partial line).
	pub fn read_line(&mut self) -> io::Result<Option<Line<'_>>> {
		if self.line_start >= self.buf_end || self.line_end.is_none() {
			// Buffer fully consumed, or the previous line ran off the end
			// of the buffer without a terminator: start over with a fresh
			// read. In the second case this silently drops the remainder
			// of the over-long line.
			let n = self.reader.read(&mut self.buf)?;
			if n == 0 {
				return Ok(None);
			}
			self.line_start = 0;
			self.buf_end = n;
		} else {
			// Advance past the newline found by the previous call.
			self.line_start = self.line_end.unwrap() + 1;
		}

		self.line_end = memchr::memchr(b'\n', &self.buf[self.line_start..self.buf_end])
			.map(|i| self.line_start + i);

		if self.line_end.is_none() {
			// No newline in the rest of the buffer: shift the unconsumed
			// tail to the front and fill the remainder.
			let tail = self.buf_end - self.line_start;
			self.buf.copy_within(self.line_start..self.buf_end, 0);
			let n = self.reader.read(&mut self.buf[tail..])?;
			self.buf_end = tail + n;
			self.line_start = 0;
			self.line_end = memchr::memchr(b'\n', &self.buf[..self.buf_end]);
		}

		let has_newline = self.line_end.is_some();
		let end = self.line_end.unwrap_or(self.buf_end);
		Ok(Some(Line {
			content: &self.buf[self.line_start..end],
			has_newline,
		}))
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::io::Cursor;

	fn lines(input: &[u8], capacity: usize) -> Vec<(Vec<u8>, bool)> {
		let mut reader = LineReader::with_capacity(Cursor::new(input), capacity);
		let mut out = Vec::new();
		while let Some(line) = reader.read_line().unwrap() {
			out.push((line.content.to_vec(), line.has_newline));
		}
		out
	}

	#[test]
	fn empty_stream() {
		assert_eq!(lines(b"", DEFAULT_BUFFER_SIZE), vec![]);
	}

	#[test]
	fn basic_lines() {
		assert_eq!(
			lines(b"foo\nbar\nbaz\n", DEFAULT_BUFFER_SIZE),
			vec![
				(b"foo".to_vec(), true),
				(b"bar".to_vec(), true),
				(b"baz".to_vec(), true),
			]
		);
	}

	#[test]
	fn no_trailing_newline() {
		assert_eq!(
			lines(b"foo\nbar", DEFAULT_BUFFER_SIZE),
			vec![(b"foo".to_vec(), true), (b"bar".to_vec(), false)]
		);
	}

	#[test]
	fn line_longer_than_buffer_is_flagged() {
		let result = lines(b"01234567890123456789\nshort\n", 8);
		assert!(!result[0].1, "over-long line should lack a newline flag");
		let has_short = result.iter().any(|(c, nl)| c == b"short" && *nl);
		assert!(has_short, "subsequent short line should still parse: {result:?}");
	}
}
