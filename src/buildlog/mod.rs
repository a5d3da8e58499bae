//! Reading and writing the on-disk build log (`.ninja_log`-style files).
//!
//! Each run's log appends to the log file. To load, we run through all log
//! entries in series, throwing away older runs for the same output. Once
//! the number of redundant entries exceeds a threshold, [`BuildLog::recompact`]
//! writes out a new file and replaces the existing one with it.

use crate::error::{Error, Result};
use crate::hash::murmur_hash_64a;
use crate::line_reader::LineReader;
use crate::mtime::{DiskInterface, Timestamp};
use raw_string::{RawStr, RawString};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

const OLDEST_SUPPORTED_VERSION: u32 = 4;
const CURRENT_VERSION: u32 = 5;
const MIN_COMPACTION_ENTRY_COUNT: u32 = 100;
const COMPACTION_RATIO: u32 = 3;

/// The latest entry recorded in the build log for one output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
	pub output: RawString,
	pub command_hash: u64,
	pub start_time: i32,
	pub end_time: i32,
	pub mtime: Timestamp,
}

/// Outcome of [`BuildLog::load`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStatus {
	/// The log file did not exist. Not an error: an empty log is usable.
	NotFound,
	/// The log was loaded (possibly emptied, if its version was too old).
	Success,
}

/// Callback the build driver implements so [`BuildLog::recompact`] can ask
/// which outputs are no longer part of the build.
pub trait BuildLogUser {
	fn is_path_dead(&self, output: &RawStr) -> bool;
}

/// The in-memory view of a `.ninja_log`-style file, plus (optionally) a
/// handle kept open for appending new entries.
#[derive(Default)]
pub struct BuildLog {
	entries: HashMap<RawString, LogEntry>,
	log_file: Option<File>,
	needs_recompaction: bool,
}

impl BuildLog {
	/// Create an empty build log, as if [`BuildLog::load`] had found
	/// nothing.
	pub fn new() -> Self {
		BuildLog::default()
	}

	/// Whether [`BuildLog::load`] decided the log should be rewritten the
	/// next time it is opened for writing.
	pub fn needs_recompaction(&self) -> bool {
		self.needs_recompaction
	}

	/// Look up the most recent entry recorded for `output`.
	pub fn lookup_by_output(&self, output: &RawStr) -> Option<&LogEntry> {
		self.entries.get(output)
	}

	/// Number of distinct outputs currently tracked.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Load entries from `path` into this (assumed freshly created)
	/// `BuildLog`.
	///
	/// A missing file is reported as [`LoadStatus::NotFound`], not an
	/// error: the caller should proceed as if the log were empty. A log
	/// whose version predates [`OLDEST_SUPPORTED_VERSION`] is deleted and
	/// also reported as [`LoadStatus::Success`] with nothing loaded.
	pub fn load(&mut self, path: &Path) -> Result<LoadStatus> {
		let file = match File::open(path) {
			Ok(f) => f,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LoadStatus::NotFound),
			Err(e) => return Err(Error::io(format!("open {}", path.display()), e)),
		};

		let mut reader = LineReader::new(file);
		let mut log_version: u32 = 0;
		let mut unique_entry_count: u32 = 0;
		let mut total_entry_count: u32 = 0;
		let mut saw_any_line = false;

		while let Some(line) = reader
			.read_line()
			.map_err(|e| Error::io(format!("read {}", path.display()), e))?
		{
			saw_any_line = true;
			let content = line.content;

			if log_version == 0 {
				log_version = parse_signature_version(content);
				if log_version < OLDEST_SUPPORTED_VERSION {
					drop(reader);
					// An empty build log just causes a full rebuild; not
					// being able to remove the stale one isn't fatal.
					let _ = std::fs::remove_file(path);
					return Ok(LoadStatus::Success);
				}
			}

			if !line.has_newline {
				// A truncated trailing line (e.g. a crash mid-append):
				// tolerate it by dropping it, keeping everything before.
				continue;
			}

			let mut tabs = memchr::memchr_iter(b'\t', content);
			let (tab1, tab2, tab3, tab4) = match (tabs.next(), tabs.next(), tabs.next(), tabs.next()) {
				(Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
				_ => continue,
			};

			let start_time = parse_decimal_or_zero::<i32>(&content[..tab1]);
			let end_time = parse_decimal_or_zero::<i32>(&content[tab1 + 1..tab2]);
			let mtime = parse_decimal_or_zero::<i64>(&content[tab2 + 1..tab3]);
			let output = &content[tab3 + 1..tab4];
			let hash_field = &content[tab4 + 1..];

			let command_hash = if log_version >= 5 {
				parse_hex_or_zero(hash_field)
			} else {
				murmur_hash_64a(hash_field)
			};

			let key = RawStr::from_bytes(output).to_owned();
			match self.entries.get_mut(&key) {
				Some(entry) => {
					entry.start_time = start_time;
					entry.end_time = end_time;
					entry.mtime = mtime;
					entry.command_hash = command_hash;
				}
				None => {
					self.entries.insert(
						key.clone(),
						LogEntry {
							output: key,
							command_hash,
							start_time,
							end_time,
							mtime,
						},
					);
					unique_entry_count += 1;
				}
			}
			total_entry_count += 1;
		}

		if !saw_any_line {
			return Ok(LoadStatus::Success);
		}

		if log_version < CURRENT_VERSION
			|| (total_entry_count > MIN_COMPACTION_ENTRY_COUNT
				&& total_entry_count > COMPACTION_RATIO * unique_entry_count)
		{
			self.needs_recompaction = true;
		}

		Ok(LoadStatus::Success)
	}

	/// Open the log file for appending, recompacting first if
	/// [`BuildLog::load`] flagged it as necessary. Must be called after
	/// `load` (an un-loaded log is treated as an empty prior state).
	pub fn open_for_write(&mut self, path: &Path, user: &dyn BuildLogUser) -> Result<()> {
		if self.needs_recompaction {
			self.recompact(path, user)?;
		}

		let mut file = OpenOptions::new()
			.create(true)
			.append(true)
			.custom_flags(libc::O_CLOEXEC)
			.open(path)
			.map_err(|e| Error::io(format!("open {}", path.display()), e))?;

		// Appending doesn't always position the file pointer to the end;
		// make sure it does.
		let pos = file
			.seek(SeekFrom::End(0))
			.map_err(|e| Error::io(format!("seek {}", path.display()), e))?;

		if pos == 0 {
			write!(file, "# ninja log v{}\n", CURRENT_VERSION)
				.map_err(|e| Error::io(format!("write {}", path.display()), e))?;
		}

		self.log_file = Some(file);
		Ok(())
	}

	/// Close the log file handle, if one is open. Must be called before
	/// [`BuildLog::recompact`] or [`BuildLog::restat`], since those replace
	/// the file this handle points at.
	pub fn close(&mut self) {
		self.log_file = None;
	}

	/// Record that `outputs` were all just produced by `command`, upsert
	/// their entries, and (if the log is open for writing) append one
	/// durable line per output.
	pub fn record_command(
		&mut self,
		outputs: &[impl AsRef<RawStr>],
		command: &RawStr,
		start_time: i32,
		end_time: i32,
		mtime: Timestamp,
	) -> Result<()> {
		let command_hash = murmur_hash_64a(command.as_bytes());

		for output in outputs {
			let output = output.as_ref();
			let entry = self
				.entries
				.entry(output.to_owned())
				.or_insert_with(|| LogEntry {
					output: output.to_owned(),
					command_hash: 0,
					start_time: 0,
					end_time: 0,
					mtime: 0,
				});
			entry.command_hash = command_hash;
			entry.start_time = start_time;
			entry.end_time = end_time;
			entry.mtime = mtime;

			if let Some(file) = &mut self.log_file {
				write_entry(file, entry)
					.and_then(|()| file.flush())
					.map_err(|e| Error::io("append to build log", e))?;
			}
		}
		Ok(())
	}

	/// Rewrite the log, keeping only the latest entry per output and
	/// dropping outputs `user` reports as dead. The original file is left
	/// untouched if anything here fails.
	pub fn recompact(&mut self, path: &Path, user: &dyn BuildLogUser) -> Result<()> {
		self.close();
		let temp_path = append_suffix(path, ".recompact");

		let mut file = File::create(&temp_path)
			.map_err(|e| Error::io(format!("create {}", temp_path.display()), e))?;
		write!(file, "# ninja log v{}\n", CURRENT_VERSION)
			.map_err(|e| Error::io(format!("write {}", temp_path.display()), e))?;

		let mut dead = Vec::new();
		for (output, entry) in &self.entries {
			if user.is_path_dead(output) {
				dead.push(output.clone());
				continue;
			}
			write_entry(&mut file, entry)
				.map_err(|e| Error::io(format!("write {}", temp_path.display()), e))?;
		}
		drop(file);

		for output in dead {
			self.entries.remove(&output);
		}

		replace_with(path, &temp_path)
	}

	/// Re-stat every entry (or only those named in `outputs`, if
	/// non-empty) and rewrite the log with the refreshed `mtime`s.
	pub fn restat(&mut self, path: &Path, disk: &dyn DiskInterface, outputs: &[&RawStr]) -> Result<()> {
		self.close();
		let temp_path = append_suffix(path, ".restat");

		let mut file = File::create(&temp_path)
			.map_err(|e| Error::io(format!("create {}", temp_path.display()), e))?;
		write!(file, "# ninja log v{}\n", CURRENT_VERSION)
			.map_err(|e| Error::io(format!("write {}", temp_path.display()), e))?;

		for entry in self.entries.values_mut() {
			let should_stat =
				outputs.is_empty() || outputs.iter().any(|o| o.as_bytes() == entry.output.as_bytes());
			if should_stat {
				entry.mtime = disk.stat(&entry.output)?;
			}
			write_entry(&mut file, entry)
				.map_err(|e| Error::io(format!("write {}", temp_path.display()), e))?;
		}
		drop(file);

		replace_with(path, &temp_path)
	}
}

fn replace_with(path: &Path, temp_path: &Path) -> Result<()> {
	std::fs::remove_file(path).map_err(|e| Error::io(format!("unlink {}", path.display()), e))?;
	std::fs::rename(temp_path, path)
		.map_err(|e| Error::io(format!("rename {} to {}", temp_path.display(), path.display()), e))?;
	Ok(())
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
	let mut os = path.as_os_str().to_owned();
	os.push(suffix);
	PathBuf::from(os)
}

fn write_entry(f: &mut impl Write, entry: &LogEntry) -> io::Result<()> {
	write!(
		f,
		"{}\t{}\t{}\t{}\t{:x}\n",
		entry.start_time, entry.end_time, entry.mtime, entry.output, entry.command_hash
	)
}

/// Parses the `# ninja log v<N>` signature line, returning `0` if it does
/// not match (which the caller treats the same as "too old").
fn parse_signature_version(line: &[u8]) -> u32 {
	const PREFIX: &[u8] = b"# ninja log v";
	if !line.starts_with(PREFIX) {
		return 0;
	}
	std::str::from_utf8(&line[PREFIX.len()..])
		.ok()
		.and_then(|s| s.parse().ok())
		.unwrap_or(0)
}

fn parse_decimal_or_zero<T: std::str::FromStr + Default>(field: &[u8]) -> T {
	std::str::from_utf8(field)
		.ok()
		.and_then(|s| s.parse().ok())
		.unwrap_or_default()
}

fn parse_hex_or_zero(field: &[u8]) -> u64 {
	std::str::from_utf8(field)
		.ok()
		.and_then(|s| u64::from_str_radix(s, 16).ok())
		.unwrap_or(0)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::mtime::RealDiskInterface;

	struct NeverDead;
	impl BuildLogUser for NeverDead {
		fn is_path_dead(&self, _output: &RawStr) -> bool {
			false
		}
	}

	struct DeadIf(fn(&RawStr) -> bool);
	impl BuildLogUser for DeadIf {
		fn is_path_dead(&self, output: &RawStr) -> bool {
			(self.0)(output)
		}
	}

	fn raw(s: &str) -> RawString {
		RawString::from(s)
	}

	#[test]
	fn empty_load() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(".ninja_log");
		std::fs::write(&path, b"# ninja log v5\n").unwrap();

		let mut log = BuildLog::new();
		assert_eq!(log.load(&path).unwrap(), LoadStatus::Success);
		assert!(log.is_empty());
		assert!(!log.needs_recompaction());
	}

	#[test]
	fn missing_file_is_not_found() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(".ninja_log");
		let mut log = BuildLog::new();
		assert_eq!(log.load(&path).unwrap(), LoadStatus::NotFound);
	}

	#[test]
	fn single_record_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(".ninja_log");

		let mut log = BuildLog::new();
		log.load(&path).unwrap();
		log.open_for_write(&path, &NeverDead).unwrap();
		log.record_command(&[raw("foo")], RawStr::from_str("cc foo.c"), 100, 200, 1_600_000_000)
			.unwrap();
		log.close();

		let contents = std::fs::read_to_string(&path).unwrap();
		let expected_hash = murmur_hash_64a(b"cc foo.c");
		let expected_line = format!("100\t200\t1600000000\tfoo\t{:x}\n", expected_hash);
		assert!(contents.ends_with(&expected_line), "got: {contents:?}");

		let mut reloaded = BuildLog::new();
		reloaded.load(&path).unwrap();
		let entry = reloaded.lookup_by_output(RawStr::from_str("foo")).unwrap();
		assert_eq!(entry.start_time, 100);
		assert_eq!(entry.end_time, 200);
		assert_eq!(entry.mtime, 1_600_000_000);
		assert_eq!(entry.command_hash, expected_hash);
	}

	#[test]
	fn truncated_tail_is_tolerated() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(".ninja_log");
		std::fs::write(
			&path,
			b"# ninja log v5\n100\t200\t5\tfoo\tdeadbeef\n300\t400\t6\tbar",
		)
		.unwrap();

		let mut log = BuildLog::new();
		log.load(&path).unwrap();
		assert!(log.lookup_by_output(RawStr::from_str("foo")).is_some());
		assert!(log.lookup_by_output(RawStr::from_str("bar")).is_none());
	}

	#[test]
	fn recompaction_threshold() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(".ninja_log");

		let mut contents = String::from("# ninja log v5\n");
		for i in 0..400 {
			let output = i % 100;
			contents.push_str(&format!("0\t0\t0\tout{output}\t1\n"));
        }
		std::fs::write(&path, contents).unwrap();

		let mut log = BuildLog::new();
		log.load(&path).unwrap();
		assert_eq!(log.len(), 100);
		assert!(log.needs_recompaction());
	}

	#[test]
	fn version_migration_v4_to_v5() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(".ninja_log");
		std::fs::write(&path, b"# ninja log v4\n100\t200\t5\tfoo\tcc foo.c\n").unwrap();

		let mut log = BuildLog::new();
		log.load(&path).unwrap();
		assert!(log.needs_recompaction());
		let entry = log.lookup_by_output(RawStr::from_str("foo")).unwrap();
		assert_eq!(entry.command_hash, murmur_hash_64a(b"cc foo.c"));

		log.open_for_write(&path, &NeverDead).unwrap();
		log.close();

		let mut reloaded = BuildLog::new();
		reloaded.load(&path).unwrap();
		assert!(!reloaded.needs_recompaction());
		let entry = reloaded.lookup_by_output(RawStr::from_str("foo")).unwrap();
		assert_eq!(entry.command_hash, murmur_hash_64a(b"cc foo.c"));
	}

	#[test]
	fn dead_path_purge() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(".ninja_log");

		let mut log = BuildLog::new();
		log.load(&path).unwrap();
		log.open_for_write(&path, &NeverDead).unwrap();
		log.record_command(&[raw("keep"), raw("drop")], RawStr::from_str("cc"), 0, 1, 1)
			.unwrap();
		log.close();

		log.recompact(&path, &DeadIf(|o| o.as_bytes() == b"drop")).unwrap();
		assert!(log.lookup_by_output(RawStr::from_str("keep")).is_some());
		assert!(log.lookup_by_output(RawStr::from_str("drop")).is_none());

		let mut reloaded = BuildLog::new();
		reloaded.load(&path).unwrap();
		assert!(reloaded.lookup_by_output(RawStr::from_str("keep")).is_some());
		assert!(reloaded.lookup_by_output(RawStr::from_str("drop")).is_none());
	}

	#[test]
	fn recompaction_is_idempotent() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(".ninja_log");

		let mut log = BuildLog::new();
		log.load(&path).unwrap();
		log.open_for_write(&path, &NeverDead).unwrap();
		log.record_command(&[raw("a"), raw("b")], RawStr::from_str("cc"), 0, 1, 1)
			.unwrap();
		log.close();

		log.recompact(&path, &NeverDead).unwrap();
		let first = std::fs::read(&path).unwrap();
		log.recompact(&path, &NeverDead).unwrap();
		let second = std::fs::read(&path).unwrap();
		assert_eq!(first, second);
	}

	#[test]
	fn restat_updates_mtime() {
		let dir = tempfile::tempdir().unwrap();
		let log_path = dir.path().join(".ninja_log");
		let out_path = dir.path().join("foo");
		std::fs::write(&out_path, b"hi").unwrap();

		let mut log = BuildLog::new();
		log.load(&log_path).unwrap();
		log.open_for_write(&log_path, &NeverDead).unwrap();
		log.record_command(
			&[raw(out_path.to_str().unwrap())],
			RawStr::from_str("cc"),
			0,
			1,
			0,
		)
		.unwrap();
		log.close();

		log.restat(&log_path, &RealDiskInterface, &[]).unwrap();
		let entry = log
			.lookup_by_output(RawStr::from_str(out_path.to_str().unwrap()))
			.unwrap();
		assert!(entry.mtime > 0);
	}
}
