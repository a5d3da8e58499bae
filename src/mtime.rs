//! Reading file modification times for the restat step of the build log.

use crate::error::{Error, Result};
use raw_string::unix::RawStrExt;
use raw_string::RawStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// A file modification time, in the platform's native epoch.
///
/// `0` means "file does not exist"; `-1` is reserved by the wire contract
/// for "stat failed", which this crate instead reports as `Err`.
pub type Timestamp = i64;

/// Abstracts the single disk operation [`crate::buildlog::BuildLog::restat`]
/// needs, so that tests can substitute an in-memory filesystem.
pub trait DiskInterface {
	/// Return the modification time of `path`, or `0` if it does not exist.
	fn stat(&self, path: &RawStr) -> Result<Timestamp>;
}

/// The real, OS-backed [`DiskInterface`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RealDiskInterface;

impl DiskInterface for RealDiskInterface {
	fn stat(&self, path: &RawStr) -> Result<Timestamp> {
		let os_path = path.as_path();
		match std::fs::metadata(os_path).and_then(|m| m.modified()) {
			Ok(time) => Ok(to_timestamp(time)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
			Err(e) => Err(Error::io(format!("stat {}", os_path.display()), e)),
		}
	}
}

fn to_timestamp(time: SystemTime) -> Timestamp {
	match time.duration_since(UNIX_EPOCH) {
		Ok(d) => d.as_secs() as i64 * 1_000_000_000 + i64::from(d.subsec_nanos()),
		Err(e) => {
			let d = e.duration();
			-(d.as_secs() as i64 * 1_000_000_000 + i64::from(d.subsec_nanos()))
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use raw_string::RawString;

	#[test]
	fn missing_file_is_zero() {
		let disk = RealDiskInterface;
		let path = RawString::from("/nonexistent/path/that/should/not/exist");
		assert_eq!(disk.stat(&path).unwrap(), 0);
	}

	#[test]
	fn existing_file_is_nonzero() {
		let dir = tempfile::tempdir().unwrap();
		let file_path = dir.path().join("foo");
		std::fs::write(&file_path, b"hi").unwrap();

		let disk = RealDiskInterface;
		let raw = RawString::from(file_path.to_str().unwrap());
		assert!(disk.stat(&raw).unwrap() > 0);
	}
}
