//! Crate-wide error handling.
//!
//! [`Error`] collects the error kinds this crate can raise: a missing
//! file or peer, an unparseable line or document, an
//! OS-level I/O failure, a depfile protocol violation, and a daemon write
//! timeout. [`ErrorWithLocation`] separately attaches file/line information
//! to an error, for the two line-oriented parsers ([`crate::depfile`] and
//! [`crate::hostlist`]) that want to report *where* in their input they
//! failed.

use std::fmt;
use std::io;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

/// A line in a file: the place where something went wrong.
///
/// Both fields are optional, in case they are not known.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Location<'a> {
	pub file: Option<&'a Path>,
	pub line: Option<NonZeroU32>,
}

impl Location<'static> {
	/// A [`Location`] with no location information.
	pub const UNKNOWN: Self = Location {
		file: None,
		line: None,
	};
}

/// An error which happened at a specific line in some file.
///
/// Use [`at`][AddLocationToError::at] on an [`Error`][std::error::Error], or
/// [`err_at`][AddLocationToResult::err_at] on a [`Result`] to make one.
#[derive(Debug)]
pub struct ErrorWithLocation<T> {
	pub file: Option<PathBuf>,
	pub line: Option<NonZeroU32>,
	pub error: T,
}

impl<'a> Location<'a> {
	/// Create an error containing location information.
	pub fn error<E>(&self, error: E) -> ErrorWithLocation<E> {
		ErrorWithLocation {
			file: self.file.map(|p| p.to_path_buf()),
			line: self.line,
			error,
		}
	}
}

impl<A> ErrorWithLocation<A> {
	/// Convert one error type to another, while keeping the location
	/// information.
	pub fn convert<B: From<A>>(self) -> ErrorWithLocation<B> {
		ErrorWithLocation {
			file: self.file,
			line: self.line,
			error: From::from(self.error),
		}
	}

	/// Get the location at which the error occurred.
	pub fn location(&self) -> Location {
		Location {
			file: self.file.as_deref(),
			line: self.line,
		}
	}
}

/// Extension trait: adds [`err_at()`][Self::err_at] to [`Result`].
pub trait AddLocationToResult {
	type WithLocation;
	/// Add location information to the error.
	fn err_at(self, location: Location) -> Self::WithLocation;
}

/// Extension trait: adds [`at()`][Self::at] to any [`std::error::Error`].
pub trait AddLocationToError {
	type WithLocation;
	/// Add location information to the error.
	fn at(self, location: Location) -> Self::WithLocation;
}

impl<T, E> AddLocationToResult for std::result::Result<T, E> {
	type WithLocation = std::result::Result<T, ErrorWithLocation<E>>;
	fn err_at(self, location: Location) -> Self::WithLocation {
		self.map_err(|e| location.error(e))
	}
}

impl<E: std::error::Error> AddLocationToError for E {
	type WithLocation = ErrorWithLocation<E>;
	fn at(self, location: Location) -> Self::WithLocation {
		location.error(self)
	}
}

impl fmt::Display for Location<'_> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		if let Some(file) = self.file.as_ref() {
			write!(f, "{}", file.display())?;
		}
		if let Some(line) = self.line {
			write!(f, ":{}", line)?;
		}
		Ok(())
	}
}

impl<T: fmt::Display> fmt::Display for ErrorWithLocation<T> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		if self.location() != Location::UNKNOWN {
			write!(f, "{}: ", self.location())?;
		}
		write!(f, "{}", self.error)
	}
}

impl<T: std::error::Error> std::error::Error for ErrorWithLocation<T> {}

impl<T: std::error::Error + Send + Sync + 'static> From<ErrorWithLocation<T>> for io::Error {
	fn from(src: ErrorWithLocation<T>) -> io::Error {
		io::Error::new(io::ErrorKind::Other, src)
	}
}

/// The crate-wide error type.
///
/// Every fallible public function in this crate returns `Result<T, Error>`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// A file or peer that was expected to exist could not be found. This is
	/// frequently not fatal: [`crate::buildlog::BuildLog::load`] treats a
	/// missing log file as an empty one, and [`crate::dcache::DCache`] moves
	/// on to the next peer.
	#[error("not found: {0}")]
	NotFound(PathBuf),

	/// A line, document, or token could not be parsed.
	#[error("{0}")]
	Format(String),

	/// An OS-level failure, with the context in which it occurred.
	#[error("{context}: {source}")]
	Io {
		context: String,
		#[source]
		source: io::Error,
	},

	/// A depfile violated the parser's input discipline (see
	/// [`crate::depfile`]).
	#[error("{0}")]
	Protocol(String),

	/// A daemon write deadline expired before a response could be sent.
	#[error("write timed out")]
	Timeout,
}

impl Error {
	pub fn io(context: impl Into<String>, source: io::Error) -> Self {
		Error::Io {
			context: context.into(),
			source,
		}
	}
}

impl<T: std::error::Error + Send + Sync + 'static> From<ErrorWithLocation<T>> for Error {
	fn from(src: ErrorWithLocation<T>) -> Self {
		Error::Format(src.to_string())
	}
}

pub type Result<T> = std::result::Result<T, Error>;
