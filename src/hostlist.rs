//! Parsing the peer list fed to [`crate::dcache::DCache::init`].
//!
//! The on-disk format is a JSON array of `{"host": ..., "port": ...}`
//! objects; an empty or all-whitespace file is accepted as the empty list,
//! matching how an absent peer configuration is not treated as an error.

use crate::error::{AddLocationToError, Error, ErrorWithLocation, Location};
use serde::Deserialize;

#[derive(Deserialize)]
struct HostEntry {
	host: String,
	port: u16,
}

/// Parse a host list document into an ordered `(host, port-as-string)` list.
///
/// Peer probe order in [`crate::dcache::DCache`] is the order entries appear
/// here.
pub fn parse(input: &str) -> std::result::Result<Vec<(String, String)>, ErrorWithLocation<serde_json::Error>> {
	if input.trim().is_empty() {
		return Ok(Vec::new());
	}
	let entries: Vec<HostEntry> = serde_json::from_str(input).map_err(|e| e.at(Location::UNKNOWN))?;
	Ok(entries.into_iter().map(|e| (e.host, e.port.to_string())).collect())
}

/// Parse a host list document, wrapping any error in the crate-wide
/// [`Error`] type with `input`'s path attached as location context.
pub fn parse_file(path: &std::path::Path) -> crate::error::Result<Vec<(String, String)>> {
	let contents = std::fs::read_to_string(path).map_err(|e| Error::io(format!("reading {}", path.display()), e))?;
	parse(&contents).map_err(|e| {
		Error::Format(
			ErrorWithLocation {
				file: Some(path.to_path_buf()),
				line: e.line,
				error: e.error,
			}
			.to_string(),
		)
	})
}
