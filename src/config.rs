//! Deserializable configuration for the daemon and its clients.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 30;

/// Top-level configuration: a daemon's listen settings plus the ordered list
/// of peers a [`crate::dcache::DCache`] built from this config should probe.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
	pub daemon: DaemonConfig,
	pub peers: Vec<PeerConfig>,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			daemon: DaemonConfig::default(),
			peers: Vec::new(),
		}
	}
}

impl Config {
	/// The peer list in the `(host, service)` shape [`crate::dcache::DCache::init`] wants.
	pub fn peer_list(&self) -> Vec<(String, String)> {
		self.peers.iter().map(|p| (p.host.clone(), p.port.to_string())).collect()
	}
}

/// A daemon's listen port, served root, and write deadline.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
	pub port: u16,
	pub root: PathBuf,
	pub write_timeout_secs: u64,
}

impl Default for DaemonConfig {
	fn default() -> Self {
		DaemonConfig {
			port: 0,
			root: PathBuf::from("."),
			write_timeout_secs: DEFAULT_WRITE_TIMEOUT_SECS,
		}
	}
}

impl DaemonConfig {
	pub fn write_timeout(&self) -> Duration {
		Duration::from_secs(self.write_timeout_secs)
	}
}

/// One entry of the peer list, as deserialized from a host-list document
/// (see [`crate::hostlist`]).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PeerConfig {
	pub host: String,
	pub port: u16,
}
