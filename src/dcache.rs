//! Client side of the distributed file cache: probes a fixed, ordered list
//! of [`crate::daemon::Daemon`] peers for a file's contents.
//!
//! Unlike the daemon, this side is single-threaded and synchronous from the
//! caller's point of view: each peer holds one persistent socket, and a
//! lookup blocks until that peer answers (or the connection is unusable, in
//! which case the next peer is tried).

use std::io;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::warn;

/// One peer's persistent connection to its [`crate::daemon::Daemon`].
struct Host {
	reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
	writer: tokio::net::tcp::OwnedWriteHalf,
}

impl Host {
	async fn connect(host: &str, service: &str) -> io::Result<Host> {
		let addr = format!("{host}:{service}");
		let stream = TcpStream::connect(&addr).await?;
		stream.set_nodelay(true)?;
		let (read_half, writer) = stream.into_split();
		Ok(Host {
			reader: BufReader::new(read_half),
			writer,
		})
	}

	/// Request `path`'s contents from this peer. Returns `None` if the
	/// socket is unusable or the peer reports "not found" (an empty
	/// response body); callers treat both the same way: try the next peer.
	async fn get_file_contents(&mut self, path: &str) -> Option<Vec<u8>> {
		if let Err(e) = self.writer.write_all(path.as_bytes()).await {
			warn!(error = %e, "failed to send request to peer");
			return None;
		}
		if let Err(e) = self.writer.write_all(b"\n").await {
			warn!(error = %e, "failed to send request to peer");
			return None;
		}
		if let Err(e) = self.writer.flush().await {
			warn!(error = %e, "failed to flush request to peer");
			return None;
		}

		let mut response = Vec::new();
		match self.reader.read_until(b'\n', &mut response).await {
			Ok(0) => {
				warn!("peer closed connection without responding");
				None
			}
			Ok(_) => {
				if response.last() == Some(&b'\n') {
					response.pop();
				}
				if response.is_empty() {
					None
				} else {
					Some(response)
				}
			}
			Err(e) => {
				warn!(error = %e, "failed to read response from peer");
				None
			}
		}
	}
}

/// The distributed cache client: an ordered set of peers, probed in
/// configuration order on every lookup.
#[derive(Default)]
pub struct DCache {
	hosts: Vec<Host>,
}

impl DCache {
	pub fn new() -> DCache {
		DCache::default()
	}

	/// Connect to every peer in `infos`, in order. A peer that cannot be
	/// reached is logged and skipped, not fatal to the others.
	pub async fn init(&mut self, infos: &[(String, String)]) {
		for (host, service) in infos {
			match Host::connect(host, service).await {
				Ok(h) => self.hosts.push(h),
				Err(e) => warn!(error = %e, %host, %service, "failed to connect to peer"),
			}
		}
	}

	/// Ask each connected peer in order for `path`'s contents. Returns the
	/// first non-empty response, or an empty vector if no peer has the
	/// file (or no peers are connected at all).
	pub async fn get_file_contents(&mut self, path: &str) -> Vec<u8> {
		for host in &mut self.hosts {
			if let Some(contents) = host.get_file_contents(path).await {
				return contents;
			}
		}
		Vec::new()
	}
}
