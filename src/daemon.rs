//! The distributed-cache daemon: serves files under a root directory to
//! [`crate::dcache::DCache`] peers over a line-framed TCP protocol.
//!
//! One task runs the accept loop; each accepted connection gets its own
//! task, which alternates between reading a request line and writing back
//! the requested file's bytes. A write that does not complete inside the
//! configured deadline, or a stop signal from [`DaemonHandle::stop`], ends
//! the connection.

use crate::config::DaemonConfig;
use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// A running daemon's accept loop. Construct with [`Daemon::bind`], then
/// drive it to completion with [`Daemon::run`].
pub struct Daemon {
	listener: TcpListener,
	root: Arc<PathBuf>,
	write_timeout: Duration,
	stop_tx: broadcast::Sender<()>,
}

/// A handle that can stop a [`Daemon`] from outside the task running it.
#[derive(Clone)]
pub struct DaemonHandle {
	stop_tx: broadcast::Sender<()>,
}

impl DaemonHandle {
	/// Stop accepting new connections and close every connection currently
	/// open. Idempotent: calling this more than once is harmless.
	pub fn stop(&self) {
		let _ = self.stop_tx.send(());
	}
}

impl Daemon {
	/// Bind the daemon's listening socket. Binding to `::` accepts both
	/// IPv4 and IPv6 connections on platforms (Linux included) whose
	/// default `IPV6_V6ONLY` setting is off.
	pub async fn bind(config: &DaemonConfig) -> Result<(Daemon, DaemonHandle)> {
		let listener = TcpListener::bind(("::", config.port))
			.await
			.map_err(|e| Error::io(format!("binding daemon to port {}", config.port), e))?;
		let (stop_tx, _) = broadcast::channel(1);
		let handle = DaemonHandle { stop_tx: stop_tx.clone() };
		let daemon = Daemon {
			listener,
			root: Arc::new(config.root.clone()),
			write_timeout: config.write_timeout(),
			stop_tx,
		};
		Ok((daemon, handle))
	}

	/// The address actually bound, useful when `config.port == 0`.
	pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
		self.listener.local_addr()
	}

	/// Run the accept loop until [`DaemonHandle::stop`] is called.
	pub async fn run(self) -> Result<()> {
		let mut stop_rx = self.stop_tx.subscribe();
		loop {
			tokio::select! {
				accepted = self.listener.accept() => {
					let (socket, peer) = match accepted {
						Ok(pair) => pair,
						Err(e) => {
							warn!(error = %e, "accept failed");
							continue;
						}
					};
					if let Err(e) = socket.set_nodelay(true) {
						warn!(error = %e, %peer, "failed to set TCP_NODELAY");
					}
					debug!(%peer, "accepted connection");
					let root = self.root.clone();
					let write_timeout = self.write_timeout;
					let conn_stop_rx = self.stop_tx.subscribe();
					tokio::spawn(async move {
						if let Err(e) = serve_connection(socket, root, write_timeout, conn_stop_rx).await {
							match e {
								Error::Timeout => debug!(%peer, "connection ended after write timeout"),
								_ => warn!(error = %e, %peer, "connection ended with an I/O error"),
							}
						}
					});
				}
				_ = stop_rx.recv() => {
					debug!("daemon stopping");
					return Ok(());
				}
			}
		}
	}
}

async fn serve_connection(
	socket: TcpStream,
	root: Arc<PathBuf>,
	write_timeout: Duration,
	mut stop_rx: broadcast::Receiver<()>,
) -> Result<()> {
	let (read_half, mut writer) = socket.into_split();
	let mut reader = BufReader::new(read_half);

	loop {
		let mut request = Vec::new();
		let read = tokio::select! {
			result = reader.read_until(b'\n', &mut request) => result,
			_ = stop_rx.recv() => {
				debug!("connection closed by daemon stop");
				return Ok(());
			}
		};
		let n = read.map_err(|e| Error::io("reading request", e))?;
		if n == 0 {
			// Peer closed its write side.
			return Ok(());
		}
		if request.last() == Some(&b'\n') {
			request.pop();
		}
		if request.last() == Some(&b'\0') {
			request.pop();
		}

		let path = root.join(String::from_utf8_lossy(&request).as_ref());
		let contents = tokio::task::spawn_blocking(move || std::fs::read(&path))
			.await
			.map_err(|e| Error::io("file read task panicked", std::io::Error::other(e)))?
			.unwrap_or_default();

		let sent = tokio::time::timeout(write_timeout, async {
			writer.write_all(&contents).await?;
			writer.write_all(b"\n").await?;
			writer.flush().await
		})
		.await;

		match sent {
			Ok(Ok(())) => {}
			Ok(Err(e)) => {
				warn!(error = %e, "write failed");
				return Err(Error::io("writing response", e));
			}
			Err(_) => {
				warn!("write deadline exceeded, closing connection");
				return Err(Error::Timeout);
			}
		}
	}
}
