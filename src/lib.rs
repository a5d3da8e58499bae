//! This crate contains the persistent build log and distributed file cache
//! of an incremental build system.
//!
//! # File formats
//!
//! - **`.ninja_log`-style build logs**
//!
//!   The [`buildlog`] module reads and writes the on-disk journal that
//!   records, for every output a build has ever produced, the hash of the
//!   command that produced it and the wall-clock times and restat-mtime of
//!   that run. See [`buildlog::BuildLog`].
//!
//! - **`Makefile`-style dependency files**
//!
//!   The [`depfile`] module parses the dependency files written by
//!   compilers such as GCC and Clang.
//!
//! - **Peer list files**
//!
//!   The [`hostlist`] module parses the JSON array of `{host, port}` peers
//!   that seeds a [`dcache::DCache`].
//!
//! # Distributed cache
//!
//! - [`daemon`] implements the TCP server that each peer runs to serve the
//!   raw bytes of files under its local build directory.
//! - [`dcache`] implements the client side: given an ordered list of peers,
//!   ask each one in turn for a file until somebody has it.
//!
//! # Utilities
//!
//! - [`hash`] contains the MurmurHash2-A implementation used to fingerprint
//!   command lines for the build log.
//! - [`error`] contains the crate-wide [`Error`][error::Error] type, plus
//!   [`ErrorWithLocation`][error::ErrorWithLocation] for attaching file/line
//!   information to parse errors.
//! - [`config`] contains the deserializable configuration for the daemon
//!   and the cache client.

pub mod buildlog;
pub mod config;
pub mod daemon;
pub mod dcache;
pub mod depfile;
pub mod error;
pub mod hash;
pub mod hostlist;
pub mod line_reader;
pub mod mtime;
