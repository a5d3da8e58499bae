//! 64-bit MurmurHash2-A, used to fingerprint command lines for the build log.

use byteorder::{ByteOrder, LE};

const SEED: u64 = 0xdecafbaddecafbad;
const M: u64 = 0xc6a4a7935bd1e995;
const R: u32 = 47;

/// Calculate the 'Murmur 64A' hash of `key`.
///
/// The seed and constants are part of the on-disk build log format: the
/// result of this function is persisted as hex, and must stay stable across
/// runs and machines.
pub fn murmur_hash_64a(key: &[u8]) -> u64 {
	let mut h = SEED ^ M.wrapping_mul(key.len() as u64);
	let mut iter = key.chunks_exact(8);
	for part in &mut iter {
		let k = M.wrapping_mul(LE::read_u64(part));
		h = M.wrapping_mul(h ^ M.wrapping_mul(k ^ k >> R));
	}
	let part = iter.remainder();
	if !part.is_empty() {
		h = M.wrapping_mul(h ^ LE::read_uint(part, part.len()));
	}
	h = M.wrapping_mul(h ^ h >> R);
	h ^ h >> R
}
