//! Double-SHA256 ("sha256d") hashing helpers.
//!
//! `Writer` lets callers hash a value's serialized bytes as they are written,
//! without a second pass over the buffer — used while parsing a block header
//! so the canonical hash can be computed for free during deserialization.

use sha2::{Digest, Sha256};
use std::io;

/// An `io::Write` sink that feeds every byte written through SHA256, twice,
/// on finish.
pub struct Writer(Sha256);

impl Writer {
    pub fn default() -> Self {
        Writer(Sha256::new())
    }

    /// Consume the writer, returning the double-SHA256 digest of everything
    /// written to it.
    pub fn finish(self) -> [u8; 32] {
        let first = self.0.finalize();
        let second = Sha256::digest(&first);
        let mut out = [0u8; 32];
        out.copy_from_slice(&second);
        out
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Double-SHA256 of `bytes`: `sha256(sha256(bytes))`.
pub fn sha256d(bytes: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(bytes);
    let second = Sha256::digest(&first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        let direct = sha256d(b"");
        let mut w = Writer::default();
        io::Write::write_all(&mut w, b"").unwrap();
        assert_eq!(direct, w.finish());
    }

    #[test]
    fn writer_matches_direct() {
        let data = b"iCSI_COIN is a wholly owned Subsidiary of BeckCoin.";
        let direct = sha256d(data);
        let mut w = Writer::default();
        io::Write::write_all(&mut w, data).unwrap();
        assert_eq!(direct, w.finish());
    }
}
