use std::io::{Result, Write};

use sha2::{Digest, Sha256};

use crate::domain::ContentHash;

/// Write adapter that digests everything passing through to `inner`.
pub struct HashingForward<W: Write> {
    inner: W,
    hasher: Sha256,
    pub counted: u64,
}

impl<W: Write> HashingForward<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            counted: 0,
        }
    }

    pub fn finish(self) -> (W, ContentHash) {
        let digest = ContentHash::from_digest(self.hasher.finalize().into());
        (self.inner, digest)
    }
}

impl<W: Write> Write for HashingForward<W> {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.counted += n as u64;
        Ok(n)
    }
    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256::hash_bytes;

    #[test]
    fn digest_matches_direct_hash() {
        let mut fwd = HashingForward::new(Vec::new());
        fwd.write_all(b"hello ").unwrap();
        fwd.write_all(b"world").unwrap();
        assert_eq!(fwd.counted, 11);
        let (out, digest) = fwd.finish();
        assert_eq!(out, b"hello world");
        assert_eq!(digest, hash_bytes(b"hello world"));
    }
}
