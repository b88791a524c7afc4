use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::domain::ContentHash;

/// Read size used when streaming file content through the digest.
pub const HASH_BUF_SIZE: usize = 1 << 20;

/// Stream the whole file through SHA-256.
pub fn hash_file(path: &Path) -> std::io::Result<ContentHash> {
    let f = File::open(path)?;
    hash_reader(f)
}

pub fn hash_reader<R: Read>(mut r: R) -> std::io::Result<ContentHash> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUF_SIZE];
    loop {
        let n = r.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(ContentHash::from_digest(hasher.finalize().into()))
}

pub fn hash_bytes(data: &[u8]) -> ContentHash {
    ContentHash::from_digest(Sha256::digest(data).into())
}
