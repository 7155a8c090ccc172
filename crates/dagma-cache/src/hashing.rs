//! Streams a file through a pluggable digest, 64 KiB at a time.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::error::CacheError;

/// Block size used when streaming a file through a digest. Matches the
/// reference implementation's chunking (64 KiB).
pub const HASH_BLOCK_SIZE: usize = 64 * 1024;

/// A running digest over a byte stream, finalized into a lowercase hex
/// string. Implementors back this with whatever hashing crate they like;
/// the cache layer only depends on this trait.
pub trait Hasher64: Send + Sync {
    fn update(&mut self, chunk: &[u8]);
    fn finalize_hex(self: Box<Self>) -> String;
}

struct Md5Hasher(md5::Context);

impl Hasher64 for Md5Hasher {
    fn update(&mut self, chunk: &[u8]) {
        self.0.consume(chunk);
    }

    fn finalize_hex(self: Box<Self>) -> String {
        format!("{:x}", self.0.compute())
    }
}

struct Blake3Hasher(blake3::Hasher);

impl Hasher64 for Blake3Hasher {
    fn update(&mut self, chunk: &[u8]) {
        self.0.update(chunk);
    }

    fn finalize_hex(self: Box<Self>) -> String {
        self.0.finalize().to_hex().to_string()
    }
}

/// A factory that produces a fresh hasher instance, mirroring the reference
/// implementation's pattern of passing a callable (e.g. `hashlib.md5`) as the
/// digest algorithm.
pub type DigestFactory = Arc<dyn Fn() -> Box<dyn Hasher64> + Send + Sync>;

/// The default digest algorithm (MD5, per the external interface spec).
pub fn md5_digest() -> DigestFactory {
    Arc::new(|| Box::new(Md5Hasher(md5::Context::new())))
}

/// An alternate digest algorithm for callers who want a modern, faster hash.
pub fn blake3_digest() -> DigestFactory {
    Arc::new(|| Box::new(Blake3Hasher(blake3::Hasher::new())))
}

/// Streams `path` through `digest` in [`HASH_BLOCK_SIZE`] blocks, returning
/// the lowercase hex digest.
pub fn hash_file(path: &Path, digest: &DigestFactory) -> Result<String, CacheError> {
    let mut file = File::open(path).map_err(|e| CacheError::io(path, e))?;
    let mut hasher = digest();
    let mut buf = vec![0u8; HASH_BLOCK_SIZE];
    loop {
        let n = file.read(&mut buf).map_err(|e| CacheError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize_hex())
}
