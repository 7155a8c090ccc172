//! Value model, hashing, file I/O, and the on-disk artifact cache.
//!
//! This is the leaf crate of the dagma workspace: it has no dependency on
//! the node/graph model in `dagma-core`, only on plain data (`Value`,
//! `Bindings`) and the filesystem. `dagma-core` depends on this crate for
//! both the value representation and the cache-hit/cache-write protocol
//! invoked from a compute node's evaluation path.

mod bindings;
mod cache;
mod error;
mod file_io;
mod fingerprint;
mod hashing;
mod value;

pub use bindings::Bindings;
pub use cache::{cache_lookup, cache_store, CacheDescriptor, CacheOutcome};
pub use error::CacheError;
pub use file_io::{json_load, json_save, sidecar_path, LoadFn, PathSpec, SaveFn};
pub use fingerprint::Fingerprint;
pub use hashing::{blake3_digest, hash_file, md5_digest, DigestFactory, Hasher64, HASH_BLOCK_SIZE};
pub use value::Value;
