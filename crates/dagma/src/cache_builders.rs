//! Convenience `CacheDescriptor` constructors using the default JSON codec
//! and MD5 digest -- the common case for most callers, who don't need a
//! custom payload format or a different checksum algorithm.

use std::path::PathBuf;
use std::sync::Arc;

use dagma_cache::{json_load, json_save, md5_digest, Bindings, CacheDescriptor, PathSpec};

/// A cache descriptor at a path that does not depend on bindings.
pub fn fixed_path_cache(path: impl Into<PathBuf>) -> CacheDescriptor {
    CacheDescriptor {
        path: PathSpec::Fixed(path.into()),
        save: json_save(),
        load: json_load(),
        digest: md5_digest(),
    }
}

/// A cache descriptor at a path derived from the effective bindings --
/// required for foreach nodes, since each element needs a distinct path.
pub fn dynamic_path_cache(
    path_fn: impl Fn(&Bindings) -> PathBuf + Send + Sync + 'static,
) -> CacheDescriptor {
    CacheDescriptor {
        path: PathSpec::Fn(Arc::new(path_fn)),
        save: json_save(),
        load: json_load(),
        digest: md5_digest(),
    }
}
