//! Pluggable payload save/load, path resolution, and the default JSON codec.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::bindings::Bindings;
use crate::error::CacheError;
use crate::value::Value;

/// How a compute node's payload path is resolved against the effective
/// bindings for one evaluation.
#[derive(Clone)]
pub enum PathSpec {
    /// A path that does not depend on bindings.
    Fixed(PathBuf),
    /// A path computed from the effective bindings -- required for foreach
    /// nodes, since each element needs a distinct path.
    Fn(Arc<dyn Fn(&Bindings) -> PathBuf + Send + Sync>),
}

impl PathSpec {
    pub fn resolve(&self, bindings: &Bindings) -> PathBuf {
        match self {
            PathSpec::Fixed(p) => p.clone(),
            PathSpec::Fn(f) => f(bindings),
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, PathSpec::Fn(_))
    }
}

/// Saves a value to `path`. User-supplied; may use any serialization the
/// caller likes.
pub type SaveFn = Arc<dyn Fn(&Value, &Path) -> Result<(), CacheError> + Send + Sync>;

/// Loads a value from `path`. Must map a missing file to
/// `std::io::ErrorKind::NotFound` inside a [`CacheError::Io`] so the cache
/// layer can treat it as a clean miss rather than a propagated error.
pub type LoadFn = Arc<dyn Fn(&Path) -> Result<Value, CacheError> + Send + Sync>;

/// The default payload codec: JSON-encodes/decodes a [`Value`] directly.
/// Provided for convenience; the cache layer itself is agnostic to the
/// payload format.
pub fn json_save() -> SaveFn {
    Arc::new(|value, path| {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::io(path, e))?;
        }
        let bytes = serde_json::to_vec(value)
            .map_err(|e| CacheError::SidecarCodec { path: path.to_path_buf(), source: e })?;
        std::fs::write(path, bytes).map_err(|e| CacheError::io(path, e))
    })
}

pub fn json_load() -> LoadFn {
    Arc::new(|path| {
        let bytes = std::fs::read(path).map_err(|e| CacheError::io(path, e))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| CacheError::SidecarCodec { path: path.to_path_buf(), source: e })
    })
}

/// Returns the sidecar path for a payload path: `dirname/.basename.dagma-vars`.
pub fn sidecar_path(payload: &Path) -> PathBuf {
    let dir = payload.parent().unwrap_or_else(|| Path::new("."));
    let basename = payload
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dir.join(format!(".{basename}.dagma-vars"))
}
