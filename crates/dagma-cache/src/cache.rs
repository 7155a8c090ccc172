//! The on-disk artifact cache: composes the file-I/O layer and the hashing
//! utility to persist a compute node's output plus a sidecar recording the
//! bindings, content checksum, and transform fingerprint it was produced
//! under.

use tracing::{info, warn};

use crate::bindings::Bindings;
use crate::error::CacheError;
use crate::file_io::{sidecar_path, LoadFn, PathSpec, SaveFn};
use crate::fingerprint::Fingerprint;
use crate::hashing::{hash_file, DigestFactory};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Everything a compute node needs to persist and recall its output.
#[derive(Clone)]
pub struct CacheDescriptor {
    pub path: PathSpec,
    pub save: SaveFn,
    pub load: LoadFn,
    pub digest: DigestFactory,
}

impl CacheDescriptor {
    /// Foreach nodes require a path that's a function of bindings, since
    /// per-element results need distinct paths. Constructors call this and
    /// surface `foreach-path-must-be-callable` if it fails.
    pub fn requires_callable_path(&self) -> bool {
        self.path.is_callable()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    bindings: Bindings,
    checksum: String,
    fingerprint: Fingerprint,
}

pub enum CacheOutcome {
    Hit(Value),
    Miss,
}

/// Runs the cache-hit protocol (spec §4.4) for one compute node evaluation.
pub fn cache_lookup(
    desc: &CacheDescriptor,
    effective: &Bindings,
    current_fingerprint: &Fingerprint,
) -> Result<CacheOutcome, CacheError> {
    let payload_path = desc.path.resolve(effective);
    if !payload_path.exists() {
        info!(path = %payload_path.display(), "dagma cache miss: no payload");
        return Ok(CacheOutcome::Miss);
    }

    let sidecar = sidecar_path(&payload_path);
    let sidecar: Sidecar = match std::fs::read(&sidecar) {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(s) => s,
            Err(_) => {
                info!(path = %sidecar.display(), "dagma cache miss: undecodable sidecar");
                return Ok(CacheOutcome::Miss);
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %sidecar.display(), "dagma cache miss: no sidecar");
            return Ok(CacheOutcome::Miss);
        }
        Err(e) => return Err(CacheError::io(sidecar, e)),
    };

    if sidecar.bindings != *effective {
        info!("dagma cache miss: bindings mismatch");
        return Ok(CacheOutcome::Miss);
    }

    let checksum = hash_file(&payload_path, &desc.digest)?;
    if checksum != sidecar.checksum {
        warn!(path = %payload_path.display(), "dagma cache: checksum mismatch, treating as miss");
        return Ok(CacheOutcome::Miss);
    }

    if sidecar.fingerprint != *current_fingerprint {
        warn!("dagma cache: transform fingerprint changed, honoring cached artifact anyway");
    }

    match (desc.load)(&payload_path) {
        Ok(value) => Ok(CacheOutcome::Hit(value)),
        Err(CacheError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            info!("dagma cache miss: payload vanished between checksum and load");
            Ok(CacheOutcome::Miss)
        }
        Err(e) => Err(e),
    }
}

/// Runs the cache-write protocol (spec §4.4) after a fresh transform call.
pub fn cache_store(
    desc: &CacheDescriptor,
    effective: &Bindings,
    value: &Value,
    fingerprint: &Fingerprint,
) -> Result<(), CacheError> {
    let payload_path = desc.path.resolve(effective);
    (desc.save)(value, &payload_path)?;

    let checksum = hash_file(&payload_path, &desc.digest)?;
    let sidecar = Sidecar {
        bindings: effective.clone(),
        checksum,
        fingerprint: fingerprint.clone(),
    };

    let sidecar_path = sidecar_path(&payload_path);
    let bytes = serde_json::to_vec(&sidecar)
        .map_err(|e| CacheError::SidecarCodec { path: sidecar_path.clone(), source: e })?;
    std::fs::write(&sidecar_path, bytes).map_err(|e| CacheError::io(sidecar_path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_io::{json_load, json_save};
    use crate::hashing::md5_digest;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    fn descriptor(path: PathBuf) -> CacheDescriptor {
        CacheDescriptor {
            path: PathSpec::Fixed(path),
            save: json_save(),
            load: json_load(),
            digest: md5_digest(),
        }
    }

    #[test]
    fn miss_when_no_payload() {
        let dir = tempfile::tempdir().unwrap();
        let desc = descriptor(dir.path().join("out.json"));
        let outcome = cache_lookup(&desc, &Bindings::new(), &Fingerprint::from_version("v1", 0)).unwrap();
        assert!(matches!(outcome, CacheOutcome::Miss));
    }

    #[test]
    fn roundtrip_hit() {
        let dir = tempfile::tempdir().unwrap();
        let desc = descriptor(dir.path().join("out.json"));
        let bindings = Bindings::from_pairs([("x", Value::Int(5))]);
        let fp = Fingerprint::from_version("v1", 1);

        cache_store(&desc, &bindings, &Value::Int(6), &fp).unwrap();
        let outcome = cache_lookup(&desc, &bindings, &fp).unwrap();
        match outcome {
            CacheOutcome::Hit(v) => assert_eq!(v, Value::Int(6)),
            CacheOutcome::Miss => panic!("expected hit"),
        }
    }

    #[test]
    fn bindings_mismatch_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let desc = descriptor(dir.path().join("out.json"));
        let fp = Fingerprint::from_version("v1", 1);

        let bindings = Bindings::from_pairs([("x", Value::Int(5))]);
        cache_store(&desc, &bindings, &Value::Int(6), &fp).unwrap();

        let other = Bindings::from_pairs([("x", Value::Int(6))]);
        let outcome = cache_lookup(&desc, &other, &fp).unwrap();
        assert!(matches!(outcome, CacheOutcome::Miss));
    }

    #[test]
    fn fingerprint_mismatch_still_hits() {
        let dir = tempfile::tempdir().unwrap();
        let desc = descriptor(dir.path().join("out.json"));
        let bindings = Bindings::new();

        cache_store(&desc, &bindings, &Value::Int(1), &Fingerprint::from_version("v1", 0)).unwrap();
        let outcome = cache_lookup(&desc, &bindings, &Fingerprint::from_version("v2", 0)).unwrap();
        match outcome {
            CacheOutcome::Hit(v) => assert_eq!(v, Value::Int(1)),
            CacheOutcome::Miss => panic!("fingerprint drift must warn, not miss"),
        }
    }

    #[test]
    fn corrupted_payload_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let payload = dir.path().join("out.json");
        let desc = descriptor(payload.clone());
        let bindings = Bindings::new();
        let fp = Fingerprint::from_version("v1", 0);

        cache_store(&desc, &bindings, &Value::Int(1013), &fp).unwrap();
        std::fs::write(&payload, b"3").unwrap();

        let outcome = cache_lookup(&desc, &bindings, &fp).unwrap();
        assert!(matches!(outcome, CacheOutcome::Miss));
    }

    #[test]
    fn transform_is_skipped_only_on_hit() {
        let dir = tempfile::tempdir().unwrap();
        let desc = descriptor(dir.path().join("out.json"));
        let bindings = Bindings::from_pairs([("x", Value::Int(1013))]);
        let fp = Fingerprint::from_version("v1", 1);

        let calls = Arc::new(Mutex::new(0));
        let run = |calls: &Arc<Mutex<i64>>| -> Value {
            *calls.lock().unwrap() += 1;
            Value::Int(1014)
        };

        // First run: miss, compute, store.
        assert!(matches!(
            cache_lookup(&desc, &bindings, &fp).unwrap(),
            CacheOutcome::Miss
        ));
        let v = run(&calls);
        cache_store(&desc, &bindings, &v, &fp).unwrap();
        assert_eq!(*calls.lock().unwrap(), 1);

        // Second run: hit, transform not called.
        match cache_lookup(&desc, &bindings, &fp).unwrap() {
            CacheOutcome::Hit(v) => assert_eq!(v, Value::Int(1014)),
            CacheOutcome::Miss => panic!("expected hit"),
        }
        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
