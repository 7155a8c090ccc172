//! An opaque, advisory identity for a compute node's transform body.
//!
//! Rust closures carry no introspectable bytecode the way a dynamic
//! language's function objects do, so the fingerprint is synthesized from
//! what's observable at node-construction time: arity, plus either a
//! user-supplied version tag or the transform's data-pointer identity
//! (process-lifetime stable, not cross-run stable). It is never
//! authoritative -- see the cache-hit protocol in `dagma-cache::cache`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Either a user-supplied version tag, or a hex rendering of the
    /// transform's data-pointer identity if none was given.
    identity: String,
    arity: usize,
}

impl Fingerprint {
    pub fn from_version(version: &str, arity: usize) -> Self {
        Fingerprint { identity: version.to_string(), arity }
    }

    pub fn from_pointer(ptr: usize, arity: usize) -> Self {
        Fingerprint { identity: format!("ptr:{ptr:x}"), arity }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_tags_compare_by_value() {
        let a = Fingerprint::from_version("v1", 2);
        let b = Fingerprint::from_version("v1", 2);
        let c = Fingerprint::from_version("v2", 2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn arity_participates_in_equality() {
        let a = Fingerprint::from_version("v1", 2);
        let b = Fingerprint::from_version("v1", 3);
        assert_ne!(a, b);
    }

    #[test]
    fn serde_roundtrip() {
        let fp = Fingerprint::from_pointer(0xdead_beef, 1);
        let json = serde_json::to_string(&fp).unwrap();
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(fp, back);
    }
}
