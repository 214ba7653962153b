// Identity space — router identities, path identifiers, XOR distance

pub mod keys;

pub use keys::Keypair;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Length of a router identity (an Ed25519 public key)
pub const ROUTER_ID_LEN: usize = 32;

/// Length of a per-hop path identifier
pub const PATH_ID_LEN: usize = 16;

/// A router identity: the Ed25519 public key naming a network participant.
///
/// This is the universal key for directory entries, trust sets and circuit
/// dispatch. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RouterId([u8; ROUTER_ID_LEN]);

impl RouterId {
    pub fn from_bytes(bytes: [u8; ROUTER_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ROUTER_ID_LEN] {
        &self.0
    }

    /// Parse from a 64-char hex string (the on-disk / config encoding)
    pub fn from_hex(s: &str) -> Option<Self> {
        let raw = hex::decode(s).ok()?;
        let bytes: [u8; ROUTER_ID_LEN] = raw.try_into().ok()?;
        Some(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// XOR-metric distance to another point in the identity space.
    ///
    /// Distances compare lexicographically, which matches the usual
    /// big-endian interpretation of the XOR metric.
    pub fn distance(&self, other: &RouterId) -> Distance {
        let mut out = [0u8; ROUTER_ID_LEN];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        Distance(out)
    }
}

impl fmt::Display for RouterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for RouterId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for RouterId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        RouterId::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom("expected 64 hex chars of router id"))
    }
}

/// Distance between two identities under the XOR metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Distance([u8; ROUTER_ID_LEN]);

impl Distance {
    pub fn as_bytes(&self) -> &[u8; ROUTER_ID_LEN] {
        &self.0
    }
}

/// Opaque token naming one circuit segment at a hop.
///
/// Keys upstream/downstream relay dispatch; not owned by the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathId([u8; PATH_ID_LEN]);

impl PathId {
    pub fn from_bytes(bytes: [u8; PATH_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PATH_ID_LEN] {
        &self.0
    }

    /// Generate a fresh random path identifier
    pub fn random() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; PATH_ID_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> RouterId {
        let mut bytes = [0u8; ROUTER_ID_LEN];
        bytes[0] = n;
        RouterId::from_bytes(bytes)
    }

    #[test]
    fn test_hex_roundtrip() {
        let a = id(0xab);
        let restored = RouterId::from_hex(&a.to_hex()).unwrap();
        assert_eq!(a, restored);
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(RouterId::from_hex("abcd").is_none());
        assert!(RouterId::from_hex(&"zz".repeat(32)).is_none());
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = id(1);
        let b = id(7);
        assert_eq!(a.distance(&b), b.distance(&a));
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let a = id(9);
        assert_eq!(a.distance(&a).as_bytes(), &[0u8; ROUTER_ID_LEN]);
    }

    #[test]
    fn test_distance_ordering() {
        // 1^0 = 1 < 1^2 = 3: id(0) is closer to id(1) than id(2) is
        let target = id(1);
        assert!(target.distance(&id(0)) < target.distance(&id(2)));
    }

    #[test]
    fn test_path_id_random_is_unique() {
        assert_ne!(PathId::random(), PathId::random());
    }
}
