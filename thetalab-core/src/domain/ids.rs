//! Identifier newtypes.

use serde::{Deserialize, Serialize};

/// Sequential order-intent id, unique within one run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct IntentId(pub u64);

/// Sequential position id, unique within one run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PositionId(pub u64);

/// BLAKE3 identity of a run configuration.
///
/// Hashing the canonical JSON serialization makes the id stable across
/// processes and platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub [u8; 32]);

impl RunId {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// First 12 hex chars, for directory names and log lines.
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_is_deterministic() {
        let a = RunId::from_bytes(b"config-v1");
        let b = RunId::from_bytes(b"config-v1");
        let c = RunId::from_bytes(b"config-v2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn run_id_hex_is_64_chars() {
        let id = RunId::from_bytes(b"x");
        assert_eq!(id.to_hex().len(), 64);
        assert_eq!(id.short().len(), 12);
    }
}
