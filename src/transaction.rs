//! Transaction carrier for the commitment core.
//!
//! A transaction is an opaque program plus the effect log the VM derives
//! from running it. The core never interprets programs itself; it commits
//! the raw program bytes into the transactions root and hands the effect
//! log to the VM capability.

use sha2::{Digest, Sha256};

use crate::merkle::Hash256;

/// Maximum program size in bytes to prevent oversized blocks.
pub const MAX_PROGRAM_SIZE: usize = 100_000;

/// One state effect produced by executing a transaction program.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Effect {
    CreateContract { id: Hash256, data: Vec<u8> },
    DestroyContract { id: Hash256 },
    AddNonce { id: Hash256, expiry_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Tx {
    pub program: Vec<u8>,
    pub version: u64,
    pub runlimit: u64,
    pub effects: Vec<Effect>,
}

impl Tx {
    pub fn new(program: Vec<u8>, version: u64, runlimit: u64, effects: Vec<Effect>) -> Self {
        Tx { program, version, runlimit, effects }
    }

    /// Transaction identity: hash of the committed program bytes.
    pub fn id(&self) -> Hash256 {
        Sha256::digest(&self.program).into()
    }

    pub fn id_str(&self) -> String {
        hex::encode(self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_depends_on_program_only() {
        let a = Tx::new(b"prog".to_vec(), 1, 100, vec![]);
        let b = Tx::new(
            b"prog".to_vec(),
            1,
            999,
            vec![Effect::AddNonce { id: [1u8; 32], expiry_ms: 5 }],
        );
        assert_eq!(a.id(), b.id());
        assert_eq!(a.id_str().len(), 64);

        let c = Tx::new(b"other".to_vec(), 1, 100, vec![]);
        assert_ne!(a.id(), c.id());
    }
}
