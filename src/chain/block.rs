//! Block and header types plus their bit-exact serialized form.

use sha2::{Digest, Sha256};

use crate::error::{ChainError, Result};
use crate::merkle::Hash256;
use crate::transaction::Tx;

pub const BLOCK_VERSION: u64 = 1;
pub const PREDICATE_VERSION: u64 = 1;

/// Millisecond timestamp for newly generated block headers.
pub fn current_timestamp_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

/// Quorum threshold plus the ordered public keys authorizing the next block.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Predicate {
    pub version: u64,
    pub quorum: i32,
    pub pubkeys: Vec<[u8; 32]>,
}

impl Predicate {
    pub fn new(pubkeys: Vec<[u8; 32]>, quorum: i32) -> Self {
        Predicate { version: PREDICATE_VERSION, quorum, pubkeys }
    }
}

impl Default for Predicate {
    fn default() -> Self {
        Predicate::new(Vec::new(), 0)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BlockHeader {
    pub version: u64,
    pub height: u64,
    pub timestamp_ms: u64,
    pub transactions_root: Hash256,
    pub contracts_root: Hash256,
    pub nonces_root: Hash256,
    pub next_pred: Predicate,
}

impl BlockHeader {
    /// Wire form: little-endian fixed-width fields in declaration order,
    /// predicate keys prefixed with a u64 count. Pinned for compatibility;
    /// any change here changes every block hash.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(24 + 96 + 16 + 4 + self.next_pred.pubkeys.len() * 32);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&self.timestamp_ms.to_le_bytes());
        out.extend_from_slice(&self.transactions_root);
        out.extend_from_slice(&self.contracts_root);
        out.extend_from_slice(&self.nonces_root);
        out.extend_from_slice(&self.next_pred.version.to_le_bytes());
        out.extend_from_slice(&self.next_pred.quorum.to_le_bytes());
        out.extend_from_slice(&(self.next_pred.pubkeys.len() as u64).to_le_bytes());
        for key in &self.next_pred.pubkeys {
            out.extend_from_slice(key);
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let version = r.read_u64()?;
        let height = r.read_u64()?;
        let timestamp_ms = r.read_u64()?;
        let transactions_root = r.read_hash()?;
        let contracts_root = r.read_hash()?;
        let nonces_root = r.read_hash()?;
        let pred_version = r.read_u64()?;
        let quorum = r.read_i32()?;
        let key_count = r.read_u64()?;
        if key_count > (bytes.len() as u64) / 32 + 1 {
            return Err(ChainError::Codec(format!("implausible key count {key_count}")));
        }
        let mut pubkeys = Vec::with_capacity(key_count as usize);
        for _ in 0..key_count {
            pubkeys.push(r.read_hash()?);
        }
        r.finish()?;
        Ok(BlockHeader {
            version,
            height,
            timestamp_ms,
            transactions_root,
            contracts_root,
            nonces_root,
            next_pred: Predicate { version: pred_version, quorum, pubkeys },
        })
    }

    pub fn hash(&self) -> Hash256 {
        Sha256::digest(self.encode()).into()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Tx>,
}

impl Block {
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    pub fn hash_str(&self) -> String {
        hex::encode(self.hash())
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.bytes.len()).ok_or_else(|| {
            ChainError::Codec(format!(
                "truncated header: need {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.bytes.len()
            ))
        })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_hash(&mut self) -> Result<Hash256> {
        let bytes = self.take(32)?;
        Ok(bytes.try_into().unwrap())
    }

    fn finish(&self) -> Result<()> {
        if self.pos != self.bytes.len() {
            return Err(ChainError::Codec(format!(
                "{} trailing bytes after header",
                self.bytes.len() - self.pos
            )));
        }
        Ok(())
    }
}
