//! Authenticated chain state at a point in time.

use crate::chain::block::Block;
use crate::error::{ChainError, Result};
use crate::merkle::Hash256;
use crate::state::trie::Trie;
use crate::vm::Vm;

/// Two independently rooted tries (contracts, nonces) plus the height they
/// reflect. A snapshot is immutable once built; every state transition
/// clones first, so concurrent readers of the old snapshot never observe a
/// transition in progress.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Snapshot {
    pub contracts: Trie,
    pub nonces: Trie,
    height: u64,
}

impl Snapshot {
    /// Fresh pre-genesis state: empty tries at height 0.
    pub fn initial() -> Self {
        Self::default()
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn contracts_root(&self) -> Hash256 {
        self.contracts.root_hash()
    }

    pub fn nonces_root(&self) -> Hash256 {
        self.nonces.root_hash()
    }

    pub(crate) fn set_height(&mut self, height: u64) {
        self.height = height;
    }

    /// Apply every transaction in `block` through the VM capability,
    /// yielding the state after the block. The input snapshot is never
    /// mutated; any transaction error aborts the whole application.
    pub fn apply_block(&self, block: &Block, vm: &dyn Vm) -> Result<Snapshot> {
        if block.header.height != self.height + 1 {
            return Err(ChainError::InvalidBlock(format!(
                "block height {} does not follow snapshot height {}",
                block.header.height, self.height
            )));
        }

        let mut next = self.clone();
        for tx in &block.transactions {
            next = vm.apply(&next, tx)?;
        }
        next.height = block.header.height;
        Ok(next)
    }
}
