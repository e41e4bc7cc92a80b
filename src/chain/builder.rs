//! Block generation: accumulate candidate transactions against a baseline
//! snapshot, then finalize an unsigned block plus the resulting state.

use std::sync::Arc;

use crate::chain::block::{Block, BlockHeader, Predicate, BLOCK_VERSION};
use crate::error::{ChainError, Result};
use crate::merkle;
use crate::state::Snapshot;
use crate::transaction::Tx;
use crate::vm::Vm;

struct Pending {
    snapshot: Snapshot,
    pred: Predicate,
    timestamp_ms: u64,
    txs: Vec<Tx>,
}

/// Three-call state machine: `start`, `add_tx` (repeatedly), `build`.
/// Exactly one build may be in flight at a time.
pub struct BlockBuilder {
    vm: Arc<dyn Vm>,
    pending: Option<Pending>,
}

impl BlockBuilder {
    pub fn new(vm: Arc<dyn Vm>) -> Self {
        BlockBuilder { vm, pending: None }
    }

    /// Reset the accumulator and bind it to a baseline snapshot. Fails if a
    /// previous accumulation was never finished with `build`.
    pub fn start(&mut self, baseline: &Snapshot, pred: Predicate, timestamp_ms: u64) -> Result<()> {
        if self.pending.is_some() {
            return Err(ChainError::BuilderBusy);
        }
        self.pending = Some(Pending {
            snapshot: baseline.clone(),
            pred,
            timestamp_ms,
            txs: Vec::new(),
        });
        Ok(())
    }

    /// Apply one transaction to the working snapshot. An invalid transaction
    /// is reported to the caller and leaves the accumulation unchanged, so
    /// the caller can skip it and keep filling the block.
    pub fn add_tx(&mut self, tx: Tx) -> Result<()> {
        let pending = self.pending.as_mut().ok_or(ChainError::BuilderNotStarted)?;
        let next = self.vm.apply(&pending.snapshot, &tx)?;
        pending.snapshot = next;
        pending.txs.push(tx);
        Ok(())
    }

    /// Finalize the unsigned block and the projected snapshot. The pending
    /// pool is cleared unconditionally, even when no transaction made it in.
    pub fn build(&mut self) -> Result<(Block, Snapshot)> {
        let pending = self.pending.take().ok_or(ChainError::BuilderNotStarted)?;

        let height = pending.snapshot.height() + 1;
        let programs: Vec<&[u8]> = pending.txs.iter().map(|tx| tx.program.as_slice()).collect();

        let mut snapshot = pending.snapshot;
        snapshot.set_height(height);

        let header = BlockHeader {
            version: BLOCK_VERSION,
            height,
            timestamp_ms: pending.timestamp_ms,
            transactions_root: merkle::root(&programs),
            contracts_root: snapshot.contracts_root(),
            nonces_root: snapshot.nonces_root(),
            next_pred: pending.pred,
        };

        Ok((Block { header, transactions: pending.txs }, snapshot))
    }
}
