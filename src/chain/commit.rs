//! Chain coordinator: sequences block generation, verifies and commits
//! blocks, and checkpoints snapshots in the background.
//!
//! Commit callers run in parallel; there is no global lock around the
//! commit path. The tip is installed with a short "install if newer"
//! critical section, so concurrent commits of heights h and h+1 converge
//! to h+1 regardless of arrival order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::chain::block::{Block, BlockHeader, Predicate, BLOCK_VERSION};
use crate::chain::builder::BlockBuilder;
use crate::config::CheckpointConfig;
use crate::error::{ChainError, Result};
use crate::merkle::EMPTY_ROOT;
use crate::state::Snapshot;
use crate::store::Store;
use crate::transaction::Tx;
use crate::vm::Vm;

#[derive(Clone)]
struct Tip {
    snapshot: Arc<Snapshot>,
    pred: Predicate,
}

pub struct Chain {
    store: Arc<dyn Store>,
    vm: Arc<dyn Vm>,
    tip: RwLock<Tip>,
    builder: Mutex<BlockBuilder>,
    checkpoint_tx: Sender<Arc<Snapshot>>,
    last_checkpoint: AtomicU64,
    checkpoint_interval: u64,
}

impl Chain {
    pub fn new(store: Arc<dyn Store>, vm: Arc<dyn Vm>, checkpoint: &CheckpointConfig) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(checkpoint.queue_depth);
        spawn_checkpoint_worker(store.clone(), rx);

        Chain {
            store,
            vm: vm.clone(),
            tip: RwLock::new(Tip {
                snapshot: Arc::new(Snapshot::initial()),
                pred: Predicate::default(),
            }),
            builder: Mutex::new(BlockBuilder::new(vm)),
            checkpoint_tx: tx,
            last_checkpoint: AtomicU64::new(0),
            checkpoint_interval: checkpoint.interval_blocks,
        }
    }

    /// Genesis block: height 1, empty roots, and the predicate that
    /// authorizes whoever signs the next block.
    pub fn initial_block(pubkeys: Vec<[u8; 32]>, quorum: i32, timestamp_ms: u64) -> Block {
        let empty = Snapshot::initial();
        Block {
            header: BlockHeader {
                version: BLOCK_VERSION,
                height: 1,
                timestamp_ms,
                transactions_root: *EMPTY_ROOT,
                contracts_root: empty.contracts_root(),
                nonces_root: empty.nonces_root(),
                next_pred: Predicate::new(pubkeys, quorum),
            },
            transactions: Vec::new(),
        }
    }

    /// Committed state as of the last finalized block.
    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.tip.read().snapshot.clone()
    }

    pub fn height(&self) -> u64 {
        self.tip.read().snapshot.height()
    }

    /// Drive the block builder over the current tip. Invalid transactions
    /// are skipped and logged; committed state is untouched.
    pub fn generate_block(&self, timestamp_ms: u64, txs: Vec<Tx>) -> Result<(Block, Snapshot)> {
        let tip = self.tip.read().clone();
        let mut builder = self.builder.lock();
        builder.start(&tip.snapshot, tip.pred, timestamp_ms)?;
        for tx in txs {
            let id = tx.id_str();
            if let Err(e) = builder.add_tx(tx) {
                warn!("Skipping invalid transaction {}: {}", id, e);
            }
        }
        builder.build()
    }

    /// General commit path for blocks received from elsewhere: append,
    /// short-circuit on stale height, recompute state, verify declared
    /// roots bit for bit, then finalize.
    pub fn commit_block(&self, block: Block) -> Result<()> {
        self.store.save_block(block.header.height, &block)?;

        if block.header.height <= self.height() {
            return Ok(());
        }

        let current = self.tip.read().snapshot.clone();
        let snapshot = current.apply_block(&block, self.vm.as_ref())?;

        if snapshot.contracts_root() != block.header.contracts_root {
            return Err(ChainError::BadContractsRoot {
                declared: hex::encode(block.header.contracts_root),
                computed: hex::encode(snapshot.contracts_root()),
            });
        }
        if snapshot.nonces_root() != block.header.nonces_root {
            return Err(ChainError::BadNoncesRoot {
                declared: hex::encode(block.header.nonces_root),
                computed: hex::encode(snapshot.nonces_root()),
            });
        }

        self.finalize_commit_state(snapshot, block.header.next_pred)
    }

    /// Fast path for self-generated blocks: the caller already computed and
    /// trusts `snapshot`, so root recomputation is skipped. The durable
    /// append and the idempotency short-circuit are preserved.
    pub fn commit_applied_block(&self, block: &Block, snapshot: Snapshot) -> Result<()> {
        self.store.save_block(block.header.height, block)?;

        if block.header.height <= self.height() {
            return Ok(());
        }

        self.finalize_commit_state(snapshot, block.header.next_pred.clone())
    }

    fn finalize_commit_state(&self, snapshot: Snapshot, pred: Predicate) -> Result<()> {
        let height = snapshot.height();
        let snapshot = Arc::new(snapshot);

        self.maybe_enqueue_checkpoint(&snapshot);

        {
            // Highest height wins, not last writer: a stale concurrent
            // commit never clobbers a newer tip.
            let mut tip = self.tip.write();
            if height > tip.snapshot.height() {
                *tip = Tip { snapshot, pred };
            }
        }

        self.store.finalize_height(height)
    }

    /// Best-effort checkpoint enqueue, never on the critical path. The
    /// last-queued counter race is tolerated: worst case one redundant or
    /// one skipped attempt.
    fn maybe_enqueue_checkpoint(&self, snapshot: &Arc<Snapshot>) {
        let height = snapshot.height();
        let last = self.last_checkpoint.load(Ordering::Relaxed);
        if height.saturating_sub(last) <= self.checkpoint_interval {
            return;
        }
        if self
            .last_checkpoint
            .compare_exchange(last, height, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            // another commit claimed this checkpoint window
            return;
        }
        match self.checkpoint_tx.try_send(snapshot.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Checkpoint queue full; dropping snapshot at height {}", height);
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("Checkpoint worker gone; dropping snapshot at height {}", height);
            }
        }
    }
}

fn spawn_checkpoint_worker(store: Arc<dyn Store>, rx: Receiver<Arc<Snapshot>>) {
    thread::spawn(move || {
        // Exits once every sender is dropped.
        for snapshot in rx {
            let height = snapshot.height();
            let started = Instant::now();
            match store.save_snapshot(height, &snapshot) {
                Ok(()) => debug!(
                    "Persisted snapshot checkpoint at height {} in {:?}",
                    height,
                    started.elapsed()
                ),
                Err(e) => warn!("Failed to persist snapshot at height {}: {}", height, e),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CheckpointConfig;
    use crate::store::InMemoryStore;
    use crate::transaction::Effect;
    use crate::vm::EffectVm;

    fn test_chain(store: Arc<InMemoryStore>) -> Chain {
        let checkpoint = CheckpointConfig { interval_blocks: 2, queue_depth: 4 };
        Chain::new(store, Arc::new(EffectVm), &checkpoint)
    }

    fn chain_with_genesis() -> (Chain, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let chain = test_chain(store.clone());
        chain.commit_block(Chain::initial_block(vec![[1u8; 32]], 1, 1000)).unwrap();
        assert_eq!(chain.height(), 1);
        (chain, store)
    }

    fn nonce_tx(id: u8) -> Tx {
        Tx::new(
            vec![b't', id],
            1,
            100,
            vec![Effect::AddNonce { id: [id; 32], expiry_ms: 1000 }],
        )
    }

    #[test]
    fn genesis_block_has_empty_roots() {
        let genesis = Chain::initial_block(vec![[1u8; 32], [2u8; 32]], 2, 7);
        assert_eq!(genesis.header.height, 1);
        assert_eq!(genesis.header.transactions_root, *EMPTY_ROOT);
        assert_eq!(genesis.header.contracts_root, *EMPTY_ROOT);
        assert_eq!(genesis.header.next_pred.pubkeys.len(), 2);
    }

    #[test]
    fn generate_block_skips_invalid_transactions() {
        let (chain, _) = chain_with_genesis();
        let bad = Tx::new(Vec::new(), 1, 100, vec![]); // empty program
        let (block, snapshot) = chain
            .generate_block(2000, vec![nonce_tx(1), bad, nonce_tx(2)])
            .unwrap();
        assert_eq!(block.header.height, 2);
        assert_eq!(block.transactions.len(), 2);
        assert_eq!(snapshot.nonces.len(), 2);
        // generation does not advance committed state
        assert_eq!(chain.height(), 1);
    }

    #[test]
    fn commit_block_and_fast_path_agree() {
        let (chain, _) = chain_with_genesis();
        let (block, snapshot) = chain.generate_block(2000, vec![nonce_tx(1)]).unwrap();

        let (other, _) = chain_with_genesis();
        other.commit_block(block.clone()).unwrap();
        chain.commit_applied_block(&block, snapshot).unwrap();

        assert_eq!(chain.height(), 2);
        assert_eq!(other.height(), 2);
        assert_eq!(
            chain.current_snapshot().contracts_root(),
            other.current_snapshot().contracts_root()
        );
        assert_eq!(
            chain.current_snapshot().nonces_root(),
            other.current_snapshot().nonces_root()
        );
    }

    #[test]
    fn recommit_is_idempotent() {
        let (chain, _) = chain_with_genesis();
        let (block, snapshot) = chain.generate_block(2000, vec![nonce_tx(1)]).unwrap();
        chain.commit_applied_block(&block, snapshot).unwrap();

        let height = chain.height();
        let root = chain.current_snapshot().nonces_root();

        // same block again, both paths
        chain.commit_block(block.clone()).unwrap();
        chain
            .commit_applied_block(&block, chain.current_snapshot().as_ref().clone())
            .unwrap();

        assert_eq!(chain.height(), height);
        assert_eq!(chain.current_snapshot().nonces_root(), root);
    }

    #[test]
    fn stale_height_commit_is_a_noop() {
        let (chain, _) = chain_with_genesis();
        let (b2, s2) = chain.generate_block(2000, vec![nonce_tx(1)]).unwrap();
        chain.commit_applied_block(&b2, s2).unwrap();

        let root = chain.current_snapshot().nonces_root();
        chain.commit_block(Chain::initial_block(vec![[1u8; 32]], 1, 1000)).unwrap();
        assert_eq!(chain.height(), 2);
        assert_eq!(chain.current_snapshot().nonces_root(), root);
    }

    #[test]
    fn bad_declared_roots_are_rejected() {
        let (chain, _) = chain_with_genesis();
        let (mut block, _) = chain.generate_block(2000, vec![nonce_tx(1)]).unwrap();
        block.header.contracts_root = [0xAA; 32];

        let err = chain.commit_block(block).unwrap_err();
        assert!(matches!(err, ChainError::BadContractsRoot { .. }));
        assert_eq!(chain.height(), 1);

        let (mut block, _) = chain.generate_block(2000, vec![nonce_tx(1)]).unwrap();
        block.header.nonces_root = [0xBB; 32];
        let err = chain.commit_block(block).unwrap_err();
        assert!(matches!(err, ChainError::BadNoncesRoot { .. }));
        assert_eq!(chain.height(), 1);
    }

    #[test]
    fn concurrent_commits_converge_to_highest_height() {
        for order in [false, true] {
            let (chain, _) = chain_with_genesis();
            let (b2, s2) = chain.generate_block(2000, vec![nonce_tx(1)]).unwrap();
            let s2_for_b3 = s2.clone();

            // build height 3 on top of the projected height-2 state
            let vm = EffectVm;
            let s3 = {
                let mut s = vm.apply(&s2_for_b3, &nonce_tx(2)).unwrap();
                s.set_height(3);
                s
            };
            let b3 = Block {
                header: BlockHeader {
                    version: BLOCK_VERSION,
                    height: 3,
                    timestamp_ms: 3000,
                    transactions_root: crate::merkle::root(&[&nonce_tx(2).program]),
                    contracts_root: s3.contracts_root(),
                    nonces_root: s3.nonces_root(),
                    next_pred: b2.header.next_pred.clone(),
                },
                transactions: vec![nonce_tx(2)],
            };

            let chain = Arc::new(chain);
            let (first, second) = if order {
                ((b3.clone(), s3.clone()), (b2.clone(), s2.clone()))
            } else {
                ((b2.clone(), s2.clone()), (b3.clone(), s3.clone()))
            };

            let c1 = chain.clone();
            let t1 = thread::spawn(move || c1.commit_applied_block(&first.0, first.1));
            let c2 = chain.clone();
            let t2 = thread::spawn(move || c2.commit_applied_block(&second.0, second.1));
            t1.join().unwrap().unwrap();
            t2.join().unwrap().unwrap();

            assert_eq!(chain.height(), 3);
            assert_eq!(chain.current_snapshot().nonces_root(), s3.nonces_root());
        }
    }

    #[test]
    fn checkpoints_are_enqueued_past_the_interval() {
        let (chain, store) = chain_with_genesis();
        for _ in 0..5 {
            let (block, snapshot) = chain.generate_block(2000, vec![]).unwrap();
            chain.commit_applied_block(&block, snapshot).unwrap();
        }
        assert_eq!(chain.height(), 6);

        // interval_blocks = 2, so at least one snapshot past height 2 was
        // queued; give the worker a moment to drain.
        let deadline = Instant::now() + std::time::Duration::from_secs(2);
        loop {
            if store.snapshot_count() > 0 || Instant::now() > deadline {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(store.snapshot_count() > 0);
        assert_eq!(store.finalized_height(), 6);
    }
}
