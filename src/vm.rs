//! Opaque transaction-executor capability.
//!
//! The commit protocol only needs "apply transaction to snapshot, yield new
//! snapshot or error", deterministic and side-effect-free on its input.
//! [`EffectVm`] is the built-in implementation: it replays a transaction's
//! declared effect log against the snapshot's tries, failing closed on any
//! inconsistency (replayed nonce, duplicate contract, missing contract).

use crate::error::{ChainError, Result};
use crate::state::Snapshot;
use crate::transaction::{Effect, Tx, MAX_PROGRAM_SIZE};

/// Highest transaction version this node executes.
pub const CURRENT_TX_VERSION: u64 = 1;

pub trait Vm: Send + Sync {
    /// Static checks on a program before execution.
    fn validate(&self, program: &[u8], version: u64, runlimit: u64) -> Result<()>;

    /// Execute `tx` against `snapshot`, returning the successor state.
    /// Must be deterministic and must not mutate the input snapshot.
    fn apply(&self, snapshot: &Snapshot, tx: &Tx) -> Result<Snapshot>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EffectVm;

impl Vm for EffectVm {
    fn validate(&self, program: &[u8], version: u64, runlimit: u64) -> Result<()> {
        if program.is_empty() {
            return Err(ChainError::InvalidTransaction("empty program".to_string()));
        }
        if program.len() > MAX_PROGRAM_SIZE {
            return Err(ChainError::InvalidTransaction(format!(
                "program too large: {} bytes (max: {})",
                program.len(),
                MAX_PROGRAM_SIZE
            )));
        }
        if version == 0 || version > CURRENT_TX_VERSION {
            return Err(ChainError::InvalidTransaction(format!(
                "unsupported transaction version {version}"
            )));
        }
        if runlimit < program.len() as u64 {
            return Err(ChainError::InvalidTransaction(format!(
                "runlimit {} below program cost {}",
                runlimit,
                program.len()
            )));
        }
        Ok(())
    }

    fn apply(&self, snapshot: &Snapshot, tx: &Tx) -> Result<Snapshot> {
        self.validate(&tx.program, tx.version, tx.runlimit)?;

        let mut next = snapshot.clone();
        for effect in &tx.effects {
            match effect {
                Effect::CreateContract { id, data } => {
                    if next.contracts.contains_key(id) {
                        return Err(ChainError::InvalidTransaction(format!(
                            "contract {} already exists",
                            hex::encode(id)
                        )));
                    }
                    next.contracts.insert(id.to_vec(), data.clone());
                }
                Effect::DestroyContract { id } => {
                    if next.contracts.remove(id).is_none() {
                        return Err(ChainError::InvalidTransaction(format!(
                            "contract {} not found",
                            hex::encode(id)
                        )));
                    }
                }
                Effect::AddNonce { id, expiry_ms } => {
                    if next.nonces.contains_key(id) {
                        return Err(ChainError::InvalidTransaction(format!(
                            "nonce {} already recorded",
                            hex::encode(id)
                        )));
                    }
                    next.nonces.insert(id.to_vec(), expiry_ms.to_le_bytes().to_vec());
                }
            }
        }
        Ok(next)
    }
}
