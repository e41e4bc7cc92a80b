//! Durable block log and snapshot blob store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};

use crate::chain::block::{Block, BlockHeader};
use crate::error::{ChainError, Result};
use crate::state::Snapshot;
use crate::transaction::Tx;

/// Abstraction over storage backends. `save_block` must be idempotent for
/// duplicate heights, and `finalize_height` must be safely repeatable.
pub trait Store: Send + Sync {
    fn save_block(&self, height: u64, block: &Block) -> Result<()>;
    fn get_block(&self, height: u64) -> Result<Option<Block>>;
    fn save_snapshot(&self, height: u64, snapshot: &Snapshot) -> Result<()>;
    fn finalize_height(&self, height: u64) -> Result<()>;
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| ChainError::storage("opening database", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocks (
                height INTEGER PRIMARY KEY,
                hash BLOB NOT NULL,
                header BLOB NOT NULL,
                transactions TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| ChainError::storage("creating blocks table", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS snapshots (
                height INTEGER PRIMARY KEY,
                data BLOB NOT NULL
            )",
            [],
        )
        .map_err(|e| ChainError::storage("creating snapshots table", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| ChainError::storage("creating metadata table", e))?;

        Ok(Database { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ChainError::storage("locking connection", "mutex poisoned"))
    }

    pub fn finalized_height(&self) -> Result<u64> {
        let conn = self.lock()?;
        let height: Option<i64> = conn
            .query_row("SELECT value FROM metadata WHERE key = 'finalized_height'", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| ChainError::storage("reading finalized height", e))?;
        Ok(height.unwrap_or(0) as u64)
    }
}

impl Store for Database {
    fn save_block(&self, height: u64, block: &Block) -> Result<()> {
        let transactions_json = serde_json::to_string(&block.transactions)
            .map_err(|e| ChainError::storage("serializing transactions", e))?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO blocks (height, hash, header, transactions)
             VALUES (?1, ?2, ?3, ?4)",
            params![height as i64, block.hash().to_vec(), block.header.encode(), transactions_json],
        )
        .map_err(|e| ChainError::storage("saving block", e))?;

        Ok(())
    }

    fn get_block(&self, height: u64) -> Result<Option<Block>> {
        let conn = self.lock()?;
        let row: Option<(Vec<u8>, String)> = conn
            .query_row(
                "SELECT header, transactions FROM blocks WHERE height = ?1",
                params![height as i64],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| ChainError::storage("loading block", e))?;

        let Some((header_bytes, transactions_json)) = row else {
            return Ok(None);
        };

        let header = BlockHeader::decode(&header_bytes)?;
        let transactions: Vec<Tx> = serde_json::from_str(&transactions_json)
            .map_err(|e| ChainError::storage("deserializing transactions", e))?;

        Ok(Some(Block { header, transactions }))
    }

    fn save_snapshot(&self, height: u64, snapshot: &Snapshot) -> Result<()> {
        let data = bincode::serialize(snapshot)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO snapshots (height, data) VALUES (?1, ?2)",
            params![height as i64, data],
        )
        .map_err(|e| ChainError::storage("saving snapshot", e))?;
        Ok(())
    }

    fn finalize_height(&self, height: u64) -> Result<()> {
        // Monotonic: a late notification for an older height never moves
        // the finalized marker backwards.
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO metadata (key, value) VALUES ('finalized_height', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value
             WHERE excluded.value > metadata.value",
            params![height as i64],
        )
        .map_err(|e| ChainError::storage("finalizing height", e))?;
        Ok(())
    }
}

/// Simple in-memory store useful for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    blocks: Arc<Mutex<HashMap<u64, Block>>>,
    snapshots: Arc<Mutex<HashMap<u64, Snapshot>>>,
    finalized: Arc<AtomicU64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn finalized_height(&self) -> u64 {
        self.finalized.load(Ordering::Relaxed)
    }
}

impl Store for InMemoryStore {
    fn save_block(&self, height: u64, block: &Block) -> Result<()> {
        let mut blocks = self
            .blocks
            .lock()
            .map_err(|_| ChainError::storage("saving block", "mutex poisoned"))?;
        blocks.insert(height, block.clone());
        Ok(())
    }

    fn get_block(&self, height: u64) -> Result<Option<Block>> {
        let blocks = self
            .blocks
            .lock()
            .map_err(|_| ChainError::storage("loading block", "mutex poisoned"))?;
        Ok(blocks.get(&height).cloned())
    }

    fn save_snapshot(&self, height: u64, snapshot: &Snapshot) -> Result<()> {
        let mut snapshots = self
            .snapshots
            .lock()
            .map_err(|_| ChainError::storage("saving snapshot", "mutex poisoned"))?;
        snapshots.insert(height, snapshot.clone());
        Ok(())
    }

    fn finalize_height(&self, height: u64) -> Result<()> {
        self.finalized.fetch_max(height, Ordering::Relaxed);
        Ok(())
    }
}
