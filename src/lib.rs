//! Anchorchain - state-commitment core for a small sidechain node
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Commitment Core
//! - [`merkle`] - Deterministic Merkle roots and inclusion proofs
//! - [`chain`] - Block types, block builder, commit/checkpoint coordinator
//! - [`transaction`] - Transaction carrier and effect log
//!
//! ## State Management
//! - [`state`] - Authenticated tries and chain snapshots
//! - [`store`] - Durable block log and snapshot blobs (SQLite)
//!
//! ## Execution
//! - [`vm`] - Opaque transaction-executor capability
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Commitment Core
// ============================================================================
pub mod chain;
pub mod merkle;
pub mod transaction;

// ============================================================================
// State Management
// ============================================================================
pub mod state;
pub mod store;

// ============================================================================
// Execution
// ============================================================================
pub mod vm;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
