// Thin re-export module: authenticated state is split into the trie
// primitive and the snapshot that composes two of them.

pub mod snapshot;
pub mod trie;

pub use snapshot::*;
pub use trie::*;
