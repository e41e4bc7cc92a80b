// Thin re-export module: block/header types, the block builder state
// machine, and the commit/checkpoint coordinator live in submodules.

pub mod block;
pub mod builder;
pub mod commit;

pub use block::*;
pub use builder::*;
pub use commit::*;
