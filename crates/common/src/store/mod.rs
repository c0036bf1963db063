//! The content object store seam
//!
//! The store holds immutable, signed, named byte blocks. It is an external
//! collaborator: replication, durability and interest/data exchange belong to
//! whatever implements [`ContentStore`]. [`MemoryContentStore`] is the
//! in-process implementation used by tests and single-process deployments.

mod memory;
mod provider;

pub use memory::MemoryContentStore;
pub use provider::{ContentStore, StoreError};
