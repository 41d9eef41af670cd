//! Lead storage.
//!
//! `LeadStore` is the contract the sweeper and the lead operations run
//! against. Two backends are provided: `InMemoryLeadStore` and, behind the
//! `persistent` feature, `PersistentLeadStore`.

mod memory;
mod traits;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use memory::InMemoryLeadStore;
pub use traits::{LeadStore, LeadStoreExt, StorageError};

#[cfg(feature = "persistent")]
pub use persistent::{open_store, PersistentConfig, PersistentLeadStore};
