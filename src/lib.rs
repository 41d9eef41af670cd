//! # leadsweep - lead store and duplicate-lead sweeper
//!
//! Leads are inbound contact submissions kept in a document store. Repeat
//! submissions pile up over time, so a scheduled sweep finds leads that share
//! an email + phone identity key and permanently deletes all but one of each.
//!
//! ## Core Concepts
//!
//! - **Lead**: one stored contact submission, addressed by a [`LeadId`]
//! - **Identity key**: `"{email}-{phone}"`, the transient grouping key
//! - **Sweep**: one fetch-scan-delete pass over the whole store
//! - **Scheduler**: an owned worker that runs sweeps on a recurrence
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use leadsweep::{InMemoryLeadStore, Lead, LeadStore, Sweeper};
//!
//! let store = Arc::new(InMemoryLeadStore::new());
//! store.insert(Lead::new("Asha").with_email("a@x.com").with_phone_number("111")).unwrap();
//! store.insert(Lead::new("Asha").with_email("a@x.com").with_phone_number("111")).unwrap();
//!
//! let report = Sweeper::new(store.clone()).sweep().unwrap();
//! assert_eq!(report.deleted, 1);
//! assert_eq!(store.count().unwrap(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Records and storage
pub mod error;
pub mod identity;
pub mod lead;
pub mod operations;
pub mod storage;

// Sweeping
pub mod config;
pub mod schedule;
pub mod scheduler;
pub mod sweep;

// Re-export primary types at crate root for convenience
pub use config::SweeperConfig;
pub use error::{LeadsweepError, LeadsweepResult, SchedulerError, ValidationError};
pub use identity::IdentityKey;
pub use lead::{Lead, LeadId, LeadPatch, NewLead};
pub use operations::LeadService;
pub use schedule::Schedule;
pub use scheduler::{LastRun, SchedulerStats, SweepHandle, SweepScheduler};
pub use storage::{InMemoryLeadStore, LeadStore, LeadStoreExt, StorageError};
pub use sweep::{find_duplicates, KeepPolicy, SweepError, SweepOutcome, SweepReport, SweepStage, Sweeper};

#[cfg(feature = "persistent")]
pub use storage::{open_store, PersistentConfig, PersistentLeadStore};
