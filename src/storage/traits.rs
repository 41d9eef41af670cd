//! Abstract storage traits for leadsweep.
//!
//! `LeadStore` is the contract both backends implement:
//! - In-memory backend for tests and embedded use
//! - Persistent (WAL-backed) backend for the daemon

use thiserror::Error;

use crate::lead::{Lead, LeadId, LeadPatch};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Lead not found (or trashed, for operations that skip trash).
    #[error("Lead not found: {0}")]
    NotFound(LeadId),

    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// A lead with the same email and phone number already exists.
    #[error("Lead with email '{email}' and phone '{phone_number}' already exists: {existing}")]
    DuplicateContact {
        email: String,
        phone_number: String,
        existing: LeadId,
    },

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Storage trait for lead documents.
///
/// # Ordering
/// `fetch_all` returns records in the store's natural order. Both backends
/// in this crate use insertion order; other backends may not, which is why
/// the sweeper can sort before scanning.
pub trait LeadStore: Send + Sync {
    /// Insert a new lead. Returns `DuplicateKey` if the id already exists.
    fn insert(&self, lead: Lead) -> Result<(), StorageError>;

    /// Get a lead by id, trashed or not.
    fn get(&self, id: LeadId) -> Result<Option<Lead>, StorageError>;

    /// Apply a partial update to a live (non-trashed) lead.
    ///
    /// # Errors
    /// `NotFound` if the lead is missing or in the trash.
    fn update(&self, id: LeadId, patch: LeadPatch) -> Result<Lead, StorageError>;

    /// Move a live lead to the trash.
    ///
    /// # Errors
    /// `NotFound` if the lead is missing or already trashed.
    fn trash(&self, id: LeadId, deleted_by: Option<&str>) -> Result<Lead, StorageError>;

    /// Permanently delete one lead.
    ///
    /// # Errors
    /// `NotFound` if the lead does not exist.
    fn delete(&self, id: LeadId) -> Result<(), StorageError>;

    /// Find leads whose email and phone number both match exactly.
    fn find_by_contact(&self, email: &str, phone_number: &str) -> Result<Vec<Lead>, StorageError>;

    /// Return every current lead in natural order.
    fn fetch_all(&self) -> Result<Vec<Lead>, StorageError>;

    /// Delete every lead in `ids` that still exists.
    ///
    /// Missing ids are skipped without error. Returns the number of
    /// records actually removed.
    fn delete_by_ids(&self, ids: &[LeadId]) -> Result<usize, StorageError>;

    /// Number of stored leads, trashed included.
    fn count(&self) -> Result<usize, StorageError> {
        Ok(self.fetch_all()?.len())
    }
}

/// Newest first, ties broken by id for a stable listing.
pub(crate) fn sort_newest_first(leads: &mut [Lead]) {
    leads.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}

/// Convenience reads shared by every `LeadStore`.
pub trait LeadStoreExt: LeadStore {
    /// All leads, newest `created_at` first.
    fn list_recent(&self) -> Result<Vec<Lead>, StorageError> {
        let mut leads = self.fetch_all()?;
        sort_newest_first(&mut leads);
        Ok(leads)
    }

    /// Live leads in the shared pool (`unassigned` or `Not Interested`),
    /// newest first.
    fn list_unassigned(&self) -> Result<Vec<Lead>, StorageError> {
        let mut leads: Vec<Lead> = self
            .fetch_all()?
            .into_iter()
            .filter(|l| !l.is_deleted && l.is_unassigned())
            .collect();
        sort_newest_first(&mut leads);
        Ok(leads)
    }

    /// Get a lead only if it is not in the trash.
    fn get_live(&self, id: LeadId) -> Result<Option<Lead>, StorageError> {
        Ok(self.get(id)?.filter(|l| !l.is_deleted))
    }
}

impl<S: LeadStore + ?Sized> LeadStoreExt for S {}
