//! In-memory storage backend.
//!
//! Thread-safe in-memory `LeadStore`. It is intended for embedded usage,
//! tests, and as a reference implementation for the persistent store.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::Utc;

use crate::lead::{Lead, LeadId, LeadPatch};
use crate::storage::traits::{LeadStore, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// Lead documents indexed by id, plus the insertion order.
///
/// Shared with the persistent backend, which rebuilds it from the WAL.
#[derive(Debug, Default, Clone)]
pub(crate) struct LeadIndex {
    by_id: HashMap<LeadId, (u64, Lead)>,
    order: BTreeMap<u64, LeadId>,
    next_seq: u64,
}

impl LeadIndex {
    pub(crate) fn contains(&self, id: LeadId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub(crate) fn get(&self, id: LeadId) -> Option<&Lead> {
        self.by_id.get(&id).map(|(_, lead)| lead)
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }

    pub(crate) fn insert(&mut self, lead: Lead) {
        if let Some((_, existing)) = self.by_id.get_mut(&lead.id) {
            *existing = lead;
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, lead.id);
        self.by_id.insert(lead.id, (seq, lead));
    }

    /// Replaces a stored lead in place, keeping its position.
    pub(crate) fn replace(&mut self, lead: Lead) -> bool {
        match self.by_id.get_mut(&lead.id) {
            Some((_, existing)) => {
                *existing = lead;
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove(&mut self, id: LeadId) -> bool {
        match self.by_id.remove(&id) {
            Some((seq, _)) => {
                self.order.remove(&seq);
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove_many(&mut self, ids: &[LeadId]) -> usize {
        ids.iter().filter(|id| self.remove(**id)).count()
    }

    pub(crate) fn iter_ordered(&self) -> impl Iterator<Item = &Lead> {
        self.order.values().filter_map(|id| self.get(*id))
    }

    pub(crate) fn ordered(&self) -> Vec<Lead> {
        self.iter_ordered().cloned().collect()
    }

    pub(crate) fn find_by_contact(&self, email: &str, phone_number: &str) -> Vec<Lead> {
        self.iter_ordered()
            .filter(|l| {
                l.email.as_deref() == Some(email) && l.phone_number.as_deref() == Some(phone_number)
            })
            .cloned()
            .collect()
    }

    /// Resolves an update against the index without mutating it.
    pub(crate) fn patched(&self, id: LeadId, patch: LeadPatch) -> Result<Lead, StorageError> {
        let Some(current) = self.get(id).filter(|l| !l.is_deleted) else {
            return Err(StorageError::NotFound(id));
        };
        let mut updated = current.clone();
        patch.apply(&mut updated, Utc::now());
        Ok(updated)
    }

    /// Resolves a trash request against the index without mutating it.
    pub(crate) fn trashed(&self, id: LeadId, deleted_by: Option<&str>) -> Result<Lead, StorageError> {
        let Some(current) = self.get(id).filter(|l| !l.is_deleted) else {
            return Err(StorageError::NotFound(id));
        };
        let mut updated = current.clone();
        updated.trash(deleted_by, Utc::now());
        Ok(updated)
    }
}

/// Thread-safe in-memory lead store.
#[derive(Debug, Default)]
pub struct InMemoryLeadStore {
    index: RwLock<LeadIndex>,
}

impl InMemoryLeadStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with `leads` in the given order.
    ///
    /// # Errors
    /// `DuplicateKey` if two of the leads share an id.
    pub fn with_leads(leads: impl IntoIterator<Item = Lead>) -> Result<Self, StorageError> {
        let store = Self::new();
        for lead in leads {
            store.insert(lead)?;
        }
        Ok(store)
    }
}

impl LeadStore for InMemoryLeadStore {
    fn insert(&self, lead: Lead) -> Result<(), StorageError> {
        let mut index = self.index.write().map_err(|_| lock_err("lead.insert"))?;
        if index.contains(lead.id) {
            return Err(StorageError::DuplicateKey(format!("lead:{}", lead.id)));
        }
        index.insert(lead);
        Ok(())
    }

    fn get(&self, id: LeadId) -> Result<Option<Lead>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("lead.get"))?;
        Ok(index.get(id).cloned())
    }

    fn update(&self, id: LeadId, patch: LeadPatch) -> Result<Lead, StorageError> {
        let mut index = self.index.write().map_err(|_| lock_err("lead.update"))?;
        let updated = index.patched(id, patch)?;
        index.replace(updated.clone());
        Ok(updated)
    }

    fn trash(&self, id: LeadId, deleted_by: Option<&str>) -> Result<Lead, StorageError> {
        let mut index = self.index.write().map_err(|_| lock_err("lead.trash"))?;
        let updated = index.trashed(id, deleted_by)?;
        index.replace(updated.clone());
        Ok(updated)
    }

    fn delete(&self, id: LeadId) -> Result<(), StorageError> {
        let mut index = self.index.write().map_err(|_| lock_err("lead.delete"))?;
        if index.remove(id) {
            Ok(())
        } else {
            Err(StorageError::NotFound(id))
        }
    }

    fn find_by_contact(&self, email: &str, phone_number: &str) -> Result<Vec<Lead>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("lead.find_by_contact"))?;
        Ok(index.find_by_contact(email, phone_number))
    }

    fn fetch_all(&self) -> Result<Vec<Lead>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("lead.fetch_all"))?;
        Ok(index.ordered())
    }

    fn delete_by_ids(&self, ids: &[LeadId]) -> Result<usize, StorageError> {
        let mut index = self.index.write().map_err(|_| lock_err("lead.delete_by_ids"))?;
        Ok(index.remove_many(ids))
    }

    fn count(&self) -> Result<usize, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("lead.count"))?;
        Ok(index.len())
    }
}
