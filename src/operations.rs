//! Lead operations used by the ingestion and admin paths.
//!
//! These sit on top of any [`LeadStore`]: submission validates the payload
//! and refuses an exact email + phone repeat, the rest are the admin reads
//! and edits. Access control is the caller's business.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::error::LeadsweepResult;
use crate::lead::{Lead, LeadId, LeadPatch, NewLead};
use crate::storage::{LeadStore, LeadStoreExt, StorageError};

/// Lead operations over a shared store.
#[derive(Clone)]
pub struct LeadService {
    store: Arc<dyn LeadStore>,
}

impl LeadService {
    /// Creates the service.
    pub fn new(store: Arc<dyn LeadStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn LeadStore> {
        &self.store
    }

    /// Stores a new submission.
    ///
    /// # Errors
    /// - `Validation` if `name`, `phoneNumber` or `email` is missing or blank
    /// - `Storage(DuplicateContact)` if a lead with the same email and phone
    ///   already exists
    pub fn submit(&self, submission: NewLead) -> LeadsweepResult<Lead> {
        let lead = submission.into_lead(Utc::now())?;
        let email = lead.email.clone().unwrap_or_default();
        let phone_number = lead.phone_number.clone().unwrap_or_default();

        if let Some(existing) = self.store.find_by_contact(&email, &phone_number)?.first() {
            debug!(existing = %existing.id, "rejected repeat submission");
            return Err(StorageError::DuplicateContact {
                email,
                phone_number,
                existing: existing.id,
            }
            .into());
        }

        self.store.insert(lead.clone())?;
        info!(lead = %lead.id, "lead submitted");
        Ok(lead)
    }

    /// A live lead by id.
    ///
    /// # Errors
    /// `Storage(NotFound)` if the lead is missing or trashed.
    pub fn get(&self, id: LeadId) -> LeadsweepResult<Lead> {
        Ok(self.store.get_live(id)?.ok_or(StorageError::NotFound(id))?)
    }

    /// Every lead, newest first.
    ///
    /// # Errors
    /// Storage failures.
    pub fn list_recent(&self) -> LeadsweepResult<Vec<Lead>> {
        Ok(self.store.list_recent()?)
    }

    /// Live leads in the shared pool, newest first.
    ///
    /// # Errors
    /// Storage failures.
    pub fn list_unassigned(&self) -> LeadsweepResult<Vec<Lead>> {
        Ok(self.store.list_unassigned()?)
    }

    /// Applies a partial update. An empty patch returns the lead unchanged
    /// without touching the store.
    ///
    /// # Errors
    /// `Storage(NotFound)` if the lead is missing or trashed.
    pub fn edit(&self, id: LeadId, patch: LeadPatch) -> LeadsweepResult<Lead> {
        if patch.is_empty() {
            return self.get(id);
        }
        let updated = self.store.update(id, patch)?;
        info!(lead = %id, "lead updated");
        Ok(updated)
    }

    /// Moves a lead to the trash.
    ///
    /// # Errors
    /// `Storage(NotFound)` if the lead is missing or already trashed.
    pub fn trash(&self, id: LeadId, deleted_by: Option<&str>) -> LeadsweepResult<Lead> {
        let trashed = self.store.trash(id, deleted_by)?;
        info!(lead = %id, deleted_by = trashed.deleted_by.as_deref().unwrap_or_default(), "lead moved to trash");
        Ok(trashed)
    }

    /// Deletes a lead permanently, trashed or not.
    ///
    /// # Errors
    /// `Storage(NotFound)` if the lead does not exist.
    pub fn delete_permanently(&self, id: LeadId) -> LeadsweepResult<()> {
        self.store.delete(id)?;
        info!(lead = %id, "lead permanently deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LeadsweepError, ValidationError};
    use crate::storage::InMemoryLeadStore;

    fn service() -> LeadService {
        LeadService::new(Arc::new(InMemoryLeadStore::new()))
    }

    fn submission(email: &str, phone: &str) -> NewLead {
        NewLead {
            name: Some("Asha".to_string()),
            email: Some(email.to_string()),
            phone_number: Some(phone.to_string()),
            ..NewLead::default()
        }
    }

    #[test]
    fn test_submit_then_get() {
        let svc = service();
        let lead = svc.submit(submission("a@x.com", "111")).unwrap();
        assert_eq!(svc.get(lead.id).unwrap(), lead);
    }

    #[test]
    fn test_submit_rejects_repeat_contact() {
        let svc = service();
        let first = svc.submit(submission("a@x.com", "111")).unwrap();

        let err = svc.submit(submission("a@x.com", "111")).unwrap_err();
        let LeadsweepError::Storage(StorageError::DuplicateContact { existing, .. }) = err else {
            panic!("expected DuplicateContact, got {err:?}");
        };
        assert_eq!(existing, first.id);

        // Same email with another phone is a different lead.
        svc.submit(submission("a@x.com", "222")).unwrap();
        assert_eq!(svc.list_recent().unwrap().len(), 2);
    }

    #[test]
    fn test_submit_validates_before_storing() {
        let svc = service();
        let err = svc
            .submit(NewLead {
                name: Some("Asha".to_string()),
                ..NewLead::default()
            })
            .unwrap_err();
        assert!(matches!(err, LeadsweepError::Validation(ValidationError::MissingField { .. })));
        assert!(svc.list_recent().unwrap().is_empty());
    }

    #[test]
    fn test_trashed_lead_is_hidden_but_deletable() {
        let svc = service();
        let lead = svc.submit(submission("a@x.com", "111")).unwrap();

        let trashed = svc.trash(lead.id, None).unwrap();
        assert_eq!(trashed.deleted_by.as_deref(), Some("Unknown"));
        assert!(matches!(
            svc.get(lead.id),
            Err(LeadsweepError::Storage(StorageError::NotFound(_)))
        ));
        assert!(svc.list_unassigned().unwrap().is_empty());

        svc.delete_permanently(lead.id).unwrap();
        assert!(svc.delete_permanently(lead.id).is_err());
    }

    #[test]
    fn test_edit_reassigns() {
        let svc = service();
        let lead = svc.submit(submission("a@x.com", "111")).unwrap();
        assert_eq!(svc.list_unassigned().unwrap().len(), 1);

        svc.edit(
            lead.id,
            LeadPatch {
                assigned_to: Some("ravi".to_string()),
                ..LeadPatch::default()
            },
        )
        .unwrap();
        assert!(svc.list_unassigned().unwrap().is_empty());
    }

    #[test]
    fn test_empty_edit_changes_nothing() {
        let svc = service();
        let lead = svc.submit(submission("a@x.com", "111")).unwrap();

        let unchanged = svc.edit(lead.id, LeadPatch::default()).unwrap();
        assert_eq!(unchanged, lead);
        assert_eq!(svc.get(lead.id).unwrap().updated_at, lead.updated_at);

        assert!(matches!(
            svc.edit(LeadId::new(), LeadPatch::default()),
            Err(LeadsweepError::Storage(StorageError::NotFound(_)))
        ));
        svc.trash(lead.id, None).unwrap();
        assert!(svc.edit(lead.id, LeadPatch::default()).is_err());
    }
}
