//! Duplicate-lead sweeper.
//!
//! One sweep fetches every lead, groups them by [`IdentityKey`], and issues
//! a single bulk delete for every lead after the first in its group. The
//! fetch and the delete are separate store calls, so a duplicate inserted in
//! between survives until the next sweep.
//!
//! A sweep never issues a partial delete list: if the fetch fails nothing is
//! deleted, and the delete list is only submitted once it is complete.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::error::ValidationError;
use crate::identity::IdentityKey;
use crate::lead::{Lead, LeadId};
use crate::storage::{LeadStore, StorageError};

/// Which lead of a duplicate group survives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeepPolicy {
    /// Keep the lead with the earliest `created_at`. Leads created at the
    /// same instant fall back to store order.
    #[default]
    Oldest,
    /// Keep whichever lead the store lists first.
    StoreOrder,
}

impl KeepPolicy {
    /// Name used in configuration and on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Oldest => "oldest",
            Self::StoreOrder => "store-order",
        }
    }
}

impl fmt::Display for KeepPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeepPolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oldest" => Ok(Self::Oldest),
            "store-order" | "store_order" => Ok(Self::StoreOrder),
            _ => Err(ValidationError::InvalidKeepPolicy { value: s.to_string() }),
        }
    }
}

/// Sweep step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepStage {
    /// Loading every lead.
    Fetch,
    /// Submitting the bulk delete.
    Delete,
}

impl fmt::Display for SweepStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch => f.write_str("fetch"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// A sweep that aborted.
#[derive(Debug, Error)]
#[error("sweep failed during {stage}: {source}")]
pub struct SweepError {
    /// Step that failed.
    pub stage: SweepStage,
    /// Underlying storage failure.
    pub source: StorageError,
}

impl SweepError {
    fn fetch(source: StorageError) -> Self {
        Self {
            stage: SweepStage::Fetch,
            source,
        }
    }

    fn delete(source: StorageError) -> Self {
        Self {
            stage: SweepStage::Delete,
            source,
        }
    }
}

/// Summary of one completed sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// When the fetch was issued.
    pub started_at: DateTime<Utc>,
    /// When the sweep finished.
    pub finished_at: DateTime<Utc>,
    /// Leads loaded by the fetch.
    pub scanned: usize,
    /// Size of the computed delete list.
    pub duplicates: usize,
    /// Leads the store reported as deleted.
    pub deleted: usize,
    /// Ids submitted for deletion, in scan order.
    pub deleted_ids: Vec<LeadId>,
}

impl SweepReport {
    /// Returns true if the sweep found nothing to delete.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.duplicates == 0
    }

    /// Duplicates the store did not delete (already gone, or a partial
    /// bulk delete). The next sweep picks up any that still exist.
    #[must_use]
    pub const fn shortfall(&self) -> usize {
        self.duplicates.saturating_sub(self.deleted)
    }
}

/// Outcome of one sweep.
pub type SweepOutcome = Result<SweepReport, SweepError>;

/// Returns the ids to delete from `leads`, keeping the first lead of every
/// identity-key group in scan order.
///
/// Under [`KeepPolicy::Oldest`] the scan order is `created_at` ascending
/// (stable, so equal timestamps keep their store order). Under
/// [`KeepPolicy::StoreOrder`] it is the order of `leads`.
#[must_use]
pub fn find_duplicates(leads: &[Lead], policy: KeepPolicy) -> Vec<LeadId> {
    let mut order: Vec<&Lead> = leads.iter().collect();
    if policy == KeepPolicy::Oldest {
        order.sort_by_key(|lead| lead.created_at);
    }

    let mut seen: HashSet<IdentityKey> = HashSet::with_capacity(order.len());
    let mut duplicates = Vec::new();
    for lead in order {
        if !seen.insert(IdentityKey::of(lead)) {
            duplicates.push(lead.id);
        }
    }
    duplicates
}

/// Runs sweeps against one lead store.
#[derive(Clone)]
pub struct Sweeper {
    store: Arc<dyn LeadStore>,
    policy: KeepPolicy,
}

impl fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sweeper").field("policy", &self.policy).finish_non_exhaustive()
    }
}

impl Sweeper {
    /// Creates a sweeper that keeps the oldest lead of each group.
    pub fn new(store: Arc<dyn LeadStore>) -> Self {
        Self::with_policy(store, KeepPolicy::default())
    }

    /// Creates a sweeper with an explicit keep policy.
    pub fn with_policy(store: Arc<dyn LeadStore>, policy: KeepPolicy) -> Self {
        Self { store, policy }
    }

    /// The keep policy in use.
    #[must_use]
    pub const fn policy(&self) -> KeepPolicy {
        self.policy
    }

    /// Runs one sweep and returns its outcome without logging it.
    ///
    /// # Errors
    /// `SweepError` with stage `Fetch` if the leads could not be loaded
    /// (nothing is deleted), or stage `Delete` if the bulk delete failed.
    pub fn sweep(&self) -> SweepOutcome {
        let started_at = Utc::now();
        let leads = self.store.fetch_all().map_err(SweepError::fetch)?;
        let duplicate_ids = find_duplicates(&leads, self.policy);
        debug!(
            scanned = leads.len(),
            duplicates = duplicate_ids.len(),
            policy = %self.policy,
            "duplicate scan finished"
        );

        let deleted = if duplicate_ids.is_empty() {
            0
        } else {
            self.store.delete_by_ids(&duplicate_ids).map_err(SweepError::delete)?
        };

        Ok(SweepReport {
            started_at,
            finished_at: Utc::now(),
            scanned: leads.len(),
            duplicates: duplicate_ids.len(),
            deleted,
            deleted_ids: duplicate_ids,
        })
    }

    /// Runs one sweep, logs the outcome, and returns it.
    ///
    /// Failures are logged and returned, never propagated as panics.
    pub fn run(&self) -> SweepOutcome {
        info!("checking for duplicate leads");
        let outcome = self.sweep();
        log_outcome(&outcome);
        outcome
    }
}

/// Writes the log line for a finished sweep.
pub fn log_outcome(outcome: &SweepOutcome) {
    match outcome {
        Ok(report) if report.is_clean() => {
            info!(scanned = report.scanned, "no duplicate leads found");
        }
        Ok(report) => {
            info!(
                scanned = report.scanned,
                deleted = report.deleted,
                "deleted {} duplicate leads",
                report.deleted
            );
            if report.shortfall() > 0 {
                warn!(
                    requested = report.duplicates,
                    deleted = report.deleted,
                    "store deleted fewer duplicates than requested"
                );
            }
        }
        Err(e) => {
            error!(stage = %e.stage, error = %e.source, "error deleting duplicate leads");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryLeadStore;
    use chrono::Duration;

    fn lead(name: &str, email: Option<&str>, phone: Option<&str>) -> Lead {
        let mut lead = Lead::new(name);
        lead.email = email.map(str::to_string);
        lead.phone_number = phone.map(str::to_string);
        lead
    }

    #[test]
    fn test_keep_policy_parse() {
        assert_eq!("oldest".parse::<KeepPolicy>().unwrap(), KeepPolicy::Oldest);
        assert_eq!(" Store-Order ".parse::<KeepPolicy>().unwrap(), KeepPolicy::StoreOrder);
        assert_eq!("store_order".parse::<KeepPolicy>().unwrap(), KeepPolicy::StoreOrder);
        assert!(matches!(
            "newest".parse::<KeepPolicy>(),
            Err(ValidationError::InvalidKeepPolicy { .. })
        ));
        assert_eq!(KeepPolicy::default(), KeepPolicy::Oldest);
    }

    #[test]
    fn test_find_duplicates_keeps_first_seen() {
        let a1 = lead("a1", Some("a@x.com"), Some("111"));
        let a2 = lead("a2", Some("a@x.com"), Some("111"));
        let b = lead("b", Some("b@x.com"), Some("222"));
        let a3 = lead("a3", Some("a@x.com"), Some("111"));

        let dups = find_duplicates(&[a1, a2.clone(), b, a3.clone()], KeepPolicy::StoreOrder);
        assert_eq!(dups, vec![a2.id, a3.id]);
    }

    #[test]
    fn test_find_duplicates_oldest_ignores_store_order() {
        let base = Utc::now();
        let newer = lead("newer", Some("a@x.com"), Some("111")).with_created_at(base + Duration::hours(1));
        let older = lead("older", Some("a@x.com"), Some("111")).with_created_at(base);
        let leads = [newer.clone(), older.clone()];

        assert_eq!(find_duplicates(&leads, KeepPolicy::Oldest), vec![newer.id]);
        assert_eq!(find_duplicates(&leads, KeepPolicy::StoreOrder), vec![older.id]);
    }

    #[test]
    fn test_find_duplicates_oldest_ties_use_store_order() {
        let at = Utc::now();
        let first = lead("first", Some("a@x.com"), None).with_created_at(at);
        let second = lead("second", Some("a@x.com"), None).with_created_at(at);

        let dups = find_duplicates(&[first, second.clone()], KeepPolicy::Oldest);
        assert_eq!(dups, vec![second.id]);
    }

    #[test]
    fn test_blank_contacts_collapse() {
        let x = lead("x", None, None);
        let y = lead("y", Some(""), None);
        let dups = find_duplicates(&[x, y.clone()], KeepPolicy::StoreOrder);
        assert_eq!(dups, vec![y.id]);
    }

    #[test]
    fn test_separator_in_contact_fields_is_not_a_duplicate() {
        let first = lead("first", Some("a-b"), Some("c"));
        let second = lead("second", Some("a"), Some("b-c"));
        let store = Arc::new(InMemoryLeadStore::with_leads([first, second]).unwrap());

        let report = Sweeper::with_policy(store.clone(), KeepPolicy::StoreOrder).sweep().unwrap();
        assert_eq!(report.deleted, 0);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_partial_matches_are_not_duplicates() {
        let leads = [
            lead("a", Some("a@x.com"), Some("111")),
            lead("b", Some("a@x.com"), Some("222")),
            lead("c", Some("c@x.com"), Some("111")),
            lead("d", Some("a@x.com"), None),
        ];
        assert!(find_duplicates(&leads, KeepPolicy::Oldest).is_empty());
    }

    #[test]
    fn test_sweep_reports_counts() {
        let keep = lead("keep", Some("a@x.com"), Some("111"));
        let drop = lead("drop", Some("a@x.com"), Some("111"));
        let drop_id = drop.id;
        let store = Arc::new(InMemoryLeadStore::with_leads([keep, drop]).unwrap());
        let sweeper = Sweeper::with_policy(store.clone(), KeepPolicy::StoreOrder);

        let report = sweeper.sweep().unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.deleted_ids, vec![drop_id]);
        assert_eq!(report.shortfall(), 0);
        assert!(report.finished_at >= report.started_at);
        assert!(store.get(drop_id).unwrap().is_none());
    }

    #[test]
    fn test_sweep_error_display_names_stage() {
        let err = SweepError::delete(StorageError::BackendError("disk full".to_string()));
        let msg = err.to_string();
        assert!(msg.contains("delete"));
        assert!(msg.contains("disk full"));
    }
}
