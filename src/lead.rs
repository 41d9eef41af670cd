//! Lead records and identity.
//!
//! A lead is one inbound contact submission. Leads are created by the
//! ingestion path, edited or trashed by administrators, and deleted either
//! one at a time or in bulk by the duplicate sweeper.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Assignment value for leads nobody has picked up yet.
pub const UNASSIGNED: &str = "unassigned";

/// Assignment value for leads that were contacted and declined.
pub const NOT_INTERESTED: &str = "Not Interested";

/// Recorded as `deleted_by` when a trash request does not say who sent it.
pub const UNKNOWN_ACTOR: &str = "Unknown";

/// Stable, store-assigned lead identifier.
///
/// Once created, a `LeadId` never changes. It is the handle the sweeper
/// uses for deletion.
///
/// # Examples
///
/// ```
/// use leadsweep::LeadId;
///
/// let id = LeadId::new();
/// assert!(!id.is_nil());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(Uuid);

impl LeadId {
    /// Creates a new random lead ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a lead ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns true if this is a nil (all zeros) UUID.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Creates a nil lead ID (for testing or sentinel values).
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for LeadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for LeadId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<LeadId> for Uuid {
    fn from(id: LeadId) -> Self {
        id.0
    }
}

/// One stored lead document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    /// Store-assigned id; the deletion handle.
    pub id: LeadId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    /// Identity key component.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Identity key component.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Person working the lead, or `unassigned` / `Not Interested`.
    #[serde(default = "default_assigned_to")]
    pub assigned_to: String,
    /// Soft-delete (trash) flag.
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_assigned_to() -> String {
    UNASSIGNED.to_string()
}

impl Lead {
    /// Creates an unassigned lead with a fresh id, stamped now.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: LeadId::new(),
            name: name.into(),
            company_name: None,
            email: None,
            phone_number: None,
            location: None,
            service: None,
            message: None,
            assigned_to: default_assigned_to(),
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the contact email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the contact phone number.
    #[must_use]
    pub fn with_phone_number(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = Some(phone.into());
        self
    }

    /// Overrides both timestamps. Used when importing existing documents.
    #[must_use]
    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self.updated_at = at;
        self
    }

    /// Sets who the lead is assigned to.
    #[must_use]
    pub fn with_assigned_to(mut self, assignee: impl Into<String>) -> Self {
        self.assigned_to = assignee.into();
        self
    }

    /// Returns true if the lead sits in the shared pool rather than with a
    /// specific person.
    #[must_use]
    pub fn is_unassigned(&self) -> bool {
        self.assigned_to == UNASSIGNED || self.assigned_to == NOT_INTERESTED
    }

    /// Marks the lead as trashed.
    pub fn trash(&mut self, deleted_by: Option<&str>, at: DateTime<Utc>) {
        self.is_deleted = true;
        self.deleted_at = Some(at);
        self.deleted_by = Some(deleted_by.unwrap_or(UNKNOWN_ACTOR).to_string());
        self.updated_at = at;
    }
}

/// Submission payload for a new lead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLead {
    pub name: Option<String>,
    pub company_name: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub location: Option<String>,
    pub service: Option<String>,
    pub message: Option<String>,
}

fn required(value: Option<String>, field: &str) -> Result<String, ValidationError> {
    let Some(value) = value else {
        return Err(ValidationError::MissingField {
            field: field.to_string(),
        });
    };
    if value.trim().is_empty() {
        return Err(ValidationError::BlankField {
            field: field.to_string(),
        });
    }
    Ok(value)
}

impl NewLead {
    /// Validates the submission and turns it into a stored record.
    ///
    /// # Errors
    /// `MissingField` or `BlankField` if `name`, `phoneNumber` or `email`
    /// is absent or whitespace.
    pub fn into_lead(self, now: DateTime<Utc>) -> Result<Lead, ValidationError> {
        let name = required(self.name, "name")?;
        let phone_number = required(self.phone_number, "phoneNumber")?;
        let email = required(self.email, "email")?;

        Ok(Lead {
            id: LeadId::new(),
            name,
            company_name: self.company_name,
            email: Some(email),
            phone_number: Some(phone_number),
            location: self.location,
            service: self.service,
            message: self.message,
            assigned_to: default_assigned_to(),
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadPatch {
    pub name: Option<String>,
    pub company_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub location: Option<String>,
    pub service: Option<String>,
    pub message: Option<String>,
    pub assigned_to: Option<String>,
}

impl LeadPatch {
    /// Returns true if applying this patch would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the patch and bumps `updated_at`.
    pub fn apply(self, lead: &mut Lead, at: DateTime<Utc>) {
        if let Some(v) = self.name {
            lead.name = v;
        }
        if let Some(v) = self.company_name {
            lead.company_name = Some(v);
        }
        if let Some(v) = self.email {
            lead.email = Some(v);
        }
        if let Some(v) = self.phone_number {
            lead.phone_number = Some(v);
        }
        if let Some(v) = self.location {
            lead.location = Some(v);
        }
        if let Some(v) = self.service {
            lead.service = Some(v);
        }
        if let Some(v) = self.message {
            lead.message = Some(v);
        }
        if let Some(v) = self.assigned_to {
            lead.assigned_to = v;
        }
        lead.updated_at = at;
    }
}
