//! Identity keys for duplicate detection.
//!
//! Two leads are duplicates of each other when their email and phone number
//! produce the same identity key. The key is only ever built in memory
//! during a sweep; it is never stored.

use std::fmt;

use crate::lead::Lead;

/// Rendering of the key shared by every lead with no email and no phone.
pub const BLANK_KEY: &str = "-";

/// Grouping key derived from a lead's contact fields.
///
/// The key is the `(email, phone)` pair with a missing component taken as
/// the empty string, so an empty-string component and a missing one produce
/// the same key. Leading whitespace of the email and trailing whitespace of
/// the phone are ignored. The components are compared separately, so no
/// value inside one field can make two different pairs collide.
///
/// The key displays as `"{email}-{phone}"`.
///
/// # Examples
///
/// ```
/// use leadsweep::IdentityKey;
///
/// let key = IdentityKey::from_parts(Some("a@x.com"), Some("111"));
/// assert_eq!(key.to_string(), "a@x.com-111");
///
/// let blank = IdentityKey::from_parts(None, Some(""));
/// assert!(blank.is_blank());
///
/// assert_ne!(
///     IdentityKey::from_parts(Some("a-b"), Some("c")),
///     IdentityKey::from_parts(Some("a"), Some("b-c")),
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    email: String,
    phone_number: String,
}

impl IdentityKey {
    /// Builds the key for `lead`.
    #[must_use]
    pub fn of(lead: &Lead) -> Self {
        Self::from_parts(lead.email.as_deref(), lead.phone_number.as_deref())
    }

    /// Builds a key from raw contact fields.
    #[must_use]
    pub fn from_parts(email: Option<&str>, phone_number: Option<&str>) -> Self {
        Self {
            email: email.unwrap_or("").trim_start().to_string(),
            phone_number: phone_number.unwrap_or("").trim_end().to_string(),
        }
    }

    /// The email component.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// The phone component.
    #[must_use]
    pub fn phone_number(&self) -> &str {
        &self.phone_number
    }

    /// Returns true for the key of a lead with neither email nor phone.
    ///
    /// All such leads collapse onto one key and are treated as duplicates.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.email.is_empty() && self.phone_number.is_empty()
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.email, self.phone_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_joins_email_and_phone() {
        let lead = Lead::new("a").with_email("a@x.com").with_phone_number("111");
        let key = IdentityKey::of(&lead);
        assert_eq!(key.email(), "a@x.com");
        assert_eq!(key.phone_number(), "111");
        assert_eq!(key.to_string(), "a@x.com-111");
    }

    #[test]
    fn test_missing_fields_become_empty() {
        assert_eq!(IdentityKey::from_parts(Some("a@x.com"), None).to_string(), "a@x.com-");
        assert_eq!(IdentityKey::from_parts(None, Some("111")).to_string(), "-111");

        let blank = IdentityKey::of(&Lead::new("nobody"));
        assert!(blank.is_blank());
        assert_eq!(blank.to_string(), BLANK_KEY);
    }

    #[test]
    fn test_empty_string_matches_missing() {
        assert_eq!(
            IdentityKey::from_parts(Some(""), Some("111")),
            IdentityKey::from_parts(None, Some("111"))
        );
        assert!(IdentityKey::from_parts(Some(""), Some("")).is_blank());
        assert!(!IdentityKey::from_parts(Some("a@x.com"), None).is_blank());
    }

    #[test]
    fn test_only_outer_whitespace_is_trimmed() {
        let padded = IdentityKey::from_parts(Some("  a@x.com"), Some("111 "));
        assert_eq!(padded, IdentityKey::from_parts(Some("a@x.com"), Some("111")));

        // Whitespace next to the separator is part of the key.
        let inner = IdentityKey::from_parts(Some("a@x.com "), Some("111"));
        assert_ne!(inner, padded);
        let inner = IdentityKey::from_parts(Some("a@x.com"), Some(" 111"));
        assert_ne!(inner, padded);
    }

    #[test]
    fn test_separator_inside_fields_does_not_collide() {
        assert_ne!(
            IdentityKey::from_parts(Some("a-b"), Some("c")),
            IdentityKey::from_parts(Some("a"), Some("b-c"))
        );
        assert_ne!(
            IdentityKey::from_parts(Some("a-"), None),
            IdentityKey::from_parts(None, Some("-a"))
        );
        assert!(!IdentityKey::from_parts(Some("-"), None).is_blank());
    }
}
