use crate::store::StoreError;
use std::fmt;
use thiserror::Error;

/// Entity families addressed by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Product,
    Quest,
    Submission,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::User => "user",
            Self::Product => "product",
            Self::Quest => "quest",
            Self::Submission => "submission",
        };
        f.write_str(label)
    }
}

/// Economy core errors.
///
/// Precondition failures (no stock, not enough gold, quest full) are not
/// errors: they come back as typed outcomes so callers can branch on them.
#[derive(Debug, Error)]
pub enum EconomyError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("Snapshot integrity check failed: {0}")]
    Integrity(String),
}

impl EconomyError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_names_kind_and_id() {
        let err = EconomyError::not_found(EntityKind::Submission, "sub-9");
        assert_eq!(err.to_string(), "submission 'sub-9' not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn store_errors_convert() {
        let err: EconomyError = StoreError::Unavailable("disk offline".into()).into();
        assert!(err.to_string().contains("disk offline"));
        assert!(!err.is_not_found());
    }
}
