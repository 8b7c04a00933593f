//! Error types for Refcore.
//!
//! This module provides error types for all failure scenarios in the
//! reference allocation pipeline. The error design follows these principles:
//!
//! - **Rich error information**: Include context to help diagnose issues
//! - **Type safety**: Different error types for different collaborators
//! - **Actionable**: Users can determine how to handle each error
//! - **Composable**: Errors can be converted between layers
//!
//! # Error Categories
//!
//! - **AllocationError**: Failures of the reference allocation procedure
//! - **StoreError**: Request store lookup and persistence failures
//! - **DirectoryError**: Organization directory resolution failures
//!
//! Propagation policy: nothing is swallowed or locally recovered inside the
//! allocator. Every failure aborts the enclosing creation, so a request is
//! never persisted with a missing or duplicate reference.

use crate::types::{OrganizationRef, Reference, Year};
use thiserror::Error;

/// Errors that can occur while allocating a reference for a request.
///
/// # Error Handling Strategy
///
/// - **InvalidOrganizationReference**: client-side validation failure; fix
///   the creation payload and resubmit
/// - **Directory** / **Store**: transient upstream failure; the creation
///   aborted with no partial state, retry later
/// - **ConflictExhausted**: heavy write contention on one scope; retry the
///   whole creation
#[derive(Debug, Error)]
pub enum AllocationError {
    /// The creation payload's organization field is missing, malformed or
    /// unknown to the organization directory.
    #[error("invalid organization reference: {0}")]
    InvalidOrganizationReference(String),

    /// The organization directory failed while resolving an organization.
    #[error("organization directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// The request store failed during a lookup or the final insert.
    #[error("request store error: {0}")]
    Store(#[from] StoreError),

    /// The collision-retry loop exceeded its bounded attempt budget.
    #[error(
        "no free reference for organization '{organization}' in {year} after {attempts} attempts"
    )]
    ConflictExhausted {
        /// The organization whose scope was contended
        organization: OrganizationRef,
        /// The calendar year of the contended scope
        year: Year,
        /// How many candidate references were tried
        attempts: u32,
    },
}

impl AllocationError {
    /// Whether retrying the whole creation may succeed without any change
    /// to the payload.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::InvalidOrganizationReference(_) | Self::Directory(DirectoryError::NotFound(_)) => {
                false
            }
            Self::Directory(_) | Self::Store(_) | Self::ConflictExhausted { .. } => true,
        }
    }
}

/// Errors that can occur when interacting with the request store.
///
/// `StoreError` represents failures at the persistence layer. The
/// `DuplicateReference` variant is how a store's uniqueness constraint on
/// `reference` surfaces a lost race at commit time; the allocator reacts by
/// recomputing from a fresh maximum.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store rejected an insert because the reference is already taken.
    #[error("reference '{0}' already exists")]
    DuplicateReference(Reference),

    /// The connection to the store failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Stored data could not be converted to or from its domain shape.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A store operation took too long.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The store is temporarily unavailable.
    #[error("request store unavailable: {0}")]
    Unavailable(String),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors that can occur when resolving an organization through the
/// organization directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// No organization exists under the given identifier.
    #[error("organization '{0}' not found")]
    NotFound(OrganizationRef),

    /// The directory is unreachable or erroring.
    #[error("organization directory unavailable: {0}")]
    Unavailable(String),

    /// The directory returned a record the library cannot interpret.
    #[error("malformed directory record: {0}")]
    Malformed(String),
}

/// Result type alias for allocation operations.
pub type AllocationResult<T> = Result<T, AllocationError>;

/// Result type alias for request store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for organization directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn org() -> OrganizationRef {
        OrganizationRef::try_new("https://example.org/organizations/1").unwrap()
    }

    #[test]
    fn conflict_exhausted_message_names_the_scope() {
        let error = AllocationError::ConflictExhausted {
            organization: org(),
            year: Year::try_new(2024).unwrap(),
            attempts: 32,
        };
        let message = error.to_string();
        assert!(message.contains("2024"));
        assert!(message.contains("32"));
    }

    #[test]
    fn validation_failures_are_not_transient() {
        assert!(!AllocationError::InvalidOrganizationReference("missing".into()).is_transient());
        assert!(!AllocationError::Directory(DirectoryError::NotFound(org())).is_transient());
    }

    #[test]
    fn upstream_failures_are_transient() {
        assert!(
            AllocationError::Directory(DirectoryError::Unavailable("503".into())).is_transient()
        );
        assert!(AllocationError::Store(StoreError::Unavailable("down".into())).is_transient());
        assert!(AllocationError::ConflictExhausted {
            organization: org(),
            year: Year::try_new(2024).unwrap(),
            attempts: 3,
        }
        .is_transient());
    }
}
