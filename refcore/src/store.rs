//! Collaborator seams consumed by the reference allocator.
//!
//! This module defines the port interfaces the allocator talks to. The
//! traits are backend-independent: the library ships an in-memory
//! implementation for tests (`refcore-memory`) and a PostgreSQL adapter
//! (`refcore-postgres`); the organization directory is typically an HTTP
//! resource service in production deployments.
//!
//! Implementations must be `Send + Sync` so one allocator can serve
//! concurrent creation requests.

use async_trait::async_trait;

use crate::errors::{DirectoryResult, StoreResult};
use crate::organization::{Organization, OrganizationProfile};
use crate::request::Request;
use crate::types::{OrganizationRef, Reference, ReferenceId, Year};

/// Persistence port for requests.
///
/// The allocator needs three operations: the per-scope maximum sequence
/// lookup, the exact-reference collision probe, and the final insert. The
/// insert MUST enforce uniqueness of `reference` and report a violation as
/// [`StoreError::DuplicateReference`](crate::errors::StoreError::DuplicateReference),
/// so that a race lost between probe and insert is rejected at commit time
/// rather than silently producing a duplicate.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Returns the highest `reference_id` among requests created for
    /// `organization` within the calendar `year`, or `None` when the scope
    /// has no referenced requests.
    ///
    /// The result reflects the rows currently in the store, not a separate
    /// counter: removing earlier requests does not make their sequence
    /// numbers eligible for reuse unless the maximum itself drops.
    async fn max_reference_id(
        &self,
        organization: &OrganizationRef,
        year: Year,
    ) -> StoreResult<Option<ReferenceId>>;

    /// Looks up a request by its exact reference string.
    async fn find_by_reference(&self, reference: &Reference) -> StoreResult<Option<Request>>;

    /// Persists a new request, enforcing reference uniqueness.
    async fn insert(&self, request: Request) -> StoreResult<Request>;
}

/// Persistence port for organization records.
#[async_trait]
pub trait OrganizationStore: Send + Sync {
    /// Looks up an organization by its identifier.
    async fn find(&self, id: &OrganizationRef) -> StoreResult<Option<Organization>>;

    /// Returns the organization with the given identifier, creating it from
    /// the directory profile when it does not exist yet.
    ///
    /// Creation here is a visible side effect of request creation: an
    /// organization record can appear even though the caller only asked to
    /// create a request.
    async fn find_or_create(
        &self,
        id: &OrganizationRef,
        profile: OrganizationProfile,
    ) -> StoreResult<Organization>;
}

/// Resolution port for the external organization directory.
#[async_trait]
pub trait OrganizationDirectory: Send + Sync {
    /// Resolves an organization identifier to its descriptive profile.
    ///
    /// Returns [`DirectoryError::NotFound`](crate::errors::DirectoryError::NotFound)
    /// when the directory has no record under the identifier.
    async fn resolve(&self, id: &OrganizationRef) -> DirectoryResult<OrganizationProfile>;
}
