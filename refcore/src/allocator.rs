//! The reference allocator.
//!
//! On every request creation the allocator resolves the organization's
//! display code, computes the next sequence number for the
//! `(organization, year)` scope, and optimistically assigns a reference of
//! the form `{code}-{year}-{sequence}`, retrying on collision.
//!
//! The max-lookup-then-increment step is not atomic. Two safeguards keep
//! concurrent creations from persisting duplicate references:
//!
//! 1. every candidate is probed against the store before assignment, and
//!    the probe is re-run on each retry rather than trusting a stale
//!    maximum;
//! 2. the final insert relies on the store's uniqueness constraint; a lost
//!    race surfaces as a duplicate rejection and triggers a fresh
//!    recomputation.
//!
//! The retry budget is explicit and bounded, so a pathological store can
//! never make the loop spin forever.

use tracing::{debug, instrument, warn};

use crate::errors::{AllocationError, AllocationResult, DirectoryError, StoreError};
use crate::organization::Organization;
use crate::request::Request;
use crate::store::{OrganizationDirectory, OrganizationStore, RequestStore};
use crate::types::{OrganizationRef, Reference, ReferenceId, Timestamp, Year};

/// Configuration for the allocation retry behavior.
#[derive(Debug, Clone, Copy)]
pub struct AllocatorConfig {
    /// Maximum number of candidate references tried per allocation.
    ///
    /// Collision probe hits and duplicate rejections at insert both consume
    /// attempts from this budget.
    pub max_attempts: u32,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self { max_attempts: 32 }
    }
}

/// Allocates unique references for newly created requests.
///
/// The allocator is generic over its three collaborators: the request
/// store, the organization store and the organization directory. It holds
/// no mutable state of its own, so a single instance can serve concurrent
/// creation requests.
///
/// The current timestamp is an explicit parameter of every operation;
/// the allocator never reads ambient time.
///
/// # Example
///
/// ```rust,ignore
/// use refcore::{AllocatorConfig, ReferenceAllocator, Request, Timestamp};
///
/// let allocator = ReferenceAllocator::new(requests, organizations, directory)
///     .with_config(AllocatorConfig { max_attempts: 8 });
///
/// let request = Request::new(organization, Timestamp::now());
/// let stored = allocator.create(request, Timestamp::now()).await?;
/// assert!(stored.has_reference());
/// ```
#[derive(Debug, Clone)]
pub struct ReferenceAllocator<R, O, D> {
    requests: R,
    organizations: O,
    directory: D,
    config: AllocatorConfig,
}

impl<R, O, D> ReferenceAllocator<R, O, D>
where
    R: RequestStore,
    O: OrganizationStore,
    D: OrganizationDirectory,
{
    /// Creates an allocator with the default retry configuration.
    pub fn new(requests: R, organizations: O, directory: D) -> Self {
        Self {
            requests,
            organizations,
            directory,
            config: AllocatorConfig::default(),
        }
    }

    /// Sets the retry configuration for this allocator.
    #[must_use]
    pub fn with_config(mut self, config: AllocatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Assigns a reference to a pending request without persisting it.
    ///
    /// Idempotent for already referenced requests: if the request carries a
    /// reference, nothing happens and the call reports success.
    #[instrument(skip_all, fields(request_id = %request.id(), organization = %request.organization()))]
    pub async fn allocate(&self, request: &mut Request, now: Timestamp) -> AllocationResult<()> {
        if request.has_reference() {
            debug!("request already referenced, allocation skipped");
            return Ok(());
        }

        let organization = self.resolve_organization(request.organization()).await?;
        let year = Year::of(now);
        let mut attempts = 0;
        let (reference, reference_id) = self
            .next_free_reference(&organization, request.organization(), year, &mut attempts)
            .await?;

        debug!(%reference, "reference assigned");
        request.assign_reference(reference, reference_id);
        Ok(())
    }

    /// Runs the full creation path: allocate a reference, then persist the
    /// request through the store.
    ///
    /// When the store's uniqueness constraint rejects the insert (a race
    /// lost against a concurrent creation), the allocation is recomputed
    /// from a fresh maximum and the insert retried, within the same bounded
    /// attempt budget. Requests that already carry a reference are
    /// persisted as-is.
    #[instrument(skip_all, fields(request_id = %request.id(), organization = %request.organization()))]
    pub async fn create(&self, request: Request, now: Timestamp) -> AllocationResult<Request> {
        if request.has_reference() {
            debug!("request already referenced, persisting as-is");
            return Ok(self.requests.insert(request).await?);
        }

        let organization = self.resolve_organization(request.organization()).await?;
        let year = Year::of(now);
        let mut attempts = 0;

        loop {
            let (reference, reference_id) = self
                .next_free_reference(&organization, request.organization(), year, &mut attempts)
                .await?;

            let mut candidate = request.clone();
            candidate.assign_reference(reference, reference_id);

            match self.requests.insert(candidate).await {
                Ok(stored) => {
                    debug!(reference = %reference_display(&stored), "request persisted");
                    return Ok(stored);
                }
                Err(StoreError::DuplicateReference(reference)) => {
                    // lost the race between probe and insert
                    warn!(%reference, "reference taken at insert, recomputing");
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    /// Resolves the organization behind a creation payload, creating the
    /// local record when the directory knows the identifier but the store
    /// does not.
    async fn resolve_organization(
        &self,
        id: &OrganizationRef,
    ) -> AllocationResult<Organization> {
        let profile = match self.directory.resolve(id).await {
            Ok(profile) => profile,
            Err(DirectoryError::NotFound(id)) => {
                return Err(AllocationError::InvalidOrganizationReference(format!(
                    "organization '{id}' is not known to the directory"
                )));
            }
            Err(error) => return Err(error.into()),
        };
        Ok(self.organizations.find_or_create(id, profile).await?)
    }

    /// Computes the next unclaimed reference for the scope.
    ///
    /// Starts one past the stored maximum for the scope and probes each
    /// candidate against the store, incrementing until a free reference is
    /// found or the attempt budget runs out. `attempts` accumulates across
    /// calls so insert-level retries in [`Self::create`] share the budget.
    async fn next_free_reference(
        &self,
        organization: &Organization,
        scope: &OrganizationRef,
        year: Year,
        attempts: &mut u32,
    ) -> AllocationResult<(Reference, ReferenceId)> {
        let max = self.requests.max_reference_id(scope, year).await?;
        let mut candidate = max.map_or_else(ReferenceId::first, ReferenceId::next);

        loop {
            if *attempts >= self.config.max_attempts {
                return Err(AllocationError::ConflictExhausted {
                    organization: scope.clone(),
                    year,
                    attempts: *attempts,
                });
            }
            *attempts += 1;

            let reference = Reference::compose(organization.display_code(), year, candidate);
            if self.requests.find_by_reference(&reference).await?.is_none() {
                return Ok((reference, candidate));
            }

            debug!(%reference, "candidate reference already taken, trying the next");
            candidate = candidate.next();
        }
    }
}

fn reference_display(request: &Request) -> &str {
    request.reference().map_or("<none>", |reference| reference.as_ref())
}
