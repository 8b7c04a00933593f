//! In-memory adapter for the `Refcore` reference allocation library
//!
//! This crate provides in-memory implementations of the collaborator traits
//! from the refcore crate, useful for testing and development scenarios
//! where persistence is not required.
//!
//! The request store enforces reference uniqueness at insert time, exactly
//! like the backing-store constraint a production adapter carries, so the
//! allocator's lost-race handling can be exercised without a database.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use refcore::errors::{DirectoryError, DirectoryResult, StoreError, StoreResult};
use refcore::organization::{Organization, OrganizationProfile};
use refcore::request::Request;
use refcore::store::{OrganizationDirectory, OrganizationStore, RequestStore};
use refcore::types::{OrganizationRef, Reference, ReferenceId, RequestId, Year};

/// Thread-safe in-memory request store for testing.
///
/// Keeps a secondary index from reference to request id; inserting a
/// request whose reference is already indexed fails with
/// [`StoreError::DuplicateReference`], mirroring a relational store's
/// unique constraint.
#[derive(Clone, Default)]
pub struct InMemoryRequestStore {
    // Maps request ids to their stored requests
    requests: Arc<RwLock<HashMap<RequestId, Request>>>,
    // Maps assigned references to the owning request id
    by_reference: Arc<RwLock<HashMap<Reference, RequestId>>>,
}

impl InMemoryRequestStore {
    /// Create a new empty in-memory request store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored requests
    pub fn len(&self) -> usize {
        self.requests.read().expect("RwLock poisoned").len()
    }

    /// Whether the store holds no requests
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes a request, freeing its reference index entry.
    ///
    /// Returns the removed request, if it existed. Removal does not recycle
    /// sequence numbers: the max-lookup reflects the remaining rows.
    pub fn remove(&self, id: &RequestId) -> Option<Request> {
        let mut requests = self.requests.write().expect("RwLock poisoned");
        let mut by_reference = self.by_reference.write().expect("RwLock poisoned");

        let removed = requests.remove(id)?;
        if let Some(reference) = removed.reference() {
            let _ = by_reference.remove(reference);
        }
        Some(removed)
    }

    /// Looks up a request by id.
    pub fn get(&self, id: &RequestId) -> Option<Request> {
        self.requests.read().expect("RwLock poisoned").get(id).cloned()
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn max_reference_id(
        &self,
        organization: &OrganizationRef,
        year: Year,
    ) -> StoreResult<Option<ReferenceId>> {
        let requests = self.requests.read().expect("RwLock poisoned");

        Ok(requests
            .values()
            .filter(|request| {
                request.organization() == organization
                    && Year::of(request.date_created()) == year
            })
            .filter_map(Request::reference_id)
            .max())
    }

    async fn find_by_reference(&self, reference: &Reference) -> StoreResult<Option<Request>> {
        // lock order: requests before by_reference, same as insert/remove
        let requests = self.requests.read().expect("RwLock poisoned");
        let by_reference = self.by_reference.read().expect("RwLock poisoned");

        Ok(by_reference
            .get(reference)
            .and_then(|id| requests.get(id))
            .cloned())
    }

    async fn insert(&self, request: Request) -> StoreResult<Request> {
        let mut requests = self.requests.write().expect("RwLock poisoned");
        let mut by_reference = self.by_reference.write().expect("RwLock poisoned");

        if requests.contains_key(request.id()) {
            return Err(StoreError::Internal(format!(
                "request '{}' already exists",
                request.id()
            )));
        }

        if let Some(reference) = request.reference() {
            match by_reference.entry(reference.clone()) {
                Entry::Occupied(_) => {
                    return Err(StoreError::DuplicateReference(reference.clone()));
                }
                Entry::Vacant(entry) => {
                    let _ = entry.insert(*request.id());
                }
            }
        }

        let _ = requests.insert(*request.id(), request.clone());
        Ok(request)
    }
}

/// Thread-safe in-memory organization store for testing.
#[derive(Clone, Default)]
pub struct InMemoryOrganizationStore {
    organizations: Arc<RwLock<HashMap<OrganizationRef, Organization>>>,
}

impl InMemoryOrganizationStore {
    /// Create a new empty in-memory organization store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored organizations
    pub fn len(&self) -> usize {
        self.organizations.read().expect("RwLock poisoned").len()
    }

    /// Whether the store holds no organizations
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OrganizationStore for InMemoryOrganizationStore {
    async fn find(&self, id: &OrganizationRef) -> StoreResult<Option<Organization>> {
        let organizations = self.organizations.read().expect("RwLock poisoned");
        Ok(organizations.get(id).cloned())
    }

    async fn find_or_create(
        &self,
        id: &OrganizationRef,
        profile: OrganizationProfile,
    ) -> StoreResult<Organization> {
        let mut organizations = self.organizations.write().expect("RwLock poisoned");
        let organization = organizations
            .entry(id.clone())
            .or_insert_with(|| Organization::new(id.clone(), profile));
        Ok(organization.clone())
    }
}

/// In-memory organization directory backed by fixture profiles.
///
/// Unknown identifiers resolve to [`DirectoryError::NotFound`]; flipping
/// [`InMemoryOrganizationDirectory::set_unavailable`] makes every resolve
/// fail, for exercising upstream-outage handling.
#[derive(Clone, Default)]
pub struct InMemoryOrganizationDirectory {
    profiles: Arc<RwLock<HashMap<OrganizationRef, OrganizationProfile>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryOrganizationDirectory {
    /// Create a new directory with no known organizations
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a profile under an identifier, builder style.
    #[must_use]
    pub fn with_profile(self, id: OrganizationRef, profile: OrganizationProfile) -> Self {
        self.insert_profile(id, profile);
        self
    }

    /// Registers a profile under an identifier.
    pub fn insert_profile(&self, id: OrganizationRef, profile: OrganizationProfile) {
        let mut profiles = self.profiles.write().expect("RwLock poisoned");
        let _ = profiles.insert(id, profile);
    }

    /// Makes every subsequent resolve fail as unavailable (or restores
    /// normal operation).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl OrganizationDirectory for InMemoryOrganizationDirectory {
    async fn resolve(&self, id: &OrganizationRef) -> DirectoryResult<OrganizationProfile> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable(
                "directory marked unavailable".to_string(),
            ));
        }

        let profiles = self.profiles.read().expect("RwLock poisoned");
        profiles
            .get(id)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(id.clone()))
    }
}

/// Request store decorator that injects failures into the next N calls.
///
/// Deterministic counterpart of a chaos wrapper: `fail_next` arms a counter
/// and every store operation consumes one unit, failing with
/// [`StoreError::Unavailable`] until the counter runs out. Wrap an
/// [`InMemoryRequestStore`] with it to test that allocation aborts cleanly
/// when the store errors mid-procedure.
#[derive(Clone)]
pub struct FlakyRequestStore<S> {
    inner: S,
    failures_remaining: Arc<AtomicU32>,
}

impl<S> FlakyRequestStore<S> {
    /// Wraps a store with failure injection disarmed.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failures_remaining: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Arms the wrapper to fail the next `count` store operations.
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    fn take_failure(&self) -> StoreResult<()> {
        let armed = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl<S> RequestStore for FlakyRequestStore<S>
where
    S: RequestStore,
{
    async fn max_reference_id(
        &self,
        organization: &OrganizationRef,
        year: Year,
    ) -> StoreResult<Option<ReferenceId>> {
        self.take_failure()?;
        self.inner.max_reference_id(organization, year).await
    }

    async fn find_by_reference(&self, reference: &Reference) -> StoreResult<Option<Request>> {
        self.take_failure()?;
        self.inner.find_by_reference(reference).await
    }

    async fn insert(&self, request: Request) -> StoreResult<Request> {
        self.take_failure()?;
        self.inner.insert(request).await
    }
}
