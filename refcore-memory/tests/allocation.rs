//! End-to-end allocation behavior against the in-memory collaborators.

use chrono::{TimeZone, Utc};
use refcore::{
    AllocationError, AllocatorConfig, DirectoryError, OrganizationProfile, Reference,
    ReferenceAllocator, ReferenceId, Request, RequestStore, StoreError, Timestamp, Year,
};
use refcore_memory::{
    FlakyRequestStore, InMemoryOrganizationDirectory, InMemoryOrganizationStore,
    InMemoryRequestStore,
};

type MemoryAllocator =
    ReferenceAllocator<InMemoryRequestStore, InMemoryOrganizationStore, InMemoryOrganizationDirectory>;

fn utrecht() -> refcore::OrganizationRef {
    refcore::OrganizationRef::try_new("https://example.org/organizations/utrecht").unwrap()
}

fn amsterdam() -> refcore::OrganizationRef {
    refcore::OrganizationRef::try_new("https://example.org/organizations/amsterdam").unwrap()
}

fn moment(year: i32) -> Timestamp {
    Timestamp::new(Utc.with_ymd_and_hms(year, 3, 14, 9, 30, 0).single().unwrap())
}

fn setup() -> (
    MemoryAllocator,
    InMemoryRequestStore,
    InMemoryOrganizationStore,
    InMemoryOrganizationDirectory,
) {
    let requests = InMemoryRequestStore::new();
    let organizations = InMemoryOrganizationStore::new();
    let directory = InMemoryOrganizationDirectory::new()
        .with_profile(
            utrecht(),
            OrganizationProfile::parse(Some("UT"), "Gemeente Utrecht").unwrap(),
        )
        .with_profile(
            amsterdam(),
            OrganizationProfile::parse(None, "Acme").unwrap(),
        );

    let allocator =
        ReferenceAllocator::new(requests.clone(), organizations.clone(), directory.clone());
    (allocator, requests, organizations, directory)
}

/// Builds a request that already owns `reference`, as if rehydrated from a
/// store populated in `created_year`.
fn request_owning(code: &str, reference_year: i32, sequence: u32, created_year: i32) -> Request {
    let blank = Request::new(utrecht(), moment(created_year));
    let year = Year::try_new(reference_year).unwrap();
    let sequence = ReferenceId::try_new(sequence).unwrap();
    Request::restore(
        *blank.id(),
        utrecht(),
        Some(Reference::compose(code, year, sequence)),
        Some(sequence),
        blank.status(),
        blank.is_confidential(),
        blank.properties().clone(),
        blank.date_created(),
        None,
    )
}

#[tokio::test]
async fn first_request_in_a_scope_gets_sequence_one() {
    let (allocator, requests, organizations, _) = setup();

    let stored = allocator
        .create(Request::new(utrecht(), moment(2024)), moment(2024))
        .await
        .unwrap();

    assert_eq!(stored.reference().unwrap().as_ref(), "UT-2024-1");
    assert_eq!(stored.reference_id(), Some(ReferenceId::first()));
    assert_eq!(requests.len(), 1);
    // resolving the organization created its local record
    assert_eq!(organizations.len(), 1);
}

#[tokio::test]
async fn sequence_increments_per_creation() {
    let (allocator, _, _, _) = setup();

    for expected in 1..=4u32 {
        let stored = allocator
            .create(Request::new(utrecht(), moment(2024)), moment(2024))
            .await
            .unwrap();
        assert_eq!(
            stored.reference().unwrap().to_string(),
            format!("UT-2024-{expected}")
        );
    }
}

#[tokio::test]
async fn allocation_uses_the_name_when_no_shortcode_is_set() {
    let (allocator, _, _, _) = setup();

    let stored = allocator
        .create(Request::new(amsterdam(), moment(2024)), moment(2024))
        .await
        .unwrap();

    assert_eq!(stored.reference().unwrap().as_ref(), "Acme-2024-1");
}

#[tokio::test]
async fn sequence_continues_past_removed_requests() {
    let (allocator, requests, _, _) = setup();

    let mut stored = Vec::new();
    for _ in 0..5 {
        stored.push(
            allocator
                .create(Request::new(utrecht(), moment(2024)), moment(2024))
                .await
                .unwrap(),
        );
    }

    // deleting earlier requests must not make their numbers reusable while
    // a higher number remains
    for request in &stored[..4] {
        requests.remove(request.id()).unwrap();
    }

    let next = allocator
        .create(Request::new(utrecht(), moment(2024)), moment(2024))
        .await
        .unwrap();
    assert_eq!(next.reference().unwrap().as_ref(), "UT-2024-6");
}

#[tokio::test]
async fn scopes_are_independent_per_year() {
    let (allocator, _, _, _) = setup();

    for _ in 0..2 {
        allocator
            .create(Request::new(utrecht(), moment(2024)), moment(2024))
            .await
            .unwrap();
    }

    let next_year = allocator
        .create(Request::new(utrecht(), moment(2025)), moment(2025))
        .await
        .unwrap();
    assert_eq!(next_year.reference().unwrap().as_ref(), "UT-2025-1");
}

#[tokio::test]
async fn scopes_are_independent_per_organization() {
    let (allocator, _, _, _) = setup();

    let first = allocator
        .create(Request::new(utrecht(), moment(2024)), moment(2024))
        .await
        .unwrap();
    let second = allocator
        .create(Request::new(amsterdam(), moment(2024)), moment(2024))
        .await
        .unwrap();

    assert_eq!(first.reference().unwrap().as_ref(), "UT-2024-1");
    assert_eq!(second.reference().unwrap().as_ref(), "Acme-2024-1");
}

#[tokio::test]
async fn allocate_is_idempotent_for_referenced_requests() {
    let (allocator, _, _, _) = setup();

    let mut request = Request::new(utrecht(), moment(2024));
    allocator.allocate(&mut request, moment(2024)).await.unwrap();
    let assigned = request.reference().unwrap().clone();

    allocator.allocate(&mut request, moment(2024)).await.unwrap();
    assert_eq!(request.reference(), Some(&assigned));
    assert_eq!(request.reference_id(), Some(ReferenceId::first()));
}

#[tokio::test]
async fn create_persists_an_already_referenced_request_as_is() {
    let (allocator, requests, _, _) = setup();

    let owned = request_owning("UT", 2024, 5, 2024);
    let reference = owned.reference().unwrap().clone();
    let stored = allocator.create(owned, moment(2024)).await.unwrap();

    assert_eq!(stored.reference(), Some(&reference));
    assert_eq!(requests.len(), 1);

    // and the next allocation continues after it
    let next = allocator
        .create(Request::new(utrecht(), moment(2024)), moment(2024))
        .await
        .unwrap();
    assert_eq!(next.reference().unwrap().as_ref(), "UT-2024-6");
}

#[tokio::test]
async fn unresolvable_organization_is_rejected_with_nothing_created() {
    let (allocator, requests, organizations, _) = setup();
    let unknown =
        refcore::OrganizationRef::try_new("https://example.org/organizations/nowhere").unwrap();

    let result = allocator
        .create(Request::new(unknown, moment(2024)), moment(2024))
        .await;

    assert!(matches!(
        result,
        Err(AllocationError::InvalidOrganizationReference(_))
    ));
    assert!(requests.is_empty());
    assert!(organizations.is_empty());
}

#[tokio::test]
async fn directory_outage_aborts_the_creation() {
    let (allocator, requests, _, directory) = setup();
    directory.set_unavailable(true);

    let result = allocator
        .create(Request::new(utrecht(), moment(2024)), moment(2024))
        .await;

    assert!(matches!(
        result,
        Err(AllocationError::Directory(DirectoryError::Unavailable(_)))
    ));
    assert!(requests.is_empty());
}

#[tokio::test]
async fn store_failure_during_lookup_aborts_the_creation() {
    let requests = FlakyRequestStore::new(InMemoryRequestStore::new());
    let organizations = InMemoryOrganizationStore::new();
    let directory = InMemoryOrganizationDirectory::new().with_profile(
        utrecht(),
        OrganizationProfile::parse(Some("UT"), "Gemeente Utrecht").unwrap(),
    );
    let allocator =
        ReferenceAllocator::new(requests.clone(), organizations, directory);

    requests.fail_next(1);
    let result = allocator
        .create(Request::new(utrecht(), moment(2024)), moment(2024))
        .await;

    assert!(matches!(
        result,
        Err(AllocationError::Store(StoreError::Unavailable(_)))
    ));

    // with the fault gone the same call goes through
    let stored = allocator
        .create(Request::new(utrecht(), moment(2024)), moment(2024))
        .await
        .unwrap();
    assert_eq!(stored.reference().unwrap().as_ref(), "UT-2024-1");
}

#[tokio::test]
async fn collision_probe_skips_references_the_max_lookup_cannot_see() {
    let (allocator, requests, _, _) = setup();

    // a 2023-created row owns next year's first reference, so the 2024
    // max-lookup misses it and the probe has to catch it
    requests
        .insert(request_owning("UT", 2024, 1, 2023))
        .await
        .unwrap();

    let stored = allocator
        .create(Request::new(utrecht(), moment(2024)), moment(2024))
        .await
        .unwrap();
    assert_eq!(stored.reference().unwrap().as_ref(), "UT-2024-2");
}

#[tokio::test]
async fn exhausted_retry_budget_reports_the_conflict() {
    let (allocator, requests, _, _) = setup();
    let allocator = allocator.with_config(AllocatorConfig { max_attempts: 3 });

    for sequence in 1..=3 {
        requests
            .insert(request_owning("UT", 2024, sequence, 2023))
            .await
            .unwrap();
    }

    let result = allocator
        .create(Request::new(utrecht(), moment(2024)), moment(2024))
        .await;

    match result {
        Err(AllocationError::ConflictExhausted { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected ConflictExhausted, got {other:?}"),
    }
}
