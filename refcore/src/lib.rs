//! `Refcore` - reference allocation core for request registration services
//!
//! This library implements the reference numbering protocol used when a
//! request ("verzoek") is registered: every created request receives a
//! unique human-readable reference of the form `{code}-{year}-{sequence}`,
//! scoped to the organization it was created for and the calendar year of
//! its creation.
//!
//! The crate exposes the allocator plus the collaborator seams it consumes
//! ([`store::RequestStore`], [`store::OrganizationStore`],
//! [`store::OrganizationDirectory`]); `refcore-memory` and
//! `refcore-postgres` provide implementations of the seams.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod allocator;
pub mod errors;
pub mod organization;
pub mod request;
pub mod store;
pub mod types;

pub use allocator::{AllocatorConfig, ReferenceAllocator};
pub use errors::{
    AllocationError, AllocationResult, DirectoryError, DirectoryResult, StoreError, StoreResult,
};
pub use organization::{Organization, OrganizationProfile};
pub use request::{Request, RequestStatus, StatusTransitionError};
pub use store::{OrganizationDirectory, OrganizationStore, RequestStore};
pub use types::{
    OrganizationName, OrganizationRef, Reference, ReferenceId, RequestId, Shortcode, Timestamp,
    Year,
};
