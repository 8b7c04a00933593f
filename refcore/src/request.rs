//! The request entity tracked by the registration service.
//!
//! A [`Request`] captures its organization once at creation time; that value
//! is the immutable numbering scope for reference allocation. Reassigning a
//! request to a different handling organization is a store-level concern and
//! can never move the request between scopes.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::{OrganizationRef, Reference, ReferenceId, RequestId, Timestamp};

/// The lifecycle status of a request.
///
/// The main chain runs `Incomplete` → `Complete` → `Submitted` →
/// `Processed`. `Cancelled` and `Retracted` are terminal and reachable from
/// any non-terminal status; no transition leaves a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// The submitter is still filling in the request.
    Incomplete,
    /// The submitter finished the request but has not posted it yet.
    Complete,
    /// An organization has started handling the request.
    Submitted,
    /// All cases attached to the request have been handled.
    Processed,
    /// The handling organization cancelled the request.
    Cancelled,
    /// The submitter withdrew the request.
    Retracted,
}

impl RequestStatus {
    /// Whether no further transitions are allowed out of this status.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Processed | Self::Cancelled | Self::Retracted)
    }

    /// Whether a transition from this status to `next` is legal.
    pub const fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Incomplete => false,
            Self::Complete => matches!(self, Self::Incomplete),
            Self::Submitted => matches!(self, Self::Complete),
            Self::Processed => matches!(self, Self::Submitted),
            Self::Cancelled | Self::Retracted => true,
        }
    }

    /// The canonical lowercase name of this status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Incomplete => "incomplete",
            Self::Complete => "complete",
            Self::Submitted => "submitted",
            Self::Processed => "processed",
            Self::Cancelled => "cancelled",
            Self::Retracted => "retracted",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status name.
#[derive(Debug, Clone, Error)]
#[error("unknown request status '{0}'")]
pub struct ParseStatusError(String);

impl FromStr for RequestStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incomplete" => Ok(Self::Incomplete),
            "complete" => Ok(Self::Complete),
            "submitted" => Ok(Self::Submitted),
            "processed" => Ok(Self::Processed),
            "cancelled" => Ok(Self::Cancelled),
            "retracted" => Ok(Self::Retracted),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Error returned when a status change would break the lifecycle rules.
#[derive(Debug, Clone, Error)]
#[error("illegal status transition from '{from}' to '{to}'")]
pub struct StatusTransitionError {
    /// The status the request was in
    pub from: RequestStatus,
    /// The status that was requested
    pub to: RequestStatus,
}

/// A request ("verzoek") registered with the service.
///
/// The organization is captured once in the constructor and has no setter:
/// it is the immutable scope within which the reference sequence numbers
/// must stay unique. `reference` and `reference_id` start out unset and are
/// assigned in lockstep, at most once, by the allocator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    id: RequestId,
    organization: OrganizationRef,
    reference: Option<Reference>,
    reference_id: Option<ReferenceId>,
    status: RequestStatus,
    confidential: bool,
    properties: Map<String, Value>,
    date_created: Timestamp,
    date_submitted: Option<Timestamp>,
}

impl Request {
    /// Creates a new, not yet referenced request for the given organization.
    pub fn new(organization: OrganizationRef, created_at: Timestamp) -> Self {
        Self {
            id: RequestId::new(),
            organization,
            reference: None,
            reference_id: None,
            status: RequestStatus::Incomplete,
            confidential: false,
            properties: Map::new(),
            date_created: created_at,
            date_submitted: None,
        }
    }

    /// Rebuilds a request from persisted state.
    ///
    /// For store adapters rehydrating rows; the caller is responsible for
    /// passing `reference` and `reference_id` as they were persisted.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: RequestId,
        organization: OrganizationRef,
        reference: Option<Reference>,
        reference_id: Option<ReferenceId>,
        status: RequestStatus,
        confidential: bool,
        properties: Map<String, Value>,
        date_created: Timestamp,
        date_submitted: Option<Timestamp>,
    ) -> Self {
        Self {
            id,
            organization,
            reference,
            reference_id,
            status,
            confidential,
            properties,
            date_created,
            date_submitted,
        }
    }

    /// The unique identifier of this request.
    pub const fn id(&self) -> &RequestId {
        &self.id
    }

    /// The organization this request was created for.
    ///
    /// This is the creation-time value and never changes; it is the scope
    /// used for reference numbering.
    pub const fn organization(&self) -> &OrganizationRef {
        &self.organization
    }

    /// The assigned reference, if allocation has run.
    pub const fn reference(&self) -> Option<&Reference> {
        self.reference.as_ref()
    }

    /// The numeric sequence component of the reference, if assigned.
    pub const fn reference_id(&self) -> Option<ReferenceId> {
        self.reference_id
    }

    /// Whether this request already carries a reference.
    pub const fn has_reference(&self) -> bool {
        self.reference.is_some()
    }

    /// The current lifecycle status.
    pub const fn status(&self) -> RequestStatus {
        self.status
    }

    /// Whether this request is confidential.
    pub const fn is_confidential(&self) -> bool {
        self.confidential
    }

    /// The free-form properties submitted with this request.
    pub const fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// When this request was created.
    pub const fn date_created(&self) -> Timestamp {
        self.date_created
    }

    /// When this request was submitted, if it has been.
    pub const fn date_submitted(&self) -> Option<Timestamp> {
        self.date_submitted
    }

    /// Marks this request confidential.
    pub fn set_confidential(&mut self, confidential: bool) {
        self.confidential = confidential;
    }

    /// Sets a free-form property on this request.
    pub fn set_property(&mut self, key: impl Into<String>, value: Value) {
        let _ = self.properties.insert(key.into(), value);
    }

    /// Moves this request to a new lifecycle status, enforcing the
    /// transition rules.
    pub fn set_status(&mut self, next: RequestStatus) -> Result<(), StatusTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(StatusTransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Marks this request as submitted at the given moment.
    pub fn submit(&mut self, at: Timestamp) -> Result<(), StatusTransitionError> {
        self.set_status(RequestStatus::Submitted)?;
        self.date_submitted = Some(at);
        Ok(())
    }

    /// Assigns the reference and its sequence number in lockstep.
    ///
    /// A reference is assigned at most once; the allocator checks
    /// [`Request::has_reference`] before calling this, so an already
    /// assigned reference is left untouched.
    pub(crate) fn assign_reference(&mut self, reference: Reference, reference_id: ReferenceId) {
        if self.reference.is_some() {
            return;
        }
        self.reference = Some(reference);
        self.reference_id = Some(reference_id);
    }
}
