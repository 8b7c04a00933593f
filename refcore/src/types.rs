//! Core types for the `Refcore` reference allocation library.
//!
//! This module defines the fundamental types used throughout the library.
//! All types use smart constructors to ensure validity at construction time,
//! following the "parse, don't validate" principle.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A globally unique request identifier using UUIDv7 format.
///
/// `RequestId` values are guaranteed to be UUIDv7, which provides:
/// - Time-based ordering capability
/// - Globally unique identification
/// - Monotonic sort order for requests created in sequence
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new `RequestId` with the current timestamp.
    ///
    /// This is a convenience method that generates a new `UUIDv7`.
    pub fn new() -> Self {
        // This will always succeed as Uuid::now_v7() always returns a valid v7 UUID
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// An identifier referring to an organization.
///
/// In the surrounding registration platform this is a resource URI or an
/// RSIN; the allocator treats it as an opaque key. `OrganizationRef` values
/// are guaranteed to be non-empty and at most 255 characters. Once
/// constructed, an `OrganizationRef` is always valid - no further validation
/// needed.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct OrganizationRef(String);

/// A short display code for an organization, used as the leading segment of
/// a [`Reference`].
///
/// `Shortcode` values are guaranteed to be non-empty and at most 64
/// characters, so "present but blank" shortcodes cannot be represented.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 64),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct Shortcode(String);

/// The full display name of an organization.
///
/// Used as the reference code fallback when an organization has no
/// [`Shortcode`] configured.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct OrganizationName(String);

/// The numeric sequence component of a [`Reference`].
///
/// Sequence numbers start at 1 and increase monotonically within their
/// `(organization, year)` scope. The type system ensures a sequence number
/// can never be zero.
#[nutype(
    validate(greater_or_equal = 1),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct ReferenceId(u32);

impl ReferenceId {
    /// The first sequence number handed out in an empty scope.
    pub fn first() -> Self {
        Self::try_new(1).expect("1 is always a valid sequence number")
    }

    /// Returns the next sequence number after this one.
    #[must_use]
    pub fn next(self) -> Self {
        let current: u32 = self.into();
        // Since ReferenceId is guaranteed to be >= 1, and we're adding 1,
        // the result will always be valid (barring overflow)
        Self::try_new(current + 1).expect("next sequence number should always be valid")
    }
}

/// A human-readable reference for a request, in the form
/// `{code}-{year}-{sequence}`.
///
/// References are assigned exactly once per request and are unique across
/// the whole store. Use [`Reference::compose`] to build one from its parts.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 320),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct Reference(String);

impl Reference {
    /// Composes a reference string from an organization display code, a
    /// calendar year and a sequence number.
    pub fn compose(code: &str, year: Year, sequence: ReferenceId) -> Self {
        // Display codes come from Shortcode/OrganizationName values, which are
        // non-empty and bounded, so the composed string always validates
        Self::try_new(format!("{code}-{year}-{sequence}"))
            .expect("reference composed from validated parts should always be valid")
    }
}

/// A civil calendar year, the scoping window for sequence numbers.
///
/// Years are restricted to four digits so they render unambiguously inside
/// a [`Reference`].
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 9999),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct Year(i32);

impl Year {
    /// Returns the calendar year a timestamp falls in.
    pub fn of(timestamp: Timestamp) -> Self {
        Self::try_new(timestamp.as_datetime().year())
            .expect("timestamps are within the supported calendar range")
    }

    /// Returns the half-open UTC window `[Jan 1 this year, Jan 1 next year)`
    /// covered by this year, for store-side range queries.
    pub fn window(self) -> (Timestamp, Timestamp) {
        let year: i32 = self.into();
        let start = Utc
            .with_ymd_and_hms(year, 1, 1, 0, 0, 0)
            .single()
            .expect("January 1st midnight is always a valid UTC instant");
        let end = Utc
            .with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0)
            .single()
            .expect("January 1st midnight is always a valid UTC instant");
        (Timestamp::new(start), Timestamp::new(end))
    }
}

/// A timestamp for when a request was created or submitted.
///
/// This wrapper ensures consistent timestamp handling throughout the system.
/// The allocator never reads ambient time; callers pass the current
/// `Timestamp` explicitly so year-boundary behavior stays deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a new timestamp from a UTC `DateTime`.
    pub const fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Creates a timestamp representing the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying `DateTime`.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Converts the timestamp into the underlying `DateTime`.
    pub const fn into_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(timestamp: Timestamp) -> Self {
        timestamp.into_datetime()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
