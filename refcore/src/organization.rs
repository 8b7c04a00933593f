//! Organizations and their directory records.
//!
//! An [`Organization`] is the local record a store keeps for a numbering
//! scope; an [`OrganizationProfile`] is the descriptive record the external
//! directory returns when resolving an identifier. The profile seeds the
//! local record the first time an unknown organization shows up on a
//! creation payload.

use serde::{Deserialize, Serialize};

use crate::errors::{DirectoryError, DirectoryResult};
use crate::types::{OrganizationName, OrganizationRef, Shortcode};

/// The descriptive record an organization directory holds for an
/// organization: an optional display shortcode and the full name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationProfile {
    shortcode: Option<Shortcode>,
    name: OrganizationName,
}

impl OrganizationProfile {
    /// Creates a profile from already validated parts.
    pub const fn new(shortcode: Option<Shortcode>, name: OrganizationName) -> Self {
        Self { shortcode, name }
    }

    /// Parses a profile from the raw strings a directory responds with.
    ///
    /// A missing or blank shortcode is treated as absent, matching
    /// directories that serialize unset shortcodes as empty strings. A
    /// blank name is a malformed record.
    pub fn parse(shortcode: Option<&str>, name: &str) -> DirectoryResult<Self> {
        let shortcode = match shortcode {
            Some(raw) if !raw.trim().is_empty() => Some(
                Shortcode::try_new(raw)
                    .map_err(|error| DirectoryError::Malformed(error.to_string()))?,
            ),
            _ => None,
        };
        let name = OrganizationName::try_new(name)
            .map_err(|error| DirectoryError::Malformed(error.to_string()))?;
        Ok(Self { shortcode, name })
    }

    /// The organization's display shortcode, if one is configured.
    pub const fn shortcode(&self) -> Option<&Shortcode> {
        self.shortcode.as_ref()
    }

    /// The organization's full name.
    pub const fn name(&self) -> &OrganizationName {
        &self.name
    }
}

/// An organization record kept by the organization store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    id: OrganizationRef,
    shortcode: Option<Shortcode>,
    name: OrganizationName,
}

impl Organization {
    /// Creates an organization record keyed by `id`, seeded from a
    /// directory profile.
    pub fn new(id: OrganizationRef, profile: OrganizationProfile) -> Self {
        Self {
            id,
            shortcode: profile.shortcode,
            name: profile.name,
        }
    }

    /// The stable identifier of this organization.
    pub const fn id(&self) -> &OrganizationRef {
        &self.id
    }

    /// The configured shortcode, if any.
    pub const fn shortcode(&self) -> Option<&Shortcode> {
        self.shortcode.as_ref()
    }

    /// The full name of this organization.
    pub const fn name(&self) -> &OrganizationName {
        &self.name
    }

    /// The code used in references for this organization: the shortcode
    /// when one is configured, the full name otherwise.
    pub fn display_code(&self) -> &str {
        match &self.shortcode {
            Some(code) => code.as_ref(),
            None => self.name.as_ref(),
        }
    }
}
