//! Optimistic-concurrency gate
//!
//! Network responses can complete out of order: a slow snapshot fetch may
//! resolve after a local edit already produced a newer version. Every
//! server-provided entity passes through [`is_newer_revision`] before it
//! replaces the live copy, so a stale response never overwrites newer state.

use serde::{Deserialize, Serialize};

/// Per-entity version counter with the identity of the writers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    /// Monotonically increasing version
    pub version: u64,
    /// Client that produced this revision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// User that last modified the entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modifier: Option<String>,
}

impl Revision {
    pub fn new(version: u64) -> Self {
        Self {
            version,
            client_id: None,
            last_modifier: None,
        }
    }

    /// Attach the client that produced this revision
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// The revision following this one, written by `client_id`
    pub fn next(&self, client_id: &str) -> Self {
        Self {
            version: self.version + 1,
            client_id: Some(client_id.to_string()),
            last_modifier: self.last_modifier.clone(),
        }
    }
}

/// Whether `proposed` should replace `current`
///
/// True when there is no local copy, or the proposed version is strictly
/// greater than the current one.
pub fn is_newer_revision(current: Option<&Revision>, proposed: &Revision) -> bool {
    match current {
        None => true,
        Some(current) => proposed.version > current.version,
    }
}

/// Revision check with the authoritative-data bypass
///
/// `override_revision_check` is set by callers holding the response to the
/// very request that produced the new version.
pub fn should_apply(
    current: Option<&Revision>,
    proposed: &Revision,
    override_revision_check: bool,
) -> bool {
    override_revision_check || is_newer_revision(current, proposed)
}
