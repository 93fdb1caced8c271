//! Caller session - who is acting, where, and what they may do.
//!
//! A [`Session`] is resolved once when the caller authenticates and is then passed into
//! every core operation. The core never looks at role names; it only asks the session
//! whether a [`Capability`] is present.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single permission checked by the core
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Enter new payments
    RecordPayments,
    /// Correct an existing payment
    EditPayments,
    /// Delete a payment and reverse its effect on the balance
    DeletePayments,
    /// Log and remove lessons
    LogLessons,
    /// Compute payroll
    ViewPayroll,
    /// Record hours and mark teachers paid
    ManagePayroll,
    /// Create students, teachers, classes and enrollments
    ManageRoster,
}

/// Set of capabilities held by a session
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapabilitySet(HashSet<Capability>);

impl CapabilitySet {
    /// Every capability
    #[must_use]
    pub fn all() -> Self {
        Self::from_iter([
            Capability::RecordPayments,
            Capability::EditPayments,
            Capability::DeletePayments,
            Capability::LogLessons,
            Capability::ViewPayroll,
            Capability::ManagePayroll,
            Capability::ManageRoster,
        ])
    }

    /// Whether the set contains `capability`
    #[must_use]
    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Staff roles known to the school
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Owner, can do everything
    Admin,
    /// Front desk manager
    Manager,
    /// Teacher, logs their own lessons
    Teacher,
}

impl Role {
    /// Capabilities granted to the role.
    #[must_use]
    pub fn capabilities(self) -> CapabilitySet {
        match self {
            Self::Admin => CapabilitySet::all(),
            Self::Manager => CapabilitySet::from_iter([
                Capability::RecordPayments,
                Capability::EditPayments,
                Capability::LogLessons,
                Capability::ViewPayroll,
                Capability::ManageRoster,
            ]),
            Self::Teacher => CapabilitySet::from_iter([Capability::LogLessons]),
        }
    }
}

/// The resolved identity of a caller
#[derive(Clone, Debug)]
pub struct Session {
    actor_id: String,
    location_id: Option<String>,
    capabilities: CapabilitySet,
}

impl Session {
    /// Builds a session for an actor holding `role`, optionally scoped to one location.
    #[must_use]
    pub fn new(actor_id: impl Into<String>, role: Role, location_id: Option<String>) -> Self {
        Self::with_capabilities(actor_id, role.capabilities(), location_id)
    }

    /// Builds a session with an explicit capability set.
    #[must_use]
    pub fn with_capabilities(
        actor_id: impl Into<String>,
        capabilities: CapabilitySet,
        location_id: Option<String>,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            location_id,
            capabilities,
        }
    }

    /// Opaque id stored as `recorded_by`
    #[must_use]
    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    /// Location the session is scoped to, `None` for all locations
    #[must_use]
    pub fn location_id(&self) -> Option<&str> {
        self.location_id.as_deref()
    }

    /// Fails with [`Error::PermissionDenied`] unless the session holds `capability`.
    pub fn require(&self, capability: Capability) -> Result<()> {
        if self.capabilities.contains(capability) {
            Ok(())
        } else {
            Err(Error::PermissionDenied { capability })
        }
    }
}
