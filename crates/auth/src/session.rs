//! Process-wide session state.
//!
//! A single [`Session`] value exists per running application. Only the
//! [`SessionController`](crate::SessionController) writes it; everyone else
//! reads it through a `watch::Receiver<Session>`.

use serde::Serialize;

use crate::{Credentials, Identity, Profile, Role};

/// Progress of the profile load for the current identity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileStatus {
    /// Fetch scheduled or in flight.
    Loading,
    /// Fetch found nothing; one default-create attempt is in flight.
    Missing,
    /// Profile applied.
    Ready,
    /// Store failed; profile stays absent until the next identity report.
    Failed,
}

impl ProfileStatus {
    pub fn is_pending(self) -> bool {
        matches!(self, ProfileStatus::Loading | ProfileStatus::Missing)
    }
}

/// Coarse state machine view of a [`Session`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Bootstrapping,
    Anonymous,
    Authenticated(ProfileStatus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: Option<Identity>,
    pub credentials: Option<Credentials>,
    pub profile: Option<Profile>,
    /// `true` only until the bootstrap check (and its eager profile fetch) resolves.
    pub is_loading: bool,
    /// `None` whenever there is no identity.
    pub profile_status: Option<ProfileStatus>,
}

impl Session {
    /// State at application start.
    pub fn bootstrapping() -> Self {
        Self {
            identity: None,
            credentials: None,
            profile: None,
            is_loading: true,
            profile_status: None,
        }
    }

    /// The authoritative role, if any.
    ///
    /// Derived from the profile only while it belongs to the current identity;
    /// unknown stored roles yield `None`.
    pub fn role(&self) -> Option<Role> {
        let identity = self.identity.as_ref()?;
        let profile = self.profile.as_ref()?;
        if profile.id != identity.id {
            return None;
        }
        profile.role()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// A profile fetch or default-create for the current identity is outstanding.
    pub fn profile_pending(&self) -> bool {
        self.profile_status.is_some_and(ProfileStatus::is_pending)
    }

    /// Nothing left to reconcile: bootstrap done and no profile load outstanding.
    pub fn is_settled(&self) -> bool {
        !self.is_loading && !self.profile_pending()
    }

    pub fn phase(&self) -> SessionPhase {
        if self.is_loading && self.identity.is_none() {
            return SessionPhase::Bootstrapping;
        }
        match (&self.identity, self.profile_status) {
            (None, _) => SessionPhase::Anonymous,
            (Some(_), Some(status)) => SessionPhase::Authenticated(status),
            (Some(_), None) => SessionPhase::Authenticated(ProfileStatus::Loading),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::bootstrapping()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use precinct_core::UserId;

    use super::*;
    use crate::IdentityMetadata;

    fn identity(id: UserId) -> Identity {
        Identity {
            id,
            email: "civilian@example.com".to_string(),
            confirmed: true,
            metadata: IdentityMetadata::default(),
        }
    }

    #[test]
    fn role_requires_matching_profile() {
        let id = UserId::new();
        let mut session = Session::bootstrapping();
        session.is_loading = false;
        session.identity = Some(identity(id));
        session.profile = Some(Profile::new_default(UserId::new(), "other@example.com", None, Utc::now()));

        assert_eq!(session.role(), None);

        session.profile = Some(Profile::new_default(id, "civilian@example.com", None, Utc::now()));
        assert_eq!(session.role(), Some(Role::Civilian));
    }

    #[test]
    fn phases() {
        let mut session = Session::bootstrapping();
        assert_eq!(session.phase(), SessionPhase::Bootstrapping);

        session.is_loading = false;
        assert_eq!(session.phase(), SessionPhase::Anonymous);

        session.identity = Some(identity(UserId::new()));
        session.profile_status = Some(ProfileStatus::Missing);
        assert_eq!(session.phase(), SessionPhase::Authenticated(ProfileStatus::Missing));
        assert!(session.profile_pending());
        assert!(!session.is_settled());
    }
}
