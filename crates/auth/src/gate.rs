//! Authorization gate for role-restricted views.
//!
//! - No IO
//! - No panics
//! - Deterministic: the decision depends only on the session and the
//!   required role. The caller performs the redirect and shows the notice.

use crate::{Notification, Notifier, Role, Session};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    ShowLoading,
    RedirectToLogin,
    RedirectToHome { required: Role },
}

impl Decision {
    /// The notice that accompanies this decision, if any.
    pub fn notice(&self) -> Option<Notification> {
        match self {
            Decision::Allow | Decision::ShowLoading => None,
            Decision::RedirectToLogin => Some(Notification::authentication_required()),
            Decision::RedirectToHome { required } => Some(Notification::access_denied(*required)),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Path to navigate to, for redirecting decisions.
    pub fn redirect_path(&self) -> Option<&'static str> {
        match self {
            Decision::RedirectToLogin => Some("/login"),
            Decision::RedirectToHome { .. } => Some("/"),
            Decision::Allow | Decision::ShowLoading => None,
        }
    }
}

/// Decide whether the session may see content requiring `required`.
///
/// An unknown stored role matches no required role.
pub fn decide(session: &Session, required: Option<Role>) -> Decision {
    if session.is_loading {
        return Decision::ShowLoading;
    }
    if session.identity.is_none() {
        return Decision::RedirectToLogin;
    }
    match required {
        Some(required) if session.role() != Some(required) => Decision::RedirectToHome { required },
        _ => Decision::Allow,
    }
}

/// [`decide`], then hand the decision's notice to `notifier`.
pub fn guard(session: &Session, required: Option<Role>, notifier: &dyn Notifier) -> Decision {
    let decision = decide(session, required);
    if let Some(notice) = decision.notice() {
        notifier.notify(notice);
    }
    decision
}
