//! User-facing notification side channel (toasts).

use serde::Serialize;

use crate::{AuthError, Role};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity: Severity::Info,
        }
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity: Severity::Destructive,
        }
    }

    pub fn login_succeeded() -> Self {
        Self::info("Success", "You have successfully logged in")
    }

    pub fn login_failed(err: &AuthError) -> Self {
        Self::destructive("Login failed", err.to_string())
    }

    pub fn registered(confirmed: bool) -> Self {
        if confirmed {
            Self::info("Registration successful", "Your account is ready")
        } else {
            Self::info(
                "Registration successful",
                "Please check your email to confirm your account",
            )
        }
    }

    pub fn registration_failed(err: &AuthError) -> Self {
        Self::destructive("Registration failed", err.to_string())
    }

    pub fn logged_out() -> Self {
        Self::info("Logged out", "You have been successfully logged out")
    }

    pub fn authentication_required() -> Self {
        Self::destructive(
            "Authentication required",
            "You must be logged in to access this page",
        )
    }

    pub fn access_denied(required: Role) -> Self {
        Self::destructive(
            "Access denied",
            format!("Only {required} users can access this page"),
        )
    }
}

/// Presents notifications to the user. Implementations must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

impl<N> Notifier for std::sync::Arc<N>
where
    N: Notifier + ?Sized,
{
    fn notify(&self, notification: Notification) {
        (**self).notify(notification)
    }
}

/// Notifier that only writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.severity {
            Severity::Info => tracing::info!(
                title = %notification.title,
                description = %notification.description,
                "notification"
            ),
            Severity::Destructive => tracing::warn!(
                title = %notification.title,
                description = %notification.description,
                "notification"
            ),
        }
    }
}
