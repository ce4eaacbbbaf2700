//! Identity provider boundary.
//!
//! The provider owns sign-in/sign-up/sign-out against a remote auth service and
//! reports every identity transition. Reports carry a monotonic `sequence` so
//! the session controller can merge the bootstrap read and the event stream
//! deterministically (latest wins, duplicates ignored).

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use precinct_core::UserId;

use crate::Role;

/// Provider-side attributes attached at sign-up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// External authentication record for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub email: String,
    /// Whether the email address has been confirmed.
    pub confirmed: bool,
    #[serde(default)]
    pub metadata: IdentityMetadata,
}

/// Opaque token state issued by the provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityEventKind {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// A single identity transition as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityEvent {
    pub kind: IdentityEventKind,
    pub identity: Option<Identity>,
    pub credentials: Option<Credentials>,
    pub sequence: u64,
}

/// Best-effort read of the provider's current session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentitySnapshot {
    pub identity: Option<Identity>,
    pub credentials: Option<Credentials>,
    /// Sequence of the last transition folded into this snapshot (0 = none yet).
    pub sequence: u64,
}

/// Attributes recorded provider-side at sign-up, before any profile row exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpAttributes {
    pub role: Role,
    pub display_name: Option<String>,
}

impl SignUpAttributes {
    pub fn to_metadata(&self) -> IdentityMetadata {
        IdentityMetadata {
            role: Some(self.role.as_str().to_string()),
            display_name: self
                .display_name
                .as_ref()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        }
    }
}

/// Successful sign-up. `confirmed == false` means a confirmation email was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpOutcome {
    pub identity: Identity,
    pub confirmed: bool,
}

/// Authentication failure, worded for direct display to the user.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Please confirm your email address before logging in")]
    UnconfirmedEmail,

    #[error("An account with this email address already exists")]
    EmailAlreadyRegistered,

    #[error("Password is too weak: {0}")]
    WeakPassword(String),

    #[error("{0}")]
    Unknown(String),
}

/// Receiving end of a provider subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<IdentityEvent>,
}

impl Subscription {
    pub fn new(receiver: mpsc::UnboundedReceiver<IdentityEvent>) -> Self {
        Self { receiver }
    }

    /// Wait for the next event; `None` once the provider is gone.
    pub async fn recv(&mut self) -> Option<IdentityEvent> {
        self.receiver.recv().await
    }

    /// Take an already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<IdentityEvent> {
        self.receiver.try_recv().ok()
    }
}

/// Remote authentication service, as seen by the session controller.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Fails with `InvalidCredentials` or `UnconfirmedEmail` on rejection.
    /// On success the provider also publishes a `SignedIn` event.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    /// Fails with `EmailAlreadyRegistered` or `WeakPassword`.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        attributes: SignUpAttributes,
    ) -> Result<SignUpOutcome, AuthError>;

    /// Always clears local provider state, even if the remote call fails.
    async fn sign_out(&self);

    fn current_session(&self) -> IdentitySnapshot;

    /// Every transition after this call is delivered, in order.
    fn subscribe(&self) -> Subscription;
}

/// Provider-side session state plus subscriber fan-out.
///
/// Shared by provider implementations: each transition bumps the sequence,
/// replaces the snapshot, and is sent to every live subscriber under one lock,
/// so subscribers observe transitions in sequence order.
#[derive(Debug, Default)]
pub struct IdentityHub {
    inner: Mutex<HubState>,
}

#[derive(Debug, Default)]
struct HubState {
    snapshot: IdentitySnapshot,
    subscribers: Vec<mpsc::UnboundedSender<IdentityEvent>>,
}

impl IdentityHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> IdentitySnapshot {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot
            .clone()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .push(tx);
        Subscription::new(rx)
    }

    /// Record a transition and deliver it to subscribers.
    pub fn publish(
        &self,
        kind: IdentityEventKind,
        identity: Option<Identity>,
        credentials: Option<Credentials>,
    ) -> IdentityEvent {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let sequence = state.snapshot.sequence + 1;
        state.snapshot = IdentitySnapshot {
            identity: identity.clone(),
            credentials: credentials.clone(),
            sequence,
        };

        let event = IdentityEvent {
            kind,
            identity,
            credentials,
            sequence,
        };

        // Drop any dead subscribers while publishing.
        state.subscribers.retain(|tx| tx.send(event.clone()).is_ok());

        event
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(email: &str) -> Identity {
        Identity {
            id: UserId::new(),
            email: email.to_string(),
            confirmed: true,
            metadata: IdentityMetadata::default(),
        }
    }

    #[test]
    fn hub_assigns_increasing_sequences_and_updates_snapshot() {
        let hub = IdentityHub::new();
        assert_eq!(hub.snapshot().sequence, 0);

        let alice = identity("alice@example.com");
        let first = hub.publish(IdentityEventKind::SignedIn, Some(alice.clone()), None);
        let second = hub.publish(IdentityEventKind::SignedOut, None, None);

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(hub.snapshot().sequence, 2);
        assert!(hub.snapshot().identity.is_none());
    }

    #[test]
    fn dropped_subscriptions_are_pruned() {
        let hub = IdentityHub::new();
        let mut kept = hub.subscribe();
        let dropped = hub.subscribe();
        drop(dropped);

        hub.publish(IdentityEventKind::SignedOut, None, None);

        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(kept.try_recv().map(|e| e.sequence), Some(1));
    }

    #[test]
    fn sign_up_metadata_drops_blank_display_name() {
        let attrs = SignUpAttributes {
            role: Role::Police,
            display_name: Some("   ".to_string()),
        };
        let metadata = attrs.to_metadata();
        assert_eq!(metadata.role.as_deref(), Some("police"));
        assert_eq!(metadata.display_name, None);
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = Credentials {
            access_token: "secret-token".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: None,
        };
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(!rendered.contains("\"refresh\""));
    }
}
