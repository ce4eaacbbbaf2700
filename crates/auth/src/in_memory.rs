//! In-memory identity provider, profile store and notifier.
//!
//! Intended for tests/dev. The hooks (`hold`, `hold_sign_out`,
//! `fail_next_fetch`, `race_next_create`) let tests reproduce orderings that
//! a remote backend produces only under load.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Semaphore;
use uuid::Uuid;

use precinct_core::UserId;

use crate::{
    AuthError, Credentials, Identity, IdentityEvent, IdentityEventKind, IdentityHub,
    IdentityMetadata, IdentityProvider, IdentitySnapshot, Notification, Notifier, Profile,
    ProfilePatch, ProfileStore, Role, SignUpAttributes, SignUpOutcome, StoreError, StoredRole,
    Subscription,
};

const MIN_PASSWORD_LEN: usize = 6;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wait until `gate` is closed. A `None` gate passes immediately.
async fn pass(gate: Option<Arc<Semaphore>>) {
    if let Some(gate) = gate {
        // Closed semaphores fail `acquire`; that is the release signal.
        let _ = gate.acquire().await;
    }
}

#[derive(Debug, Clone)]
struct Account {
    identity: Identity,
    password: String,
}

/// Identity provider backed by a map of accounts.
#[derive(Debug, Default)]
pub struct InMemoryIdentityProvider {
    accounts: Mutex<HashMap<String, Account>>,
    hub: IdentityHub,
    require_confirmation: AtomicBool,
    sign_out_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl InMemoryIdentityProvider {
    /// Sign-ups are confirmed immediately and start a session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sign-ups stay unconfirmed until [`confirm_email`](Self::confirm_email).
    pub fn with_email_confirmation() -> Self {
        let provider = Self::default();
        provider.require_confirmation.store(true, Ordering::SeqCst);
        provider
    }

    /// Add a confirmed account whose metadata carries `role`.
    pub fn register_account(
        &self,
        email: &str,
        password: &str,
        role: Option<Role>,
        display_name: Option<&str>,
    ) -> Identity {
        let identity = Identity {
            id: UserId::new(),
            email: email.to_string(),
            confirmed: true,
            metadata: IdentityMetadata {
                role: role.map(|r| r.as_str().to_string()),
                display_name: display_name.map(str::to_string),
            },
        };
        lock(&self.accounts).insert(
            normalize(email),
            Account {
                identity: identity.clone(),
                password: password.to_string(),
            },
        );
        identity
    }

    pub fn seed_account(&self, email: &str, password: &str) -> Identity {
        self.register_account(email, password, None, None)
    }

    pub fn confirm_email(&self, email: &str) -> bool {
        match lock(&self.accounts).get_mut(&normalize(email)) {
            Some(account) => {
                account.identity.confirmed = true;
                true
            }
            None => false,
        }
    }

    /// Make `identity` the persisted session, as if restored from storage.
    pub fn restore_session(&self, identity: &Identity) -> IdentityEvent {
        self.hub.publish(
            IdentityEventKind::InitialSession,
            Some(identity.clone()),
            Some(issue_credentials()),
        )
    }

    /// Rotate the current session's credentials. `None` when signed out.
    pub fn refresh_token(&self) -> Option<IdentityEvent> {
        let identity = self.hub.snapshot().identity?;
        Some(self.hub.publish(
            IdentityEventKind::TokenRefreshed,
            Some(identity),
            Some(issue_credentials()),
        ))
    }

    /// Publish an arbitrary transition.
    pub fn emit(&self, kind: IdentityEventKind, identity: Option<Identity>) -> IdentityEvent {
        let credentials = identity.as_ref().map(|_| issue_credentials());
        self.hub.publish(kind, identity, credentials)
    }

    /// Block `sign_out` until [`release_sign_out`](Self::release_sign_out).
    pub fn hold_sign_out(&self) {
        *lock(&self.sign_out_gate) = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_sign_out(&self) {
        if let Some(gate) = lock(&self.sign_out_gate).take() {
            gate.close();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let account = lock(&self.accounts).get(&normalize(email)).cloned();
        let Some(account) = account.filter(|a| a.password == password) else {
            return Err(AuthError::InvalidCredentials);
        };
        if !account.identity.confirmed && self.require_confirmation.load(Ordering::SeqCst) {
            return Err(AuthError::UnconfirmedEmail);
        }

        self.hub.publish(
            IdentityEventKind::SignedIn,
            Some(account.identity.clone()),
            Some(issue_credentials()),
        );
        Ok(account.identity)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        attributes: SignUpAttributes,
    ) -> Result<SignUpOutcome, AuthError> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword(format!(
                "Password should be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let confirmed = !self.require_confirmation.load(Ordering::SeqCst);
        let identity = {
            let mut accounts = lock(&self.accounts);
            let key = normalize(email);
            if accounts.contains_key(&key) {
                return Err(AuthError::EmailAlreadyRegistered);
            }
            let identity = Identity {
                id: UserId::new(),
                email: email.trim().to_string(),
                confirmed,
                metadata: attributes.to_metadata(),
            };
            accounts.insert(
                key,
                Account {
                    identity: identity.clone(),
                    password: password.to_string(),
                },
            );
            identity
        };

        if confirmed {
            self.hub.publish(
                IdentityEventKind::SignedIn,
                Some(identity.clone()),
                Some(issue_credentials()),
            );
        }
        Ok(SignUpOutcome { identity, confirmed })
    }

    async fn sign_out(&self) {
        let gate = lock(&self.sign_out_gate).clone();
        pass(gate).await;
        self.hub.publish(IdentityEventKind::SignedOut, None, None);
    }

    fn current_session(&self) -> IdentitySnapshot {
        self.hub.snapshot()
    }

    fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

fn issue_credentials() -> Credentials {
    Credentials {
        access_token: Uuid::new_v4().to_string(),
        refresh_token: Some(Uuid::new_v4().to_string()),
        expires_at: Some(Utc::now() + Duration::hours(1)),
    }
}

/// Profile store backed by a map, with call counters and fault hooks.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    rows: RwLock<HashMap<UserId, Profile>>,
    holds: Mutex<HashMap<UserId, Arc<Semaphore>>>,
    fetch_calls: AtomicUsize,
    create_calls: AtomicUsize,
    fail_next_fetch: AtomicBool,
    race_next_create: AtomicBool,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: Profile) {
        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.id, profile);
    }

    /// Insert a profile whose role column holds `raw_role` verbatim.
    pub fn insert_with_raw_role(&self, identity: &Identity, raw_role: &str) -> Profile {
        let mut profile = Profile::new_default(identity.id, &identity.email, None, Utc::now());
        profile.role = StoredRole::from(raw_role.to_string());
        self.insert(profile.clone());
        profile
    }

    pub fn insert_for(&self, identity: &Identity, role: Role) -> Profile {
        self.insert_with_raw_role(identity, role.as_str())
    }

    pub fn get(&self, id: UserId) -> Option<Profile> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Park fetches for `id` until [`release`](Self::release).
    pub fn hold(&self, id: UserId) {
        lock(&self.holds).insert(id, Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, id: UserId) {
        if let Some(gate) = lock(&self.holds).remove(&id) {
            gate.close();
        }
    }

    /// The next fetch fails with a transport error.
    pub fn fail_next_fetch(&self) {
        self.fail_next_fetch.store(true, Ordering::SeqCst);
    }

    /// The next create inserts the row, then reports a unique violation, as
    /// if a concurrent client had won the insert.
    pub fn race_next_create(&self) {
        self.race_next_create.store(true, Ordering::SeqCst);
    }

    fn poisoned() -> StoreError {
        StoreError::Transport("lock poisoned".to_string())
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn fetch_by_identity_id(&self, id: UserId) -> Result<Option<Profile>, StoreError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let gate = lock(&self.holds).get(&id).cloned();
        pass(gate).await;

        if self.fail_next_fetch.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Transport("connection reset".to_string()));
        }
        let rows = self.rows.read().map_err(|_| Self::poisoned())?;
        Ok(rows.get(&id).cloned())
    }

    async fn create_default(
        &self,
        id: UserId,
        email: &str,
        display_name_hint: Option<&str>,
    ) -> Result<Profile, StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.write().map_err(|_| Self::poisoned())?;
        let raced = self.race_next_create.swap(false, Ordering::SeqCst);
        if rows.contains_key(&id) && !raced {
            return Err(StoreError::Constraint(format!("profile {id} already exists")));
        }

        let profile = Profile::new_default(id, email, display_name_hint, Utc::now());
        rows.insert(id, profile.clone());
        if raced {
            return Err(StoreError::Constraint(format!("profile {id} already exists")));
        }
        Ok(profile)
    }

    async fn update(&self, id: UserId, patch: ProfilePatch) -> Result<Profile, StoreError> {
        let mut rows = self.rows.write().map_err(|_| Self::poisoned())?;
        let profile = rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("profile {id}")))?;
        profile.apply(&patch, Utc::now());
        Ok(profile.clone())
    }
}

/// Notifier that keeps every notification, for assertions.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Notification> {
        lock(&self.seen).clone()
    }

    pub fn titles(&self) -> Vec<String> {
        lock(&self.seen).iter().map(|n| n.title.clone()).collect()
    }

    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *lock(&self.seen))
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        lock(&self.seen).push(notification);
    }
}
