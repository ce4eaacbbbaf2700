//! Session controller: the single writer of [`Session`].
//!
//! Two sources report the identity: the bootstrap read of the provider's
//! current session, and the provider's event stream. Both carry a provider
//! sequence number; a report is applied only if it is newer than the last one
//! applied. Each applied identity transition bumps a generation counter, and
//! profile fetches are tagged with the generation that scheduled them so a
//! result that arrives after a newer transition is dropped instead of applied.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use precinct_core::UserId;

use crate::gate::{self, Decision};
use crate::{
    Credentials, Identity, IdentityProvider, Notification, Notifier, Profile, ProfilePatch,
    ProfileStatus, ProfileStore, Role, Session, SignUpAttributes, StoreError, Subscription,
};

/// Owns the process-wide session and exposes login/register/logout.
///
/// Cheap to clone; all clones drive the same session. Must be started inside a
/// Tokio runtime.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

struct Inner {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn ProfileStore>,
    notifier: Arc<dyn Notifier>,
    state: watch::Sender<Session>,
    tracker: Mutex<Tracker>,
}

/// Reconciliation bookkeeping. Every state write happens while this is locked.
#[derive(Debug, Default)]
struct Tracker {
    last_sequence: Option<u64>,
    generation: u64,
    /// Identity whose profile load is outstanding, with its generation.
    in_flight: Option<(UserId, u64)>,
}

#[derive(Debug, Clone)]
struct ProfileJob {
    user_id: UserId,
    email: String,
    display_name_hint: Option<String>,
    generation: u64,
}

impl SessionController {
    /// Subscribe to the provider, then run the bootstrap check.
    ///
    /// The subscription is taken before the bootstrap read so that no
    /// transition can fall between the two.
    pub fn start(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn ProfileStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (state, _) = watch::channel(Session::bootstrapping());
        let inner = Arc::new(Inner {
            provider,
            store,
            notifier,
            state,
            tracker: Mutex::new(Tracker::default()),
        });

        let subscription = inner.provider.subscribe();
        tokio::spawn(pump(Arc::downgrade(&inner), subscription));
        tokio::spawn(Arc::clone(&inner).bootstrap());

        Self { inner }
    }

    /// Reactive, read-only view of the session.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    pub fn session(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.inner.state.borrow().identity.clone()
    }

    pub fn profile(&self) -> Option<Profile> {
        self.inner.state.borrow().profile.clone()
    }

    pub fn role(&self) -> Option<Role> {
        self.inner.state.borrow().role()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().is_loading
    }

    /// Wait until bootstrap has finished and no profile load is outstanding.
    pub async fn settled(&self) -> Session {
        let mut rx = self.inner.state.subscribe();
        match rx.wait_for(Session::is_settled).await {
            Ok(session) => session.clone(),
            Err(_) => self.session(),
        }
    }

    /// Evaluate the authorization gate against the current session and emit
    /// the notice it calls for.
    pub fn check(&self, required: Option<Role>) -> Decision {
        let session = self.inner.state.borrow().clone();
        gate::guard(&session, required, self.inner.notifier.as_ref())
    }

    /// Returns once the provider has answered; the profile loads afterwards.
    ///
    /// The new identity is visible in the session on return.
    pub async fn login(&self, email: &str, password: &str) -> bool {
        info!(email, "attempting login");
        match self.inner.provider.sign_in(email, password).await {
            Ok(identity) => {
                info!(user_id = %identity.id, "login succeeded");
                self.inner.sync_with_provider();
                self.inner.notifier.notify(Notification::login_succeeded());
                true
            }
            Err(err) => {
                info!(email, error = %err, "login rejected");
                self.inner.notifier.notify(Notification::login_failed(&err));
                false
            }
        }
    }

    /// Role and display name travel as provider metadata; the profile row is
    /// created later, on first sign-in.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        role: Role,
        display_name: Option<&str>,
    ) -> bool {
        info!(email, %role, "attempting registration");
        let attributes = SignUpAttributes {
            role,
            display_name: display_name.map(str::to_string),
        };

        match self.inner.provider.sign_up(email, password, attributes).await {
            Ok(outcome) => {
                info!(
                    user_id = %outcome.identity.id,
                    confirmed = outcome.confirmed,
                    "registration succeeded"
                );
                if outcome.confirmed {
                    self.inner.sync_with_provider();
                }
                self.inner
                    .notifier
                    .notify(Notification::registered(outcome.confirmed));
                true
            }
            Err(err) => {
                info!(email, error = %err, "registration rejected");
                self.inner
                    .notifier
                    .notify(Notification::registration_failed(&err));
                false
            }
        }
    }

    /// Local state is cleared before the provider call is awaited. Reports
    /// already queued at that point are ignored.
    pub async fn logout(&self) {
        self.inner.clear_local();
        self.inner.provider.sign_out().await;
        self.inner.sync_with_provider();
        info!("logged out");
        self.inner.notifier.notify(Notification::logged_out());
    }

    /// Update the signed-in user's display name.
    pub async fn update_display_name(&self, display_name: &str) -> bool {
        let display_name = display_name.trim();
        let current_user = self.inner.state.borrow().identity.as_ref().map(|i| i.id);
        let Some(user_id) = current_user else {
            self.inner
                .notifier
                .notify(Notification::authentication_required());
            return false;
        };
        if display_name.is_empty() {
            self.inner.notifier.notify(Notification::destructive(
                "Update failed",
                "Display name cannot be empty",
            ));
            return false;
        }

        let patch = ProfilePatch {
            display_name: Some(display_name.to_string()),
            ..Default::default()
        };
        match self.inner.store.update(user_id, patch).await {
            Ok(profile) => {
                self.inner.apply_updated(profile);
                self.inner.notifier.notify(Notification::info(
                    "Profile updated",
                    "Your display name has been saved",
                ));
                true
            }
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "profile update failed");
                self.inner
                    .notifier
                    .notify(Notification::destructive("Update failed", err.to_string()));
                false
            }
        }
    }
}

impl core::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionController")
            .field("session", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

/// Drain provider events for as long as the controller is alive.
async fn pump(weak: Weak<Inner>, mut subscription: Subscription) {
    while let Some(event) = subscription.recv().await {
        let Some(inner) = weak.upgrade() else {
            break;
        };
        debug!(kind = ?event.kind, sequence = event.sequence, "identity event");
        if let Some(job) = inner.apply_report(event.sequence, event.identity, event.credentials) {
            inner.schedule(job);
        }
    }
    debug!("identity event pump stopped");
}

impl Inner {
    fn tracker(&self) -> MutexGuard<'_, Tracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn bootstrap(self: Arc<Self>) {
        debug!("bootstrap session check");
        self.sync_with_provider();

        // Keep the loading flag up until the current identity's profile settles.
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| !s.profile_pending()).await;

        let _guard = self.tracker();
        self.state.send_modify(|s| s.is_loading = false);
        info!("session bootstrap complete");
    }

    /// Fold the provider's current session in as a report of its own.
    fn sync_with_provider(self: &Arc<Self>) {
        let snapshot = self.provider.current_session();
        debug!(
            sequence = snapshot.sequence,
            signed_in = snapshot.identity.is_some(),
            "provider session read"
        );
        if let Some(job) = self.apply_report(snapshot.sequence, snapshot.identity, snapshot.credentials) {
            self.schedule(job);
        }
    }

    /// Fold one identity report into the session. Returns the profile load to
    /// schedule, if the report starts a new identity transition.
    fn apply_report(
        &self,
        sequence: u64,
        identity: Option<Identity>,
        credentials: Option<Credentials>,
    ) -> Option<ProfileJob> {
        let mut tracker = self.tracker();
        if tracker.last_sequence.is_some_and(|last| sequence <= last) {
            debug!(sequence, "ignoring superseded identity report");
            return None;
        }
        tracker.last_sequence = Some(sequence);

        let Some(identity) = identity else {
            tracker.generation += 1;
            tracker.in_flight = None;
            self.state.send_if_modified(clear_identity);
            return None;
        };

        let user_id = identity.id;
        let (same_user, has_profile) = {
            let current = self.state.borrow();
            (
                current.identity.as_ref().map(|i| i.id) == Some(user_id),
                current.profile.as_ref().is_some_and(|p| p.id == user_id),
            )
        };
        let fetching = tracker.in_flight.is_some_and(|(id, _)| id == user_id);

        if same_user && (has_profile || fetching) {
            // Token refresh or a repeated report of the same user.
            self.state.send_modify(|s| {
                s.identity = Some(identity);
                s.credentials = credentials;
            });
            return None;
        }

        tracker.generation += 1;
        let generation = tracker.generation;
        tracker.in_flight = Some((user_id, generation));

        let job = ProfileJob {
            user_id,
            email: identity.email.clone(),
            display_name_hint: identity.metadata.display_name.clone(),
            generation,
        };

        self.state.send_modify(|s| {
            if !same_user {
                s.profile = None;
            }
            s.identity = Some(identity);
            s.credentials = credentials;
            s.profile_status = Some(ProfileStatus::Loading);
        });

        debug!(user_id = %user_id, generation, "profile load scheduled");
        Some(job)
    }

    fn schedule(self: &Arc<Self>, job: ProfileJob) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            // Let the provider finish propagating its own session first.
            tokio::task::yield_now().await;
            let outcome = inner.resolve_profile(&job).await;
            inner.settle(&job, outcome);
        });
    }

    /// Fetch, and on "not found" create the default profile exactly once.
    async fn resolve_profile(&self, job: &ProfileJob) -> Option<Profile> {
        match self.store.fetch_by_identity_id(job.user_id).await {
            Ok(Some(profile)) => return Some(profile),
            Ok(None) => {}
            Err(err) => {
                warn!(user_id = %job.user_id, error = %err, "profile fetch failed");
                return None;
            }
        }

        if !self.mark_missing(job) {
            debug!(
                user_id = %job.user_id,
                generation = job.generation,
                "identity superseded before default profile creation"
            );
            return None;
        }

        match self
            .store
            .create_default(job.user_id, &job.email, job.display_name_hint.as_deref())
            .await
        {
            Ok(profile) => {
                info!(user_id = %job.user_id, "created default profile");
                Some(profile)
            }
            Err(StoreError::Constraint(reason)) => {
                debug!(user_id = %job.user_id, %reason, "default profile creation raced; re-fetching");
                match self.store.fetch_by_identity_id(job.user_id).await {
                    Ok(profile) => profile,
                    Err(err) => {
                        warn!(user_id = %job.user_id, error = %err, "profile re-fetch failed");
                        None
                    }
                }
            }
            Err(err) => {
                warn!(user_id = %job.user_id, error = %err, "default profile creation failed");
                None
            }
        }
    }

    fn mark_missing(&self, job: &ProfileJob) -> bool {
        let tracker = self.tracker();
        if tracker.generation != job.generation {
            return false;
        }
        self.state
            .send_modify(|s| s.profile_status = Some(ProfileStatus::Missing));
        true
    }

    fn settle(&self, job: &ProfileJob, outcome: Option<Profile>) {
        let mut tracker = self.tracker();
        let current_user = self.state.borrow().identity.as_ref().map(|i| i.id);
        if tracker.generation != job.generation || current_user != Some(job.user_id) {
            debug!(
                user_id = %job.user_id,
                generation = job.generation,
                current_generation = tracker.generation,
                "discarding stale profile result"
            );
            return;
        }
        tracker.in_flight = None;

        let profile = outcome.filter(|p| {
            let matches = p.id == job.user_id;
            if !matches {
                debug!(expected = %job.user_id, got = %p.id, "discarding profile for another identity");
            }
            matches
        });

        if let Some(profile) = &profile {
            if profile.role().is_none() {
                warn!(
                    user_id = %job.user_id,
                    role = %profile.role,
                    "profile carries an unrecognized role; no restricted access"
                );
            }
        }

        self.state.send_modify(|s| {
            s.profile_status = Some(if profile.is_some() {
                ProfileStatus::Ready
            } else {
                ProfileStatus::Failed
            });
            s.profile = profile;
        });
    }

    fn apply_updated(&self, profile: Profile) {
        let tracker = self.tracker();
        let current_user = self.state.borrow().identity.as_ref().map(|i| i.id);
        if current_user != Some(profile.id) || tracker.in_flight.is_some() {
            debug!(user_id = %profile.id, "session moved on; not applying updated profile");
            return;
        }
        self.state.send_modify(|s| {
            s.profile = Some(profile);
            s.profile_status = Some(ProfileStatus::Ready);
        });
    }

    fn clear_local(&self) {
        let mut tracker = self.tracker();
        let fence = self.provider.current_session().sequence;
        tracker.last_sequence = Some(tracker.last_sequence.map_or(fence, |last| last.max(fence)));
        tracker.generation += 1;
        tracker.in_flight = None;
        self.state.send_if_modified(clear_identity);
    }
}

fn clear_identity(session: &mut Session) -> bool {
    let changed = session.identity.is_some()
        || session.credentials.is_some()
        || session.profile.is_some()
        || session.profile_status.is_some();
    session.identity = None;
    session.credentials = None;
    session.profile = None;
    session.profile_status = None;
    changed
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::{sleep, timeout};

    use super::*;
    use crate::IdentityEventKind;
    use crate::in_memory::{InMemoryIdentityProvider, InMemoryProfileStore, RecordingNotifier};

    const WAIT: Duration = Duration::from_secs(2);

    fn start(
        provider: &Arc<InMemoryIdentityProvider>,
        store: &Arc<InMemoryProfileStore>,
    ) -> SessionController {
        SessionController::start(
            provider.clone(),
            store.clone(),
            Arc::new(RecordingNotifier::new()),
        )
    }

    #[tokio::test]
    async fn bootstrap_and_event_reporting_one_identity_fetch_once() {
        let provider = Arc::new(InMemoryIdentityProvider::new());
        let store = Arc::new(InMemoryProfileStore::new());
        let identity = provider.seed_account("police@example.com", "password123");
        store.insert_for(&identity, Role::Police);

        let controller = start(&provider, &store);
        // Subscribed, but neither the pump nor the bootstrap read has run yet.
        provider.emit(IdentityEventKind::SignedIn, Some(identity.clone()));

        let session = timeout(WAIT, controller.settled()).await.expect("settle");
        sleep(Duration::from_millis(20)).await;

        assert_eq!(session.role(), Some(Role::Police));
        assert_eq!(store.fetch_calls(), 1);
        assert_eq!(controller.inner.tracker().last_sequence, Some(1));
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn reports_not_newer_than_the_last_applied_are_ignored() {
        let provider = Arc::new(InMemoryIdentityProvider::new());
        let store = Arc::new(InMemoryProfileStore::new());
        let first = provider.seed_account("first@example.com", "password123");
        let second = provider.seed_account("second@example.com", "password123");
        store.insert_for(&first, Role::Civilian);

        let controller = start(&provider, &store);
        timeout(WAIT, controller.settled()).await.expect("settle");
        assert!(controller.login("first@example.com", "password123").await);
        timeout(WAIT, controller.settled()).await.expect("settle");
        let before = controller.session();

        assert!(controller.inner.apply_report(1, Some(second.clone()), None).is_none());
        assert!(controller.inner.apply_report(0, None, None).is_none());
        assert_eq!(controller.session(), before);
        assert_eq!(store.fetch_calls(), 1);

        let job = controller.inner.apply_report(2, Some(second.clone()), None);
        assert_eq!(job.map(|j| j.user_id), Some(second.id));
        assert_eq!(controller.identity().map(|i| i.id), Some(second.id));
    }

    #[tokio::test]
    async fn login_is_visible_before_it_returns() {
        let provider = Arc::new(InMemoryIdentityProvider::new());
        let store = Arc::new(InMemoryProfileStore::new());
        let identity = provider.seed_account("civilian@example.com", "password123");
        store.insert_for(&identity, Role::Civilian);
        store.hold(identity.id);

        let controller = start(&provider, &store);
        timeout(WAIT, controller.settled()).await.expect("settle");
        assert!(controller.login("civilian@example.com", "password123").await);

        let session = controller.session();
        assert_eq!(session.identity.map(|i| i.id), Some(identity.id));
        assert_eq!(session.profile_status, Some(ProfileStatus::Loading));

        store.release(identity.id);
        let session = timeout(WAIT, controller.settled()).await.expect("settle");
        assert_eq!(session.role(), Some(Role::Civilian));
        assert_eq!(store.fetch_calls(), 1);
    }
}
