use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

use precinct_auth::in_memory::{InMemoryIdentityProvider, InMemoryProfileStore, RecordingNotifier};
use precinct_auth::{
    Decision, Identity, IdentityEventKind, IdentityProvider, Menu, ProfileStatus, Role, Session,
    SessionController, Severity,
};

const WAIT: Duration = Duration::from_secs(2);

struct Harness {
    provider: Arc<InMemoryIdentityProvider>,
    store: Arc<InMemoryProfileStore>,
    notifier: Arc<RecordingNotifier>,
    controller: SessionController,
}

impl Harness {
    fn start(provider: InMemoryIdentityProvider, store: InMemoryProfileStore) -> Self {
        let provider = Arc::new(provider);
        let store = Arc::new(store);
        let notifier = Arc::new(RecordingNotifier::new());
        let controller = SessionController::start(provider.clone(), store.clone(), notifier.clone());
        Self {
            provider,
            store,
            notifier,
            controller,
        }
    }

    async fn settled(&self) -> Session {
        timeout(WAIT, self.controller.settled())
            .await
            .expect("session did not settle")
    }

    async fn until(&self, predicate: impl FnMut(&Session) -> bool) -> Session {
        let mut rx = self.controller.subscribe();
        wait_on(&mut rx, predicate).await
    }
}

async fn wait_on(rx: &mut watch::Receiver<Session>, predicate: impl FnMut(&Session) -> bool) -> Session {
    timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("timed out waiting for session state")
        .expect("controller dropped")
        .clone()
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never became true");
}

fn is_user(session: &Session, identity: &Identity) -> bool {
    session.identity.as_ref().map(|i| i.id) == Some(identity.id)
}

#[tokio::test]
async fn anonymous_bootstrap_redirects_to_login() {
    let h = Harness::start(InMemoryIdentityProvider::new(), InMemoryProfileStore::new());

    let session = h.settled().await;
    assert!(session.identity.is_none());
    assert!(!session.is_loading);

    assert_eq!(h.controller.check(Some(Role::Police)), Decision::RedirectToLogin);
    assert_eq!(h.notifier.titles(), vec!["Authentication required"]);
    assert_eq!(h.store.fetch_calls(), 0);
}

#[tokio::test]
async fn civilian_login_is_gated_by_role() {
    let h = Harness::start(InMemoryIdentityProvider::new(), InMemoryProfileStore::new());
    let identity = h.provider.seed_account("civilian@example.com", "password123");
    h.store.insert_for(&identity, Role::Civilian);
    h.settled().await;

    assert!(h.controller.login("civilian@example.com", "password123").await);
    h.until(|s| is_user(s, &identity) && s.profile_status == Some(ProfileStatus::Ready))
        .await;

    assert_eq!(h.controller.role(), Some(Role::Civilian));
    assert_eq!(h.controller.check(Some(Role::Civilian)), Decision::Allow);
    assert_eq!(
        h.controller.check(Some(Role::Police)),
        Decision::RedirectToHome { required: Role::Police }
    );

    let notes = h.notifier.all();
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[0].title, "Success");
    assert_eq!(notes[1].description, "Only police users can access this page");
}

#[tokio::test]
async fn failed_login_notifies_once_and_stays_anonymous() {
    let h = Harness::start(InMemoryIdentityProvider::new(), InMemoryProfileStore::new());
    h.provider.seed_account("civilian@example.com", "password123");
    h.settled().await;

    assert!(!h.controller.login("civilian@example.com", "nope").await);

    let notes = h.notifier.all();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Login failed");
    assert_eq!(notes[0].description, "Invalid email or password");
    assert_eq!(notes[0].severity, Severity::Destructive);
    assert!(h.controller.identity().is_none());
}

#[tokio::test]
async fn unconfirmed_registration_has_no_role_until_a_later_sign_in() {
    let h = Harness::start(
        InMemoryIdentityProvider::with_email_confirmation(),
        InMemoryProfileStore::new(),
    );
    h.settled().await;

    assert!(
        h.controller
            .register("officer@example.com", "secret123", Role::Police, Some("Officer Kim"))
            .await
    );
    let notes = h.notifier.take();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].description.contains("confirm"));

    let session = h.settled().await;
    assert!(session.identity.is_none());
    assert_eq!(session.role(), None);

    assert!(!h.controller.login("officer@example.com", "secret123").await);
    assert_eq!(h.notifier.take()[0].description, "Please confirm your email address before logging in");
    assert_eq!(h.controller.role(), None);

    assert!(h.provider.confirm_email("officer@example.com"));
    assert!(h.controller.login("officer@example.com", "secret123").await);
    let session = h
        .until(|s| s.identity.is_some() && s.profile_status == Some(ProfileStatus::Ready))
        .await;

    let profile = session.profile.as_ref().expect("profile");
    assert_eq!(profile.display_name.as_deref(), Some("Officer Kim"));
    // The metadata role is never used to self-elevate.
    assert_eq!(session.role(), Some(Role::Civilian));
}

#[tokio::test]
async fn missing_profile_is_created_once_as_civilian() {
    let h = Harness::start(InMemoryIdentityProvider::new(), InMemoryProfileStore::new());
    let identity = h.provider.seed_account("new.user@example.com", "password123");
    h.settled().await;

    assert!(h.controller.login("new.user@example.com", "password123").await);
    let session = h
        .until(|s| is_user(s, &identity) && s.profile_status == Some(ProfileStatus::Ready))
        .await;

    assert_eq!(h.store.create_calls(), 1);
    assert_eq!(session.role(), Some(Role::Civilian));
    let profile = session.profile.expect("profile");
    assert_eq!(profile.display_name.as_deref(), Some("new.user"));
    assert_eq!(h.store.get(identity.id), Some(profile));
}

#[tokio::test]
async fn stale_profile_result_is_discarded() {
    let h = Harness::start(InMemoryIdentityProvider::new(), InMemoryProfileStore::new());
    let first = h.provider.seed_account("first@example.com", "password123");
    let second = h.provider.seed_account("second@example.com", "password123");
    h.store.insert_for(&first, Role::Police);
    h.store.insert_for(&second, Role::Civilian);
    h.settled().await;

    h.store.hold(first.id);
    assert!(h.controller.login("first@example.com", "password123").await);
    let store = h.store.clone();
    eventually(move || store.fetch_calls() == 1).await;

    assert!(h.controller.login("second@example.com", "password123").await);
    h.until(|s| is_user(s, &second) && s.profile_status == Some(ProfileStatus::Ready))
        .await;

    h.store.release(first.id);
    sleep(Duration::from_millis(20)).await;

    let session = h.controller.session();
    assert!(is_user(&session, &second));
    assert_eq!(session.profile.map(|p| p.id), Some(second.id));
    assert_eq!(h.controller.role(), Some(Role::Civilian));
}

#[tokio::test]
async fn rapid_events_apply_only_the_latest_profile() {
    let h = Harness::start(InMemoryIdentityProvider::new(), InMemoryProfileStore::new());
    let a = h.provider.seed_account("a@example.com", "password123");
    let b = h.provider.seed_account("b@example.com", "password123");
    h.store.insert_for(&a, Role::Police);
    h.store.insert_for(&b, Role::Civilian);
    h.settled().await;

    h.store.hold(a.id);
    h.provider.emit(IdentityEventKind::SignedIn, Some(a.clone()));
    h.provider.emit(IdentityEventKind::SignedIn, Some(b.clone()));

    let session = h
        .until(|s| is_user(s, &b) && s.profile_status == Some(ProfileStatus::Ready))
        .await;
    assert_eq!(session.role(), Some(Role::Civilian));

    h.store.release(a.id);
    sleep(Duration::from_millis(20)).await;
    assert_eq!(h.controller.profile().map(|p| p.id), Some(b.id));
}

#[tokio::test]
async fn logout_clears_local_state_before_provider_returns() {
    let h = Harness::start(InMemoryIdentityProvider::new(), InMemoryProfileStore::new());
    let identity = h.provider.seed_account("police@example.com", "password123");
    h.store.insert_for(&identity, Role::Police);
    h.settled().await;
    assert!(h.controller.login("police@example.com", "password123").await);
    h.until(|s| s.role() == Some(Role::Police)).await;
    h.notifier.take();

    h.provider.hold_sign_out();
    let controller = h.controller.clone();
    let pending = tokio::spawn(async move { controller.logout().await });

    let session = h.until(|s| s.identity.is_none()).await;
    assert!(session.profile.is_none());
    assert_eq!(session.role(), None);
    assert!(h.notifier.all().is_empty());

    h.provider.release_sign_out();
    timeout(WAIT, pending).await.expect("logout hung").expect("logout task");
    assert_eq!(h.notifier.titles(), vec!["Logged out"]);
    assert!(h.provider.current_session().identity.is_none());
}

#[tokio::test]
async fn queued_reports_do_not_outlive_logout() {
    let h = Harness::start(InMemoryIdentityProvider::new(), InMemoryProfileStore::new());
    let identity = h.provider.seed_account("police@example.com", "password123");
    h.store.insert_for(&identity, Role::Police);
    h.settled().await;

    h.provider.hold_sign_out();
    assert!(h.controller.login("police@example.com", "password123").await);
    // Still queued for the controller when logout starts.
    h.provider.refresh_token().expect("signed in");

    let logout = h.controller.logout();
    tokio::pin!(logout);
    tokio::select! {
        _ = &mut logout => panic!("sign-out returned while held"),
        _ = sleep(Duration::from_millis(50)) => {}
    }

    let session = h.controller.session();
    assert!(session.identity.is_none());
    assert!(session.credentials.is_none());
    assert_eq!(session.role(), None);

    h.provider.release_sign_out();
    timeout(WAIT, logout).await.expect("logout hung");
    sleep(Duration::from_millis(20)).await;

    assert!(h.controller.identity().is_none());
    assert_eq!(h.controller.role(), None);
    assert_eq!(h.notifier.titles(), vec!["Success", "Logged out"]);
}

#[tokio::test]
async fn settled_after_login_waits_for_the_profile() {
    let h = Harness::start(InMemoryIdentityProvider::new(), InMemoryProfileStore::new());
    let identity = h.provider.seed_account("civilian@example.com", "password123");
    h.store.insert_for(&identity, Role::Civilian);
    h.settled().await;

    assert!(h.controller.login("civilian@example.com", "password123").await);
    let session = h.settled().await;

    assert!(is_user(&session, &identity));
    assert_eq!(session.role(), Some(Role::Civilian));
}

#[tokio::test]
async fn logout_when_logged_out_only_notifies() {
    let h = Harness::start(InMemoryIdentityProvider::new(), InMemoryProfileStore::new());
    let before = h.settled().await;

    h.controller.logout().await;
    assert_eq!(h.notifier.titles(), vec!["Logged out"]);
    h.controller.logout().await;
    assert_eq!(h.notifier.titles(), vec!["Logged out", "Logged out"]);

    let after = h.settled().await;
    assert_eq!(before, after);
}

#[tokio::test]
async fn token_refresh_does_not_refetch_profile() {
    let h = Harness::start(InMemoryIdentityProvider::new(), InMemoryProfileStore::new());
    let identity = h.provider.seed_account("civilian@example.com", "password123");
    h.store.insert_for(&identity, Role::Civilian);
    h.settled().await;
    assert!(h.controller.login("civilian@example.com", "password123").await);
    let before = h.until(|s| s.profile_status == Some(ProfileStatus::Ready)).await;

    let event = h.provider.refresh_token().expect("signed in");
    let token = event.credentials.map(|c| c.access_token);
    let after = h
        .until(|s| s.credentials.as_ref().map(|c| c.access_token.clone()) == token)
        .await;

    sleep(Duration::from_millis(20)).await;
    assert_eq!(h.store.fetch_calls(), 1);
    assert_eq!(before.profile, after.profile);
    assert_eq!(h.controller.role(), Some(Role::Civilian));
}

#[tokio::test]
async fn unknown_stored_role_grants_no_restricted_access() {
    let h = Harness::start(InMemoryIdentityProvider::new(), InMemoryProfileStore::new());
    let identity = h.provider.seed_account("odd@example.com", "password123");
    h.store.insert_with_raw_role(&identity, "superuser");
    h.settled().await;

    assert!(h.controller.login("odd@example.com", "password123").await);
    let session = h.until(|s| s.profile_status == Some(ProfileStatus::Ready)).await;

    assert!(session.profile.is_some());
    assert_eq!(session.role(), None);
    for required in Role::ALL {
        assert_eq!(h.controller.check(Some(required)), Decision::RedirectToHome { required });
    }
    assert_eq!(h.controller.check(None), Decision::Allow);
}

#[tokio::test]
async fn create_race_is_benign_and_refetches() {
    let h = Harness::start(InMemoryIdentityProvider::new(), InMemoryProfileStore::new());
    let identity = h.provider.seed_account("racer@example.com", "password123");
    h.store.race_next_create();
    h.settled().await;

    assert!(h.controller.login("racer@example.com", "password123").await);
    let session = h
        .until(|s| is_user(s, &identity) && s.profile_status == Some(ProfileStatus::Ready))
        .await;

    assert_eq!(session.role(), Some(Role::Civilian));
    assert_eq!(h.store.create_calls(), 1);
    assert_eq!(h.store.fetch_calls(), 2);
    assert_eq!(h.notifier.titles(), vec!["Success"]);
}

#[tokio::test]
async fn fetch_failure_leaves_profile_absent_without_notifying() {
    let h = Harness::start(InMemoryIdentityProvider::new(), InMemoryProfileStore::new());
    let identity = h.provider.seed_account("civilian@example.com", "password123");
    h.store.insert_for(&identity, Role::Civilian);
    h.store.fail_next_fetch();
    h.settled().await;

    assert!(h.controller.login("civilian@example.com", "password123").await);
    let session = h.until(|s| s.profile_status == Some(ProfileStatus::Failed)).await;

    assert!(session.profile.is_none());
    assert_eq!(session.role(), None);
    assert_eq!(h.store.create_calls(), 0);
    assert_eq!(h.notifier.titles(), vec!["Success"]);
}

#[tokio::test]
async fn restored_session_keeps_loading_until_profile_arrives() {
    let provider = InMemoryIdentityProvider::new();
    let identity = provider.seed_account("police@example.com", "password123");
    provider.restore_session(&identity);
    let store = InMemoryProfileStore::new();
    store.insert_for(&identity, Role::Police);
    store.hold(identity.id);

    let h = Harness::start(provider, store);
    let store = h.store.clone();
    eventually(move || store.fetch_calls() == 1).await;

    let session = h.controller.session();
    assert!(session.is_loading);
    assert!(is_user(&session, &identity));
    assert_eq!(h.controller.check(Some(Role::Police)), Decision::ShowLoading);

    h.store.release(identity.id);
    let session = h.settled().await;
    assert!(!session.is_loading);
    assert_eq!(session.role(), Some(Role::Police));
    assert!(h.notifier.all().is_empty());
}

#[tokio::test]
async fn menu_follows_login_and_logout() {
    let h = Harness::start(InMemoryIdentityProvider::new(), InMemoryProfileStore::new());
    let identity = h.provider.seed_account("police@example.com", "password123");
    h.store.insert_for(&identity, Role::Police);
    h.settled().await;

    let mut menu = Menu::new(h.controller.subscribe());
    let titles = |menu: &Menu| menu.items().iter().map(|i| i.title).collect::<Vec<_>>();
    assert_eq!(titles(&menu), vec!["Home", "Police Stations"]);
    assert_eq!(menu.user_label(), None);

    assert!(h.controller.login("police@example.com", "password123").await);
    while !menu.items().iter().any(|i| i.href == "/civilian-database") {
        assert!(timeout(WAIT, menu.changed()).await.expect("menu never updated"));
    }
    assert_eq!(
        titles(&menu),
        vec!["Home", "Police Stations", "Civilian Database", "Criminal Database"]
    );
    assert_eq!(menu.user_label().as_deref(), Some("police"));

    h.controller.logout().await;
    assert_eq!(titles(&menu), vec!["Home", "Police Stations"]);
}

#[tokio::test]
async fn update_display_name_refreshes_session() {
    let h = Harness::start(InMemoryIdentityProvider::new(), InMemoryProfileStore::new());
    let identity = h.provider.seed_account("civilian@example.com", "password123");
    h.store.insert_for(&identity, Role::Civilian);
    h.settled().await;
    assert!(h.controller.login("civilian@example.com", "password123").await);
    h.until(|s| s.profile_status == Some(ProfileStatus::Ready)).await;

    assert!(h.controller.update_display_name("  Jane Doe ").await);
    assert_eq!(
        h.controller.profile().and_then(|p| p.display_name).as_deref(),
        Some("Jane Doe")
    );
    assert!(!h.controller.update_display_name("   ").await);
    assert_eq!(h.notifier.titles(), vec!["Success", "Profile updated", "Update failed"]);
}

#[tokio::test]
async fn dropping_the_controller_unsubscribes() {
    let provider = Arc::new(InMemoryIdentityProvider::new());
    let controller = SessionController::start(
        provider.clone(),
        Arc::new(InMemoryProfileStore::new()),
        Arc::new(RecordingNotifier::new()),
    );
    timeout(WAIT, controller.settled()).await.expect("settle");
    assert_eq!(provider.subscriber_count(), 1);

    drop(controller);
    sleep(Duration::from_millis(20)).await;
    // The pump exits on the next event it cannot deliver.
    provider.emit(IdentityEventKind::UserUpdated, None);
    sleep(Duration::from_millis(20)).await;
    provider.emit(IdentityEventKind::UserUpdated, None);
    assert_eq!(provider.subscriber_count(), 0);
}

#[derive(Debug, Clone)]
enum Step {
    SignIn(usize),
    SignOut,
    Refresh,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (0usize..3).prop_map(Step::SignIn),
        1 => Just(Step::SignOut),
        1 => Just(Step::Refresh),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn final_role_matches_latest_identity(steps in prop::collection::vec(step(), 1..8)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");

        runtime.block_on(async {
            let roles = [Some(Role::Police), Some(Role::Civilian), None];
            let h = Harness::start(InMemoryIdentityProvider::new(), InMemoryProfileStore::new());
            let users: Vec<Identity> = roles
                .iter()
                .enumerate()
                .map(|(i, role)| {
                    let identity = h.provider.seed_account(&format!("user{i}@example.com"), "password123");
                    if let Some(role) = role {
                        h.store.insert_for(&identity, *role);
                    }
                    identity
                })
                .collect();

            let mut expected: Option<usize> = None;
            for step in &steps {
                match step {
                    Step::SignIn(i) => {
                        h.provider.emit(IdentityEventKind::SignedIn, Some(users[*i].clone()));
                        expected = Some(*i);
                    }
                    Step::SignOut => {
                        h.provider.emit(IdentityEventKind::SignedOut, None);
                        expected = None;
                    }
                    Step::Refresh => {
                        h.provider.refresh_token();
                    }
                }
            }

            let expected_id = expected.map(|i| users[i].id);
            let session = h
                .until(|s| s.is_settled() && s.identity.as_ref().map(|i| i.id) == expected_id)
                .await;

            // Users without a stored profile get the civilian default.
            let expected_role = expected.map(|i| roles[i].unwrap_or(Role::Civilian));
            assert_eq!(session.role(), expected_role);
            assert!(h.notifier.all().is_empty());
        });
    }
}
