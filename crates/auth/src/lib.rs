//! `precinct-auth` — session and authorization core.
//!
//! Establishes who the user is (identity provider boundary), loads the
//! authoritative role/profile record (profile store boundary), exposes the
//! resulting [`Session`] reactively, and gates role-restricted views.
//!
//! This crate is decoupled from HTTP and storage; adapters live in
//! `precinct-infra`, test/dev doubles in [`in_memory`].

pub mod controller;
pub mod gate;
pub mod identity;
pub mod in_memory;
pub mod navigation;
pub mod notify;
pub mod profile;
pub mod roles;
pub mod session;

pub use controller::SessionController;
pub use gate::{Decision, decide, guard};
pub use identity::{
    AuthError, Credentials, Identity, IdentityEvent, IdentityEventKind, IdentityHub,
    IdentityMetadata, IdentityProvider, IdentitySnapshot, SignUpAttributes, SignUpOutcome,
    Subscription,
};
pub use navigation::{Menu, NAV_ITEMS, NavItem, ROUTES, Route, display_name_for, route_for, visible_items};
pub use notify::{Notification, Notifier, Severity, TracingNotifier};
pub use profile::{Profile, ProfilePatch, ProfileStore, StoreError, default_display_name};
pub use roles::{Role, StoredRole};
pub use session::{ProfileStatus, Session, SessionPhase};
