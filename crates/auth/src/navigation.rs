//! Role-filtered navigation and route table.

use tokio::sync::watch;

use crate::{Identity, Profile, Role, Session};

/// One menu entry. An empty `roles` slice means visible to everyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavItem {
    pub title: &'static str,
    pub href: &'static str,
    pub roles: &'static [Role],
}

impl NavItem {
    pub fn is_public(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn visible_to(&self, role: Option<Role>) -> bool {
        self.is_public() || role.is_some_and(|r| self.roles.contains(&r))
    }
}

pub const NAV_ITEMS: &[NavItem] = &[
    NavItem { title: "Home", href: "/", roles: &[] },
    NavItem { title: "Police Stations", href: "/police-stations", roles: &[] },
    NavItem { title: "Civilian Database", href: "/civilian-database", roles: &[Role::Police] },
    NavItem { title: "Criminal Database", href: "/criminal-database", roles: &[Role::Police] },
    NavItem { title: "My Profile", href: "/civilian-profile", roles: &[Role::Civilian] },
    NavItem { title: "File Complaint", href: "/complaint/new", roles: &[Role::Civilian] },
];

/// Public items plus those listing `role`, in table order.
pub fn visible_items(role: Option<Role>) -> Vec<NavItem> {
    NAV_ITEMS.iter().copied().filter(|item| item.visible_to(role)).collect()
}

/// Navigation menu bound to the live session.
///
/// Items are recomputed from the current role on every read, so the menu
/// follows login, logout and late profile loads without any caching.
#[derive(Debug, Clone)]
pub struct Menu {
    session: watch::Receiver<Session>,
}

impl Menu {
    pub fn new(session: watch::Receiver<Session>) -> Self {
        Self { session }
    }

    pub fn items(&self) -> Vec<NavItem> {
        let role = self.session.borrow().role();
        visible_items(role)
    }

    /// Label for the signed-in user, if any.
    pub fn user_label(&self) -> Option<String> {
        let session = self.session.borrow();
        let identity = session.identity.as_ref()?;
        Some(display_name_for(identity, session.profile.as_ref()))
    }

    /// Wait for the next session change. Returns `false` once the
    /// controller is gone.
    pub async fn changed(&mut self) -> bool {
        self.session.changed().await.is_ok()
    }
}

/// A page and the role it requires, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub path: &'static str,
    pub required_role: Option<Role>,
}

pub const ROUTES: &[Route] = &[
    Route { path: "/", required_role: None },
    Route { path: "/login", required_role: None },
    Route { path: "/register", required_role: None },
    Route { path: "/police-stations", required_role: None },
    Route { path: "/civilian-database", required_role: Some(Role::Police) },
    Route { path: "/criminal-database", required_role: Some(Role::Police) },
    Route { path: "/civilian-profile", required_role: Some(Role::Civilian) },
    Route { path: "/complaint/new", required_role: Some(Role::Civilian) },
    Route { path: "/complaint/:officer_id", required_role: Some(Role::Civilian) },
];

/// Match `path` against [`ROUTES`]. Literal segments win over `:param`
/// segments; a trailing slash and query string are ignored.
pub fn route_for(path: &str) -> Option<&'static Route> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let segments = split_path(path);

    let exact = ROUTES.iter().find(|route| split_path(route.path) == segments);
    exact.or_else(|| {
        ROUTES.iter().find(|route| {
            let pattern = split_path(route.path);
            pattern.len() == segments.len()
                && pattern
                    .iter()
                    .zip(&segments)
                    .all(|(p, s)| p.starts_with(':') || p == s)
        })
    })
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Human label for the header: profile display name, else the capitalised
/// email local-part, else "User".
pub fn display_name_for(identity: &Identity, profile: Option<&Profile>) -> String {
    if let Some(name) = profile
        .filter(|p| p.id == identity.id)
        .and_then(|p| p.display_name.as_deref())
        .map(str::trim)
        .filter(|n| !n.is_empty())
    {
        return name.to_string();
    }

    let local = identity.email.split('@').next().unwrap_or_default().trim();
    let mut chars = local.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "User".to_string(),
    }
}
