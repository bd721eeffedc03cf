use crate::types::Role;

/// Application route and its access rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteSpec {
    pub pattern: &'static str,
    pub view: &'static str,
    /// Reachable without a session
    pub public: bool,
    pub required_role: Option<Role>,
}

const fn protected(pattern: &'static str, view: &'static str) -> RouteSpec {
    RouteSpec {
        pattern,
        view,
        public: false,
        required_role: None,
    }
}

pub const ROUTES: &[RouteSpec] = &[
    RouteSpec {
        pattern: "/login",
        view: "login",
        public: true,
        required_role: None,
    },
    RouteSpec {
        pattern: "/signup",
        view: "signup",
        public: true,
        required_role: None,
    },
    protected("/", "dashboard"),
    protected("/dashboard", "dashboard"),
    protected("/properties", "properties"),
    protected("/property/:id", "property_detail"),
    protected("/upload", "upload"),
    protected("/settings", "settings"),
    protected("/analytics", "analytics"),
    protected("/tenants", "tenants"),
    protected("/payments", "payments"),
    RouteSpec {
        required_role: Some(Role::SuperAdmin),
        ..protected("/landlords", "landlords")
    },
    RouteSpec {
        required_role: Some(Role::SuperAdmin),
        ..protected("/admin", "admin_panel")
    },
];

impl RouteSpec {
    /// Segment-wise match; `:name` segments match any non-empty segment
    pub fn matches(&self, path: &str) -> bool {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let mut want = self.pattern.split('/').filter(|s| !s.is_empty());
        let mut have = path.split('/').filter(|s| !s.is_empty());

        loop {
            match (want.next(), have.next()) {
                (None, None) => return true,
                (Some(w), Some(h)) if w.starts_with(':') || w == h => continue,
                _ => return false,
            }
        }
    }
}

pub fn match_route(path: &str) -> Option<&'static RouteSpec> {
    ROUTES.iter().find(|route| route.matches(path))
}
