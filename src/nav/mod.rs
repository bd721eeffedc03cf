use serde::Serialize;

use crate::types::RoleFlags;

/// Sidebar entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NavEntry {
    pub label: &'static str,
    pub route: &'static str,
}

const fn entry(label: &'static str, route: &'static str) -> NavEntry {
    NavEntry { label, route }
}

/// Visible to every signed-in role, and the only entries while the role is unresolved
const COMMON: &[NavEntry] = &[entry("Dashboard", "/"), entry("Settings", "/settings")];

const ADMIN: &[NavEntry] = &[
    entry("Dashboard", "/"),
    entry("Settings", "/settings"),
    entry("Landlords", "/landlords"),
    entry("All Tenants", "/tenants"),
    entry("Properties", "/properties"),
    entry("Analytics", "/analytics"),
    entry("Admin Panel", "/admin"),
];

const LANDLORD: &[NavEntry] = &[
    entry("Dashboard", "/"),
    entry("Settings", "/settings"),
    entry("Properties", "/properties"),
    entry("Tenants", "/tenants"),
    entry("Upload Data", "/upload"),
    entry("Analytics", "/analytics"),
];

const TENANT: &[NavEntry] = &[
    entry("Dashboard", "/"),
    entry("Settings", "/settings"),
    entry("Payments", "/payments"),
];

pub fn nav_entries(flags: RoleFlags) -> &'static [NavEntry] {
    if flags.is_admin {
        ADMIN
    } else if flags.is_landlord {
        LANDLORD
    } else if flags.is_tenant {
        TENANT
    } else {
        COMMON
    }
}

/// Footer card describing the portal the user is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortalBadge {
    pub title: &'static str,
    pub subtitle: &'static str,
}

pub fn portal_badge(flags: RoleFlags) -> PortalBadge {
    if flags.is_landlord {
        PortalBadge {
            title: "Subscription",
            subtitle: "$20 per tenant",
        }
    } else if flags.is_admin {
        PortalBadge {
            title: "Admin Access",
            subtitle: "Full system access",
        }
    } else {
        PortalBadge {
            title: "Tenant Portal",
            subtitle: "View your rental details",
        }
    }
}
