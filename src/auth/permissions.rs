//! Permission model.
//!
//! Grants are strings: an exact permission (`expense:read`), a resource
//! wildcard (`expense:*`) or `*`. Roles are named grant lists; five roles are
//! built in and tenants may define more.

use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Permission {
    ExpenseRead,
    ExpenseWrite,
    ExpenseDelete,
    TagRead,
    TagWrite,
    AttachmentRead,
    AttachmentWrite,
    TableRead,
    TableWrite,
    TableAdmin,
    DocumentRead,
    DocumentWrite,
    ReportRead,
    RoleManage,
}

impl Permission {
    pub const ALL: [Permission; 14] = [
        Permission::ExpenseRead,
        Permission::ExpenseWrite,
        Permission::ExpenseDelete,
        Permission::TagRead,
        Permission::TagWrite,
        Permission::AttachmentRead,
        Permission::AttachmentWrite,
        Permission::TableRead,
        Permission::TableWrite,
        Permission::TableAdmin,
        Permission::DocumentRead,
        Permission::DocumentWrite,
        Permission::ReportRead,
        Permission::RoleManage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ExpenseRead => "expense:read",
            Permission::ExpenseWrite => "expense:write",
            Permission::ExpenseDelete => "expense:delete",
            Permission::TagRead => "tag:read",
            Permission::TagWrite => "tag:write",
            Permission::AttachmentRead => "attachment:read",
            Permission::AttachmentWrite => "attachment:write",
            Permission::TableRead => "table:read",
            Permission::TableWrite => "table:write",
            Permission::TableAdmin => "table:admin",
            Permission::DocumentRead => "document:read",
            Permission::DocumentWrite => "document:write",
            Permission::ReportRead => "report:read",
            Permission::RoleManage => "role:manage",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.as_str() == s)
    }

    pub fn resource(&self) -> &'static str {
        self.as_str().split(':').next().unwrap_or_default()
    }

    pub fn action(&self) -> &'static str {
        self.as_str().split(':').nth(1).unwrap_or_default()
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Permission {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

pub type PermissionSet = BTreeSet<Permission>;

/// Permissions a single grant string stands for; `None` if it matches nothing
pub fn expand_grant(grant: &str) -> Option<Vec<Permission>> {
    let grant = grant.trim();
    if grant == "*" {
        return Some(Permission::ALL.to_vec());
    }
    if let Some(resource) = grant.strip_suffix(":*") {
        let matched: Vec<Permission> = Permission::ALL
            .iter()
            .copied()
            .filter(|p| p.resource() == resource)
            .collect();
        return if matched.is_empty() { None } else { Some(matched) };
    }
    Permission::parse(grant).map(|p| vec![p])
}

/// Union of every grant; unknown grants are skipped
pub fn expand_grants<I, S>(grants: I) -> PermissionSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    grants
        .into_iter()
        .filter_map(|g| expand_grant(g.as_ref()))
        .flatten()
        .collect()
}

pub const BUILTIN_ROLES: [&str; 5] = ["owner", "admin", "lawyer", "staff", "viewer"];

pub fn is_builtin_role(name: &str) -> bool {
    BUILTIN_ROLES.iter().any(|r| r.eq_ignore_ascii_case(name))
}

/// Grants of a built-in role
pub fn builtin_grants(name: &str) -> Option<Vec<&'static str>> {
    let grants = match name.to_ascii_lowercase().as_str() {
        "owner" => vec!["*"],
        "admin" => Permission::ALL.iter().map(Permission::as_str).collect(),
        "lawyer" => Permission::ALL
            .iter()
            .filter(|p| !matches!(p, Permission::RoleManage | Permission::TableAdmin))
            .map(Permission::as_str)
            .collect(),
        "staff" => vec![
            "expense:read",
            "expense:write",
            "tag:read",
            "tag:write",
            "attachment:read",
            "attachment:write",
            "document:read",
            "document:write",
            "table:read",
            "report:read",
        ],
        "viewer" => Permission::ALL
            .iter()
            .filter(|p| p.action() == "read")
            .map(Permission::as_str)
            .collect(),
        _ => return None,
    };
    Some(grants)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards_expand() {
        assert_eq!(expand_grant("*").map(|v| v.len()), Some(Permission::ALL.len()));
        assert_eq!(
            expand_grant("expense:*"),
            Some(vec![Permission::ExpenseRead, Permission::ExpenseWrite, Permission::ExpenseDelete])
        );
        assert_eq!(expand_grant("invoice:*"), None);
        assert_eq!(expand_grant("expense:approve"), None);
    }

    #[test]
    fn builtin_roles() {
        let lawyer = expand_grants(builtin_grants("lawyer").unwrap());
        assert!(lawyer.contains(&Permission::ExpenseDelete));
        assert!(!lawyer.contains(&Permission::RoleManage));
        assert!(!lawyer.contains(&Permission::TableAdmin));

        let staff = expand_grants(builtin_grants("Staff").unwrap());
        assert!(staff.contains(&Permission::ExpenseWrite));
        assert!(!staff.contains(&Permission::ExpenseDelete));
        assert!(!staff.contains(&Permission::TableWrite));

        let viewer = expand_grants(builtin_grants("viewer").unwrap());
        assert!(viewer.iter().all(|p| p.action() == "read"));
        assert!(viewer.contains(&Permission::ReportRead));

        assert_eq!(expand_grants(builtin_grants("owner").unwrap()).len(), Permission::ALL.len());
        assert!(builtin_grants("partner").is_none());
    }

    #[test]
    fn serializes_as_string() {
        let set: PermissionSet = [Permission::TagRead, Permission::ExpenseRead].into_iter().collect();
        assert_eq!(serde_json::to_value(&set).unwrap(), serde_json::json!(["expense:read", "tag:read"]));
    }
}
