use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// `aud` may be a single string or an array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::One(a) => a == audience,
            Audience::Many(list) => list.iter().any(|a| a == audience),
        }
    }
}

/// Access token claims. Tenant, roles and email arrive as namespaced custom
/// claims (`https://legalops.app/tenant_id`) and are kept in `custom`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

impl Claims {
    fn namespaced<'a>(&'a self, namespace: &str, name: &str) -> Option<&'a Value> {
        self.custom.get(&format!("{}{}", namespace, name))
    }

    pub fn tenant_id(&self, namespace: &str) -> Option<Uuid> {
        self.namespaced(namespace, "tenant_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    pub fn roles(&self, namespace: &str) -> Vec<String> {
        match self.namespaced(namespace, "roles") {
            Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => vec![],
        }
    }

    pub fn email(&self, namespace: &str) -> Option<String> {
        self.namespaced(namespace, "email").and_then(Value::as_str).map(str::to_string)
    }

    /// Permissions from the RBAC `permissions` array plus space-separated scopes
    /// that look like permissions (`expense:read`)
    pub fn granted(&self) -> Vec<String> {
        let mut out = self.permissions.clone();
        if let Some(scope) = &self.scope {
            out.extend(scope.split_whitespace().filter(|s| s.contains(':')).map(str::to_string));
        }
        out
    }

    pub fn set_namespaced(&mut self, namespace: &str, name: &str, value: Value) {
        self.custom.insert(format!("{}{}", namespace, name), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NS: &str = "https://legalops.app/";

    #[test]
    fn reads_namespaced_claims() {
        let tenant = Uuid::new_v4();
        let claims: Claims = serde_json::from_value(json!({
            "sub": "auth0|42",
            "aud": ["legalops-api", "https://tenant.auth0.com/userinfo"],
            "exp": 2_000_000_000,
            "scope": "openid profile expense:read",
            "permissions": ["tag:write"],
            "https://legalops.app/tenant_id": tenant.to_string(),
            "https://legalops.app/roles": ["lawyer"],
            "https://legalops.app/email": "kim@firm.example"
        }))
        .unwrap();

        assert_eq!(claims.tenant_id(NS), Some(tenant));
        assert_eq!(claims.roles(NS), vec!["lawyer".to_string()]);
        assert_eq!(claims.email(NS).as_deref(), Some("kim@firm.example"));
        assert_eq!(claims.granted(), vec!["tag:write".to_string(), "expense:read".to_string()]);
        assert!(claims.aud.unwrap().contains("legalops-api"));
    }

    #[test]
    fn tenant_must_be_a_uuid() {
        let claims: Claims = serde_json::from_value(json!({
            "sub": "u",
            "exp": 1,
            "https://legalops.app/tenant_id": "acme"
        }))
        .unwrap();
        assert_eq!(claims.tenant_id(NS), None);
        assert!(claims.roles(NS).is_empty());
    }
}
