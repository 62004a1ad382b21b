use serde::Serialize;
use uuid::Uuid;

use super::permissions::{Permission, PermissionSet};
use crate::error::ApiError;

/// Authenticated caller within one tenant
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    pub subject: String,
    pub tenant_id: Uuid,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub permissions: PermissionSet,
}

impl Principal {
    pub fn has(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn require(&self, permission: Permission) -> Result<(), ApiError> {
        if self.has(permission) {
            Ok(())
        } else {
            tracing::warn!(subject = %self.subject, tenant = %self.tenant_id, %permission, "Permission denied");
            Err(ApiError::forbidden(format!("Missing permission '{}'", permission)))
        }
    }
}
