use thiserror::Error;

use ironbooks_core::TenantId;

use crate::{JwtClaims, Permission, PrincipalId, TenantMembership, permissions_for_roles};

/// Caller resolved for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub active_tenant_id: TenantId,
    pub membership: TenantMembership,
}

impl Principal {
    /// Resolve permissions for verified claims through the built-in role policy.
    pub fn from_claims(claims: &JwtClaims) -> Self {
        Self {
            principal_id: claims.sub,
            active_tenant_id: claims.tenant_id,
            membership: TenantMembership {
                tenant_id: claims.tenant_id,
                roles: claims.roles.clone(),
                permissions: permissions_for_roles(&claims.roles),
            },
        }
    }

    pub fn has(&self, required: &Permission) -> bool {
        authorize(self, required).is_ok()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Allow when the membership belongs to the active tenant and grants either
/// `required` or the wildcard.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_tenant_id != principal.membership.tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    let granted = principal
        .membership
        .permissions
        .iter()
        .any(|p| p.is_wildcard() || p == required);

    if granted {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Role, permissions::catalog};
    use chrono::{Duration, Utc};

    fn principal_with(roles: &[&'static str]) -> Principal {
        let now = Utc::now();
        Principal::from_claims(&JwtClaims {
            sub: PrincipalId::new(),
            tenant_id: TenantId::new(),
            roles: roles.iter().map(|r| Role::new(*r)).collect(),
            issued_at: now,
            expires_at: now + Duration::hours(1),
        })
    }

    #[test]
    fn wildcard_allows_everything() {
        let admin = principal_with(&["admin"]);
        assert!(authorize(&admin, &catalog::BILLS_APPROVE).is_ok());
        assert!(authorize(&admin, &catalog::AUDIT_READ).is_ok());
    }

    #[test]
    fn missing_permission_is_forbidden() {
        let clerk = principal_with(&["ap_clerk"]);
        assert!(clerk.has(&catalog::BILLS_WRITE));
        assert_eq!(
            authorize(&clerk, &catalog::BILLS_APPROVE),
            Err(AuthzError::Forbidden("bills.approve".to_string()))
        );
    }

    #[test]
    fn membership_for_another_tenant_is_rejected() {
        let mut p = principal_with(&["admin"]);
        p.active_tenant_id = TenantId::new();
        assert_eq!(
            authorize(&p, &catalog::VENDORS_READ),
            Err(AuthzError::TenantMismatch)
        );
    }
}
