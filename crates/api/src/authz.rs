//! API-side authorization guard.
//!
//! Checked in each handler before any read or dispatch; domain aggregates and
//! infra stay auth-agnostic.

use ironbooks_auth::{Permission, Principal, TenantMembership, authorize, permissions_for_roles};

use crate::app::errors::ApiError;
use crate::context::{PrincipalContext, TenantContext};

/// Fail with `403 forbidden` unless the caller holds `required` in the request tenant.
pub fn require(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    required: &Permission,
) -> Result<(), ApiError> {
    let principal = Principal {
        principal_id: principal.principal_id(),
        active_tenant_id: tenant.tenant_id(),
        membership: TenantMembership {
            tenant_id: tenant.tenant_id(),
            roles: principal.roles().to_vec(),
            permissions: permissions_for_roles(principal.roles()),
        },
    };

    authorize(&principal, required)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use ironbooks_auth::permissions::catalog;
    use ironbooks_auth::{PrincipalId, Role};
    use ironbooks_core::TenantId;

    use super::*;

    fn ctx(roles: &[&'static str]) -> (TenantContext, PrincipalContext) {
        (
            TenantContext::new(TenantId::new()),
            PrincipalContext::new(PrincipalId::new(), roles.iter().map(|r| Role::new(*r)).collect()),
        )
    }

    #[test]
    fn clerk_cannot_approve_bills() {
        let (tenant, principal) = ctx(&["ap_clerk"]);
        assert!(require(&tenant, &principal, &catalog::BILLS_WRITE).is_ok());
        assert!(matches!(
            require(&tenant, &principal, &catalog::BILLS_APPROVE),
            Err(ApiError::Forbidden(_))
        ));
    }

    #[test]
    fn roles_combine() {
        let (tenant, principal) = ctx(&["ap_clerk", "quality_manager"]);
        assert!(require(&tenant, &principal, &catalog::QUALITY_WRITE).is_ok());
        assert!(require(&tenant, &principal, &catalog::VENDORS_WRITE).is_ok());
    }
}
