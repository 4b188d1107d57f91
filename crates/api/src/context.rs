use ironbooks_auth::{PrincipalId, Role};
use ironbooks_core::{TenantId, UserId};
use ironbooks_infra::projections::organizations::OrganizationView;

/// Tenant context for a request, taken from the bearer token.
///
/// This is immutable and must be present for all domain routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Principal context for a request (authenticated identity + roles).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal_id: PrincipalId,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(principal_id: PrincipalId, roles: Vec<Role>) -> Self {
        Self { principal_id, roles }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    /// Actor id recorded on domain events.
    pub fn user_id(&self) -> UserId {
        self.principal_id.as_user_id()
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }
}

/// Organization resolved from the `{slug}` path segment.
///
/// Only inserted when the organization belongs to the request's tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgContext {
    organization: OrganizationView,
}

impl OrgContext {
    pub fn new(organization: OrganizationView) -> Self {
        Self { organization }
    }

    pub fn organization(&self) -> &OrganizationView {
        &self.organization
    }

    pub fn slug(&self) -> &str {
        &self.organization.slug
    }
}
