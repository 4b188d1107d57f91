use std::sync::Arc;

use axum::extract::Extension;
use chrono::Utc;

use ironbooks_auth::permissions::catalog;
use ironbooks_auth::{
    Organization, OrganizationCommand, OrganizationId, RegisterOrganization, RenameOrganization,
    validate_slug,
};

use crate::app::dto::{self, Committed};
use crate::app::errors::{self, ApiError, ApiResult};
use crate::app::extract::AppJson;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{OrgContext, PrincipalContext, TenantContext};

/// Register the caller's tenant as an organization. One per tenant; slugs are
/// globally unique.
pub async fn create_org(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    AppJson(body): AppJson<dto::CreateOrganizationRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::ORGS_CREATE)?;
    let slug = validate_slug(&body.slug)?;

    let directory = &services.read_models().organizations;
    if directory.for_tenant(tenant.tenant_id()).is_some() {
        return Err(ApiError::conflict("tenant already has an organization"));
    }
    if directory.slug_taken(&slug) {
        return Err(ApiError::conflict(format!("slug '{slug}' is already taken")));
    }

    let org_id = OrganizationId::for_tenant(tenant.tenant_id());
    let cmd = OrganizationCommand::Register(RegisterOrganization {
        tenant_id: tenant.tenant_id(),
        slug,
        name: body.name,
        base_currency: body.base_currency,
        registered_by: principal.user_id(),
        occurred_at: Utc::now(),
    });

    let committed = services
        .dispatch(tenant.tenant_id(), org_id.aggregate_id(), cmd, |id| {
            Organization::empty(OrganizationId::from(id))
        })
        .await?;

    errors::created(Committed::new(org_id, &committed))
}

pub async fn get_org(Extension(org): Extension<OrgContext>) -> ApiResult {
    errors::ok(org.organization())
}

pub async fn rename_org(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(org): Extension<OrgContext>,
    AppJson(body): AppJson<dto::RenameRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::ORGS_WRITE)?;
    let org_id = org.organization().organization_id;

    let cmd = OrganizationCommand::Rename(RenameOrganization {
        tenant_id: tenant.tenant_id(),
        name: body.name,
        occurred_at: Utc::now(),
    });
    let committed = services
        .dispatch(tenant.tenant_id(), org_id.aggregate_id(), cmd, |id| {
            Organization::empty(OrganizationId::from(id))
        })
        .await?;

    errors::ok(Committed::new(org_id, &committed))
}
