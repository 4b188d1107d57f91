use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::{get, post},
    Router,
};
use chrono::Utc;

use ironbooks_auth::permissions::catalog;
use ironbooks_payables::{
    DeactivateVendor, ReactivateVendor, RegisterVendor, UpdateVendor, Vendor, VendorCommand,
    VendorId, VendorStatus,
};

use crate::app::dto::{self, Committed, IdPath, ListResponse};
use crate::app::errors::{self, ApiError, ApiResult};
use crate::app::extract::AppJson;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{OrgContext, PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_vendor).get(list_vendors))
        .route("/:id", get(get_vendor).patch(update_vendor))
        .route("/:id/deactivate", post(deactivate_vendor))
        .route("/:id/reactivate", post(reactivate_vendor))
}

pub async fn register_vendor(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(org): Extension<OrgContext>,
    AppJson(body): AppJson<dto::RegisterVendorRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::VENDORS_WRITE)?;

    if services
        .read_models()
        .vendors
        .find_by_code(tenant.tenant_id(), body.code.trim())
        .is_some()
    {
        return Err(ApiError::conflict(format!(
            "vendor code '{}' is already in use",
            body.code.trim()
        )));
    }

    let vendor_id = VendorId::generate();
    let cmd = VendorCommand::Register(RegisterVendor {
        tenant_id: tenant.tenant_id(),
        code: body.code,
        name: body.name,
        contact: body.contact,
        default_terms: body.default_terms.unwrap_or_default(),
        currency: body
            .currency
            .unwrap_or_else(|| org.organization().base_currency.to_string()),
        occurred_at: Utc::now(),
    });

    let committed = services
        .dispatch(tenant.tenant_id(), vendor_id.aggregate_id(), cmd, |id| {
            Vendor::empty(VendorId::from(id))
        })
        .await?;

    errors::created(Committed::new(vendor_id, &committed))
}

pub async fn list_vendors(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::VENDORS_READ)?;
    errors::ok(ListResponse::from(
        services.read_models().vendors.list(tenant.tenant_id()),
    ))
}

pub async fn get_vendor(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::VENDORS_READ)?;
    let vendor_id: VendorId = dto::parse_id(&path.id, "vendor")?;

    match services.read_models().vendors.get(tenant.tenant_id(), vendor_id) {
        Some(vendor) => errors::ok(vendor),
        None => Err(ApiError::not_found("vendor")),
    }
}

pub async fn update_vendor(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
    AppJson(body): AppJson<dto::UpdateVendorRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::VENDORS_WRITE)?;
    let vendor_id: VendorId = dto::parse_id(&path.id, "vendor")?;

    let cmd = VendorCommand::Update(UpdateVendor {
        tenant_id: tenant.tenant_id(),
        name: body.name,
        contact: body.contact,
        default_terms: body.default_terms,
        occurred_at: Utc::now(),
    });
    dispatch_vendor(&services, &tenant, vendor_id, cmd).await
}

pub async fn deactivate_vendor(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
    body: Option<AppJson<dto::ReasonRequest>>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::VENDORS_WRITE)?;
    let vendor_id: VendorId = dto::parse_id(&path.id, "vendor")?;
    let body = body.map(|AppJson(b)| b).unwrap_or_default();

    let cmd = VendorCommand::Deactivate(DeactivateVendor {
        tenant_id: tenant.tenant_id(),
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    dispatch_vendor(&services, &tenant, vendor_id, cmd).await
}

pub async fn reactivate_vendor(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::VENDORS_WRITE)?;
    let vendor_id: VendorId = dto::parse_id(&path.id, "vendor")?;

    let cmd = VendorCommand::Reactivate(ReactivateVendor {
        tenant_id: tenant.tenant_id(),
        occurred_at: Utc::now(),
    });
    dispatch_vendor(&services, &tenant, vendor_id, cmd).await
}

async fn dispatch_vendor(
    services: &AppServices,
    tenant: &TenantContext,
    vendor_id: VendorId,
    cmd: VendorCommand,
) -> ApiResult {
    let committed = services
        .dispatch(tenant.tenant_id(), vendor_id.aggregate_id(), cmd, |id| {
            Vendor::empty(VendorId::from(id))
        })
        .await?;
    errors::ok(Committed::new(vendor_id, &committed))
}

/// Load a vendor that may take new bills or payments.
pub(crate) async fn active_vendor(
    services: &AppServices,
    tenant: &TenantContext,
    vendor_id: VendorId,
) -> Result<Vendor, ApiError> {
    let vendor = services
        .load(tenant.tenant_id(), vendor_id.aggregate_id(), |id| {
            Vendor::empty(VendorId::from(id))
        })
        .await?
        .ok_or_else(|| ApiError::invariant(format!("vendor {vendor_id} does not exist")))?;

    if vendor.status() != VendorStatus::Active {
        return Err(ApiError::invariant(format!("vendor {vendor_id} is inactive")));
    }
    Ok(vendor)
}
