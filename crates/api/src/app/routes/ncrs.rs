use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::{get, post},
    Router,
};
use chrono::Utc;

use ironbooks_auth::permissions::catalog;
use ironbooks_payables::{Vendor, VendorId};
use ironbooks_quality::ncr::{
    CancelNcr, CloseNcr, RaiseNcr, RecordDisposition, StartInvestigation,
};
use ironbooks_quality::{Ncr, NcrCommand, NcrId};

use crate::app::dto::{self, Committed, IdPath, ListResponse};
use crate::app::errors::{self, ApiError, ApiResult};
use crate::app::extract::AppJson;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(raise).get(list))
        .route("/:id", get(get_one))
        .route("/:id/investigate", post(start_investigation))
        .route("/:id/disposition", post(record_disposition))
        .route("/:id/close", post(close))
        .route("/:id/cancel", post(cancel))
}

pub async fn raise(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    AppJson(body): AppJson<dto::RaiseNcrRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::QUALITY_WRITE)?;

    let vendor_id = match body.vendor_id.as_deref() {
        Some(raw) => {
            let vendor_id: VendorId = dto::parse_id(raw, "vendor")?;
            let known = services
                .load(tenant.tenant_id(), vendor_id.aggregate_id(), |id| {
                    Vendor::empty(VendorId::from(id))
                })
                .await?
                .is_some();
            if !known {
                return Err(ApiError::invariant(format!("vendor {vendor_id} does not exist")));
            }
            Some(vendor_id.aggregate_id())
        }
        None => None,
    };

    let id = NcrId::generate();
    let cmd = NcrCommand::Raise(RaiseNcr {
        tenant_id: tenant.tenant_id(),
        title: body.title,
        description: body.description,
        severity: body.severity,
        source: body.source,
        sku: body.sku,
        vendor_id,
        quantity_affected: body.quantity_affected,
        raised_by: principal.user_id(),
        occurred_at: Utc::now(),
    });
    let committed = dispatch_ncr(&services, &tenant, id, cmd).await?;
    errors::created(Committed::new(id, &committed))
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::QUALITY_READ)?;
    errors::ok(ListResponse::from(
        services.read_models().ncrs.list(tenant.tenant_id()),
    ))
}

pub async fn get_one(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::QUALITY_READ)?;
    let id: NcrId = dto::parse_id(&path.id, "ncr")?;

    match services.read_models().ncrs.get(tenant.tenant_id(), id) {
        Some(view) => errors::ok(view),
        None => Err(ApiError::not_found("ncr")),
    }
}

pub async fn start_investigation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
    body: Option<AppJson<dto::InvestigateRequest>>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::QUALITY_WRITE)?;
    let id: NcrId = dto::parse_id(&path.id, "ncr")?;
    let body = body.map(|AppJson(b)| b).unwrap_or_default();

    let cmd = NcrCommand::StartInvestigation(StartInvestigation {
        tenant_id: tenant.tenant_id(),
        assignee: body.assignee.unwrap_or_else(|| principal.user_id()),
        occurred_at: Utc::now(),
    });
    let committed = dispatch_ncr(&services, &tenant, id, cmd).await?;
    errors::ok(Committed::new(id, &committed))
}

pub async fn record_disposition(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
    AppJson(body): AppJson<dto::DispositionRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::QUALITY_WRITE)?;
    let id: NcrId = dto::parse_id(&path.id, "ncr")?;

    let cmd = NcrCommand::RecordDisposition(RecordDisposition {
        tenant_id: tenant.tenant_id(),
        disposition: body.disposition,
        notes: body.notes,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_ncr(&services, &tenant, id, cmd).await?;
    errors::ok(Committed::new(id, &committed))
}

pub async fn close(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::QUALITY_WRITE)?;
    let id: NcrId = dto::parse_id(&path.id, "ncr")?;

    let cmd = NcrCommand::Close(CloseNcr {
        tenant_id: tenant.tenant_id(),
        occurred_at: Utc::now(),
    });
    let committed = dispatch_ncr(&services, &tenant, id, cmd).await?;
    errors::ok(Committed::new(id, &committed))
}

pub async fn cancel(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
    AppJson(body): AppJson<dto::RequiredReasonRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::QUALITY_WRITE)?;
    let id: NcrId = dto::parse_id(&path.id, "ncr")?;

    let cmd = NcrCommand::Cancel(CancelNcr {
        tenant_id: tenant.tenant_id(),
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_ncr(&services, &tenant, id, cmd).await?;
    errors::ok(Committed::new(id, &committed))
}

pub(crate) async fn dispatch_ncr(
    services: &AppServices,
    tenant: &TenantContext,
    id: NcrId,
    cmd: NcrCommand,
) -> Result<Vec<ironbooks_infra::event_store::StoredEvent>, ApiError> {
    Ok(services
        .dispatch(tenant.tenant_id(), id.aggregate_id(), cmd, |agg| {
            Ncr::empty(NcrId::from(agg))
        })
        .await?)
}

pub(crate) async fn load_ncr(
    services: &AppServices,
    tenant: &TenantContext,
    id: NcrId,
) -> Result<Option<Ncr>, ApiError> {
    Ok(services
        .load(tenant.tenant_id(), id.aggregate_id(), |agg| {
            Ncr::empty(NcrId::from(agg))
        })
        .await?)
}
