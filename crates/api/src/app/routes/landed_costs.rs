use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use tracing::warn;

use ironbooks_accounting::{PostingSource, posting};
use ironbooks_auth::permissions::catalog;
use ironbooks_costing::landed_cost::{
    AddCharge, AllocateLandedCost, CancelLandedCost, CreateLandedCost, PostLandedCost,
};
use ironbooks_costing::{ChargeInput, LandedCost, LandedCostCommand, LandedCostId};

use crate::app::dto::{self, Committed, IdPath, ListResponse};
use crate::app::errors::{self, ApiError, ApiResult};
use crate::app::extract::AppJson;
use crate::app::services::{AppServices, JournalPosting};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create).get(list))
        .route("/:id", get(get_one))
        .route("/:id/charges", post(add_charge))
        .route("/:id/allocate", post(allocate))
        .route("/:id/post", post(post_landed_cost))
        .route("/:id/cancel", post(cancel))
}

pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    AppJson(body): AppJson<dto::CreateLandedCostRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::COSTING_WRITE)?;

    let id = LandedCostId::generate();
    let cmd = LandedCostCommand::Create(CreateLandedCost {
        tenant_id: tenant.tenant_id(),
        reference: body.reference,
        method: body.method,
        lines: body.lines,
        charges: body.charges,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_landed_cost(&services, &tenant, id, cmd).await?;
    errors::created(Committed::new(id, &committed))
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::COSTING_READ)?;
    errors::ok(ListResponse::from(
        services.read_models().landed_costs.list(tenant.tenant_id()),
    ))
}

pub async fn get_one(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::COSTING_READ)?;
    let id: LandedCostId = dto::parse_id(&path.id, "landed cost")?;

    match services.read_models().landed_costs.get(tenant.tenant_id(), id) {
        Some(view) => errors::ok(view),
        None => Err(ApiError::not_found("landed cost")),
    }
}

pub async fn add_charge(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
    AppJson(charge): AppJson<ChargeInput>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::COSTING_WRITE)?;
    let id: LandedCostId = dto::parse_id(&path.id, "landed cost")?;

    let cmd = LandedCostCommand::AddCharge(AddCharge {
        tenant_id: tenant.tenant_id(),
        charge,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_landed_cost(&services, &tenant, id, cmd).await?;
    errors::ok(Committed::new(id, &committed))
}

pub async fn allocate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::COSTING_WRITE)?;
    let id: LandedCostId = dto::parse_id(&path.id, "landed cost")?;

    let cmd = LandedCostCommand::Allocate(AllocateLandedCost {
        tenant_id: tenant.tenant_id(),
        occurred_at: Utc::now(),
    });
    let committed = dispatch_landed_cost(&services, &tenant, id, cmd).await?;
    errors::ok(Committed::new(id, &committed))
}

/// Capitalize the charges: inventory against accrued landed costs.
pub async fn post_landed_cost(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::COSTING_POST)?;
    let id: LandedCostId = dto::parse_id(&path.id, "landed cost")?;

    let cmd = LandedCostCommand::Post(PostLandedCost {
        tenant_id: tenant.tenant_id(),
        posted_by: principal.user_id(),
        occurred_at: Utc::now(),
    });
    let committed = dispatch_landed_cost(&services, &tenant, id, cmd).await?;

    let landed_cost = services
        .load(tenant.tenant_id(), id.aggregate_id(), |agg| {
            LandedCost::empty(LandedCostId::from(agg))
        })
        .await?
        .ok_or_else(|| ApiError::not_found("landed cost"))?;

    let entry_id = services
        .post_journal(
            tenant.tenant_id(),
            JournalPosting {
                lines: posting::landed_cost(landed_cost.total_charges()?),
                description: format!("Landed cost {}", landed_cost.reference()),
                source: Some(PostingSource::new("landed_cost", id.aggregate_id())),
            },
        )
        .await
        .inspect_err(|e| warn!(landed_cost_id = %id, error = %e, "landed cost posted but journal posting failed"))?;

    errors::ok(Committed::new(id, &committed).with_journal(entry_id))
}

pub async fn cancel(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
    body: Option<AppJson<dto::ReasonRequest>>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::COSTING_WRITE)?;
    let id: LandedCostId = dto::parse_id(&path.id, "landed cost")?;

    let cmd = LandedCostCommand::Cancel(CancelLandedCost {
        tenant_id: tenant.tenant_id(),
        reason: body.and_then(|AppJson(b)| b.reason),
        occurred_at: Utc::now(),
    });
    let committed = dispatch_landed_cost(&services, &tenant, id, cmd).await?;
    errors::ok(Committed::new(id, &committed))
}

async fn dispatch_landed_cost(
    services: &AppServices,
    tenant: &TenantContext,
    id: LandedCostId,
    cmd: LandedCostCommand,
) -> Result<Vec<ironbooks_infra::event_store::StoredEvent>, ApiError> {
    Ok(services
        .dispatch(tenant.tenant_id(), id.aggregate_id(), cmd, |agg| {
            LandedCost::empty(LandedCostId::from(agg))
        })
        .await?)
}
