use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::{get, post},
    Router,
};
use chrono::Utc;

use ironbooks_auth::permissions::catalog;
use ironbooks_costing::variance::{AcknowledgeVariance, DEFAULT_THRESHOLD_BPS, RecordVariance};
use ironbooks_costing::{CostVariance, CostVarianceCommand, CostVarianceId, VarianceInputs};
use ironbooks_infra::projections::costing::VarianceFilter;

use crate::app::dto::{self, Committed, IdPath, ListResponse};
use crate::app::errors::{self, ApiError, ApiResult};
use crate::app::extract::{AppJson, AppQuery};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(record).get(list))
        .route("/:id", get(get_one))
        .route("/:id/acknowledge", post(acknowledge))
}

/// Record a variance. Without an explicit standard unit cost the SKU's
/// current standard cost is used.
pub async fn record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    AppJson(body): AppJson<dto::RecordVarianceRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::COSTING_WRITE)?;

    let standard_unit_cost = match body.standard_unit_cost {
        Some(cost) => cost,
        None => services
            .read_models()
            .standard_costs
            .find_by_sku(tenant.tenant_id(), body.sku.trim())
            .map(|view| view.unit_cost)
            .ok_or_else(|| {
                ApiError::invariant(format!(
                    "no standard cost for sku '{}'; pass standard_unit_cost",
                    body.sku.trim()
                ))
            })?,
    };

    let id = CostVarianceId::generate();
    let cmd = CostVarianceCommand::Record(RecordVariance {
        tenant_id: tenant.tenant_id(),
        sku: body.sku,
        source: body.source,
        inputs: VarianceInputs {
            standard_unit_cost,
            actual_unit_cost: body.actual_unit_cost,
            standard_quantity: body.standard_quantity,
            actual_quantity: body.actual_quantity,
            threshold_bps: body.threshold_bps.unwrap_or(DEFAULT_THRESHOLD_BPS),
        },
        occurred_at: Utc::now(),
    });
    let committed = dispatch_variance(&services, &tenant, id, cmd).await?;
    errors::created(Committed::new(id, &committed))
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    AppQuery(query): AppQuery<dto::VarianceListQuery>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::COSTING_READ)?;
    let filter = VarianceFilter {
        direction: query.direction,
        significant: query.significant,
        sku: query.sku,
    };
    errors::ok(ListResponse::from(
        services.read_models().variances.list(tenant.tenant_id(), &filter),
    ))
}

pub async fn get_one(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::COSTING_READ)?;
    let id: CostVarianceId = dto::parse_id(&path.id, "variance")?;

    match services.read_models().variances.get(tenant.tenant_id(), id) {
        Some(view) => errors::ok(view),
        None => Err(ApiError::not_found("variance")),
    }
}

pub async fn acknowledge(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
    AppJson(body): AppJson<dto::AcknowledgeVarianceRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::COSTING_WRITE)?;
    let id: CostVarianceId = dto::parse_id(&path.id, "variance")?;

    let cmd = CostVarianceCommand::Acknowledge(AcknowledgeVariance {
        tenant_id: tenant.tenant_id(),
        note: body.note,
        acknowledged_by: principal.user_id(),
        occurred_at: Utc::now(),
    });
    let committed = dispatch_variance(&services, &tenant, id, cmd).await?;
    errors::ok(Committed::new(id, &committed))
}

async fn dispatch_variance(
    services: &AppServices,
    tenant: &TenantContext,
    id: CostVarianceId,
    cmd: CostVarianceCommand,
) -> Result<Vec<ironbooks_infra::event_store::StoredEvent>, ApiError> {
    Ok(services
        .dispatch(tenant.tenant_id(), id.aggregate_id(), cmd, |agg| {
            CostVariance::empty(CostVarianceId::from(agg))
        })
        .await?)
}
