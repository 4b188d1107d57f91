use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::{get, post},
    Router,
};
use chrono::Utc;

use ironbooks_auth::permissions::catalog;
use ironbooks_costing::standard_cost::{EstablishStandardCost, UpdateDescription};
use ironbooks_costing::{StandardCost, StandardCostCommand, StandardCostId};

use crate::app::dto::{self, Committed, IdPath, ListResponse};
use crate::app::errors::{self, ApiError, ApiResult};
use crate::app::extract::AppJson;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(establish).get(list))
        .route("/:id", get(get_one).patch(update_description))
}

pub async fn establish(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    AppJson(body): AppJson<dto::EstablishStandardCostRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::COSTING_WRITE)?;

    if services
        .read_models()
        .standard_costs
        .find_by_sku(tenant.tenant_id(), body.sku.trim())
        .is_some()
    {
        return Err(ApiError::conflict(format!(
            "a standard cost for sku '{}' already exists",
            body.sku.trim()
        )));
    }

    let id = StandardCostId::generate();
    let cmd = StandardCostCommand::Establish(EstablishStandardCost {
        tenant_id: tenant.tenant_id(),
        sku: body.sku,
        description: body.description,
        unit_cost: body.unit_cost,
        effective_from: body.effective_from,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_standard_cost(&services, &tenant, id, cmd).await?;
    errors::created(Committed::new(id, &committed))
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::COSTING_READ)?;
    errors::ok(ListResponse::from(
        services.read_models().standard_costs.list(tenant.tenant_id()),
    ))
}

pub async fn get_one(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::COSTING_READ)?;
    let id: StandardCostId = dto::parse_id(&path.id, "standard cost")?;

    match services.read_models().standard_costs.get(tenant.tenant_id(), id) {
        Some(view) => errors::ok(view),
        None => Err(ApiError::not_found("standard cost")),
    }
}

pub async fn update_description(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
    AppJson(body): AppJson<dto::UpdateDescriptionRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::COSTING_WRITE)?;
    let id: StandardCostId = dto::parse_id(&path.id, "standard cost")?;

    let cmd = StandardCostCommand::UpdateDescription(UpdateDescription {
        tenant_id: tenant.tenant_id(),
        description: body.description,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_standard_cost(&services, &tenant, id, cmd).await?;
    errors::ok(Committed::new(id, &committed))
}

pub(crate) async fn dispatch_standard_cost(
    services: &AppServices,
    tenant: &TenantContext,
    id: StandardCostId,
    cmd: StandardCostCommand,
) -> Result<Vec<ironbooks_infra::event_store::StoredEvent>, ApiError> {
    Ok(services
        .dispatch(tenant.tenant_id(), id.aggregate_id(), cmd, |agg| {
            StandardCost::empty(StandardCostId::from(agg))
        })
        .await?)
}

pub(crate) async fn load_standard_cost(
    services: &AppServices,
    tenant: &TenantContext,
    id: StandardCostId,
) -> Result<StandardCost, ApiError> {
    services
        .load(tenant.tenant_id(), id.aggregate_id(), |agg| {
            StandardCost::empty(StandardCostId::from(agg))
        })
        .await?
        .ok_or_else(|| ApiError::not_found("standard cost"))
}
