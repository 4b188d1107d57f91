use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::{get, post},
    Router,
};
use chrono::Utc;

use ironbooks_auth::permissions::catalog;
use ironbooks_planning::forecast::{CreateForecast, GenerateForecast, RecordActual};
use ironbooks_planning::{Forecast, ForecastCommand, ForecastId};

use crate::app::dto::{self, Committed, IdPath, ListResponse};
use crate::app::errors::{self, ApiError, ApiResult};
use crate::app::extract::AppJson;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create).get(list))
        .route("/:id", get(get_one))
        .route("/:id/actuals", post(record_actual))
        .route("/:id/generate", post(generate))
}

pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    AppJson(body): AppJson<dto::CreateForecastRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::PLANNING_WRITE)?;

    let id = ForecastId::generate();
    let cmd = ForecastCommand::Create(CreateForecast {
        tenant_id: tenant.tenant_id(),
        sku: body.sku,
        method: body.method,
        horizon: body.horizon,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_forecast(&services, &tenant, id, cmd).await?;
    errors::created(Committed::new(id, &committed))
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::PLANNING_READ)?;
    errors::ok(ListResponse::from(
        services.read_models().forecasts.list(tenant.tenant_id()),
    ))
}

pub async fn get_one(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::PLANNING_READ)?;
    let id: ForecastId = dto::parse_id(&path.id, "forecast")?;

    match services.read_models().forecasts.get(tenant.tenant_id(), id) {
        Some(view) => errors::ok(view),
        None => Err(ApiError::not_found("forecast")),
    }
}

pub async fn record_actual(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
    AppJson(body): AppJson<dto::RecordActualRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::PLANNING_WRITE)?;
    let id: ForecastId = dto::parse_id(&path.id, "forecast")?;

    let cmd = ForecastCommand::RecordActual(RecordActual {
        tenant_id: tenant.tenant_id(),
        period: body.period,
        quantity: body.quantity,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_forecast(&services, &tenant, id, cmd).await?;
    errors::ok(Committed::new(id, &committed))
}

pub async fn generate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::PLANNING_WRITE)?;
    let id: ForecastId = dto::parse_id(&path.id, "forecast")?;

    let cmd = ForecastCommand::Generate(GenerateForecast {
        tenant_id: tenant.tenant_id(),
        occurred_at: Utc::now(),
    });
    let committed = dispatch_forecast(&services, &tenant, id, cmd).await?;
    errors::ok(Committed::new(id, &committed))
}

async fn dispatch_forecast(
    services: &AppServices,
    tenant: &TenantContext,
    id: ForecastId,
    cmd: ForecastCommand,
) -> Result<Vec<ironbooks_infra::event_store::StoredEvent>, ApiError> {
    Ok(services
        .dispatch(tenant.tenant_id(), id.aggregate_id(), cmd, |agg| {
            Forecast::empty(ForecastId::from(agg))
        })
        .await?)
}
