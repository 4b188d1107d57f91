use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::{get, post},
    Router,
};
use chrono::Utc;

use ironbooks_auth::permissions::catalog;
use ironbooks_planning::discount::{CreateDiscount, DeactivateDiscount};
use ironbooks_planning::{Discount, DiscountCommand, DiscountId};

use crate::app::dto::{self, Committed, IdPath, ListResponse, Quote};
use crate::app::errors::{self, ApiError, ApiResult};
use crate::app::extract::{AppJson, AppQuery};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create).get(list))
        .route("/:id", get(get_one))
        .route("/:id/deactivate", post(deactivate))
        .route("/:id/quote", get(quote))
}

pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    AppJson(body): AppJson<dto::CreateDiscountRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::PLANNING_WRITE)?;

    if services
        .read_models()
        .discounts
        .find_by_code(tenant.tenant_id(), body.code.trim())
        .is_some()
    {
        return Err(ApiError::conflict(format!(
            "discount code '{}' is already in use",
            body.code.trim()
        )));
    }

    let id = DiscountId::generate();
    let cmd = DiscountCommand::Create(CreateDiscount {
        tenant_id: tenant.tenant_id(),
        code: body.code,
        description: body.description,
        kind: body.kind,
        valid_from: body.valid_from,
        valid_until: body.valid_until,
        min_purchase: body.min_purchase,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_discount(&services, &tenant, id, cmd).await?;
    errors::created(Committed::new(id, &committed))
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::PLANNING_READ)?;
    errors::ok(ListResponse::from(
        services.read_models().discounts.list(tenant.tenant_id()),
    ))
}

pub async fn get_one(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::PLANNING_READ)?;
    let id: DiscountId = dto::parse_id(&path.id, "discount")?;

    match services.read_models().discounts.get(tenant.tenant_id(), id) {
        Some(view) => errors::ok(view),
        None => Err(ApiError::not_found("discount")),
    }
}

pub async fn deactivate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::PLANNING_WRITE)?;
    let id: DiscountId = dto::parse_id(&path.id, "discount")?;

    let cmd = DiscountCommand::Deactivate(DeactivateDiscount {
        tenant_id: tenant.tenant_id(),
        occurred_at: Utc::now(),
    });
    let committed = dispatch_discount(&services, &tenant, id, cmd).await?;
    errors::ok(Committed::new(id, &committed))
}

/// Price a purchase against the discount as of `on` (default today).
pub async fn quote(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
    AppQuery(query): AppQuery<dto::QuoteQuery>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::PLANNING_READ)?;
    let id: DiscountId = dto::parse_id(&path.id, "discount")?;

    let discount = services
        .load(tenant.tenant_id(), id.aggregate_id(), |agg| {
            Discount::empty(DiscountId::from(agg))
        })
        .await?
        .ok_or_else(|| ApiError::not_found("discount"))?;

    let on = query.on.unwrap_or_else(|| Utc::now().date_naive());
    let amount = discount.quote(query.amount, on)?;
    errors::ok(Quote {
        discount_id: id.to_string(),
        code: discount.code().to_string(),
        amount: query.amount,
        on,
        discount: amount,
        net: query.amount - amount,
    })
}

async fn dispatch_discount(
    services: &AppServices,
    tenant: &TenantContext,
    id: DiscountId,
    cmd: DiscountCommand,
) -> Result<Vec<ironbooks_infra::event_store::StoredEvent>, ApiError> {
    Ok(services
        .dispatch(tenant.tenant_id(), id.aggregate_id(), cmd, |agg| {
            Discount::empty(DiscountId::from(agg))
        })
        .await?)
}
