use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use tracing::{info, warn};

use ironbooks_accounting::PostingSource;
use ironbooks_auth::permissions::catalog;
use ironbooks_costing::revaluation::{CancelRevaluation, DraftRevaluation, PostRevaluation};
use ironbooks_costing::standard_cost::{ApplyRevaluation, RevertRevaluation};
use ironbooks_costing::{
    Revaluation, RevaluationCommand, RevaluationId, RevaluationStatus, StandardCostCommand,
    StandardCostId,
};

use crate::app::dto::{self, Committed, IdPath, ListResponse};
use crate::app::errors::{self, ApiError, ApiResult};
use crate::app::extract::AppJson;
use crate::app::routes::standard_costs::{dispatch_standard_cost, load_standard_cost};
use crate::app::services::{AppServices, JournalPosting};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(draft).get(list))
        .route("/:id", get(get_one))
        .route("/:id/preview", get(preview))
        .route("/:id/post", post(post_revaluation))
        .route("/:id/cancel", post(cancel))
}

/// Draft against the standard cost as it stands now.
pub async fn draft(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    AppJson(body): AppJson<dto::DraftRevaluationRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::COSTING_WRITE)?;
    let standard_cost_id: StandardCostId = dto::parse_id(&body.standard_cost_id, "standard cost")?;
    let standard_cost = match load_standard_cost(&services, &tenant, standard_cost_id).await {
        Err(ApiError::NotFound(_)) => {
            return Err(ApiError::invariant("standard cost does not exist"));
        }
        other => other?,
    };

    let id = RevaluationId::generate();
    let cmd = RevaluationCommand::Draft(DraftRevaluation {
        tenant_id: tenant.tenant_id(),
        standard_cost_id,
        sku: standard_cost.sku().to_string(),
        current_unit_cost: standard_cost.unit_cost(),
        new_unit_cost: body.new_unit_cost,
        on_hand_quantity: body.on_hand_quantity,
        effective_date: body.effective_date,
        reason: body.reason,
        inventory_account: body.inventory_account,
        adjustment_account: body.adjustment_account,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_revaluation(&services, &tenant, id, cmd).await?;
    errors::created(Committed::new(id, &committed))
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::COSTING_READ)?;
    errors::ok(ListResponse::from(
        services.read_models().revaluations.list(tenant.tenant_id()),
    ))
}

pub async fn get_one(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::COSTING_READ)?;
    let id: RevaluationId = dto::parse_id(&path.id, "revaluation")?;

    match services.read_models().revaluations.get(tenant.tenant_id(), id) {
        Some(view) => errors::ok(view),
        None => Err(ApiError::not_found("revaluation")),
    }
}

pub async fn preview(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::COSTING_READ)?;
    let id: RevaluationId = dto::parse_id(&path.id, "revaluation")?;
    let revaluation = load_revaluation(&services, &tenant, id).await?;
    errors::ok(revaluation.preview()?)
}

/// Move the standard cost, mark the revaluation posted, then post its journal.
///
/// The standard cost only moves if it still holds the cost the draft was
/// taken against; a stale draft fails with 422 and nothing is written. If the
/// revaluation can no longer be posted once the cost has moved, the move is
/// reverted.
pub async fn post_revaluation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::COSTING_POST)?;
    let id: RevaluationId = dto::parse_id(&path.id, "revaluation")?;
    let revaluation = load_revaluation(&services, &tenant, id).await?;

    if revaluation.status() != RevaluationStatus::Draft {
        return Err(ApiError::invariant("only draft revaluations can be posted"));
    }
    let (Some(standard_cost_id), Some(effective_date)) =
        (revaluation.standard_cost_id(), revaluation.effective_date())
    else {
        return Err(ApiError::invariant("revaluation is incomplete"));
    };
    let preview = revaluation.preview()?;

    let apply = StandardCostCommand::ApplyRevaluation(ApplyRevaluation {
        tenant_id: tenant.tenant_id(),
        revaluation_id: id,
        expected_unit_cost: revaluation.current_unit_cost(),
        new_unit_cost: revaluation.new_unit_cost(),
        effective_from: effective_date,
        occurred_at: Utc::now(),
    });
    dispatch_standard_cost(&services, &tenant, standard_cost_id, apply).await?;

    let cmd = RevaluationCommand::Post(PostRevaluation {
        tenant_id: tenant.tenant_id(),
        posted_by: principal.user_id(),
        occurred_at: Utc::now(),
    });
    let committed = match dispatch_revaluation(&services, &tenant, id, cmd).await {
        Ok(committed) => committed,
        Err(err) => {
            warn!(revaluation_id = %id, error = %err, "revaluation not posted; reverting standard cost");
            let revert = StandardCostCommand::RevertRevaluation(RevertRevaluation {
                tenant_id: tenant.tenant_id(),
                revaluation_id: id,
                occurred_at: Utc::now(),
            });
            if let Err(revert_err) =
                dispatch_standard_cost(&services, &tenant, standard_cost_id, revert).await
            {
                warn!(revaluation_id = %id, error = %revert_err, "standard cost revert failed");
            }
            return Err(err);
        }
    };

    let entry_id = services
        .post_journal(
            tenant.tenant_id(),
            JournalPosting {
                lines: preview.lines,
                description: format!("Revaluation of {}", revaluation.sku()),
                source: Some(PostingSource::new("revaluation", id.aggregate_id())),
            },
        )
        .await
        .inspect_err(|e| warn!(revaluation_id = %id, error = %e, "revaluation posted but journal posting failed"))?;

    info!(revaluation_id = %id, delta = preview.delta, "revaluation posted");
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
    let id: RevaluationId = dto::parse_id(&path.id, "revaluation")?;

    let cmd = RevaluationCommand::Cancel(CancelRevaluation {
        tenant_id: tenant.tenant_id(),
        reason: body.and_then(|AppJson(b)| b.reason),
        occurred_at: Utc::now(),
    });
    let committed = dispatch_revaluation(&services, &tenant, id, cmd).await?;
    errors::ok(Committed::new(id, &committed))
}

async fn dispatch_revaluation(
    services: &AppServices,
    tenant: &TenantContext,
    id: RevaluationId,
    cmd: RevaluationCommand,
) -> Result<Vec<ironbooks_infra::event_store::StoredEvent>, ApiError> {
    Ok(services
        .dispatch(tenant.tenant_id(), id.aggregate_id(), cmd, |agg| {
            Revaluation::empty(RevaluationId::from(agg))
        })
        .await?)
}

async fn load_revaluation(
    services: &AppServices,
    tenant: &TenantContext,
    id: RevaluationId,
) -> Result<Revaluation, ApiError> {
    services
        .load(tenant.tenant_id(), id.aggregate_id(), |agg| {
            Revaluation::empty(RevaluationId::from(agg))
        })
        .await?
        .ok_or_else(|| ApiError::not_found("revaluation"))
}
