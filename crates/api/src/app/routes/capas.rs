use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use tracing::warn;

use ironbooks_auth::permissions::catalog;
use ironbooks_quality::capa::{
    AddAction, CancelCapa, CloseCapa, CompleteAction, MarkImplemented, OpenCapa,
    RecordRootCause, VerifyEffectiveness,
};
use ironbooks_quality::ncr::LinkCapa;
use ironbooks_quality::{Capa, CapaCommand, CapaId, NcrCommand, NcrId};

use crate::app::dto::{self, ChildPath, Committed, IdPath, ListResponse};
use crate::app::errors::{self, ApiError, ApiResult};
use crate::app::extract::AppJson;
use crate::app::routes::ncrs::{dispatch_ncr, load_ncr};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(open).get(list))
        .route("/:id", get(get_one))
        .route("/:id/root-cause", post(record_root_cause))
        .route("/:id/actions", post(add_action))
        .route("/:id/actions/:no/complete", post(complete_action))
        .route("/:id/implement", post(mark_implemented))
        .route("/:id/verify", post(verify))
        .route("/:id/close", post(close))
        .route("/:id/cancel", post(cancel))
}

/// Open a CAPA, linking it to its originating NCR when one is given.
pub async fn open(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    AppJson(body): AppJson<dto::OpenCapaRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::QUALITY_WRITE)?;

    let ncr_id = match body.ncr_id.as_deref() {
        Some(raw) => {
            let ncr_id: NcrId = dto::parse_id(raw, "ncr")?;
            match load_ncr(&services, &tenant, ncr_id).await? {
                None => return Err(ApiError::invariant(format!("ncr {ncr_id} does not exist"))),
                Some(ncr) if ncr.status().is_terminal() => {
                    return Err(ApiError::invariant(format!(
                        "ncr {ncr_id} is already {:?}",
                        ncr.status()
                    )));
                }
                Some(_) => Some(ncr_id),
            }
        }
        None => None,
    };

    let id = CapaId::generate();
    let cmd = CapaCommand::Open(OpenCapa {
        tenant_id: tenant.tenant_id(),
        title: body.title,
        kind: body.kind,
        description: body.description,
        ncr_id,
        owner: body.owner.unwrap_or_else(|| principal.user_id()),
        due_date: body.due_date,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_capa(&services, &tenant, id, cmd).await?;

    if let Some(ncr_id) = ncr_id {
        let link = NcrCommand::LinkCapa(LinkCapa {
            tenant_id: tenant.tenant_id(),
            capa_id: id,
            occurred_at: Utc::now(),
        });
        dispatch_ncr(&services, &tenant, ncr_id, link)
            .await
            .inspect_err(|e| warn!(capa_id = %id, ncr_id = %ncr_id, error = %e, "capa opened but ncr link failed"))?;
    }

    errors::created(Committed::new(id, &committed))
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::QUALITY_READ)?;
    errors::ok(ListResponse::from(
        services.read_models().capas.list(tenant.tenant_id()),
    ))
}

pub async fn get_one(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::QUALITY_READ)?;
    let id: CapaId = dto::parse_id(&path.id, "capa")?;

    match services.read_models().capas.get(tenant.tenant_id(), id) {
        Some(view) => errors::ok(view),
        None => Err(ApiError::not_found("capa")),
    }
}

pub async fn record_root_cause(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
    AppJson(body): AppJson<dto::RootCauseRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::QUALITY_WRITE)?;
    let id: CapaId = dto::parse_id(&path.id, "capa")?;

    let cmd = CapaCommand::RecordRootCause(RecordRootCause {
        tenant_id: tenant.tenant_id(),
        root_cause: body.root_cause,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_capa(&services, &tenant, id, cmd).await?;
    errors::ok(Committed::new(id, &committed))
}

pub async fn add_action(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
    AppJson(body): AppJson<dto::AddActionRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::QUALITY_WRITE)?;
    let id: CapaId = dto::parse_id(&path.id, "capa")?;

    let cmd = CapaCommand::AddAction(AddAction {
        tenant_id: tenant.tenant_id(),
        description: body.description,
        assignee: body.assignee.unwrap_or_else(|| principal.user_id()),
        due_date: body.due_date,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_capa(&services, &tenant, id, cmd).await?;
    errors::created(Committed::new(id, &committed))
}

pub async fn complete_action(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<ChildPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::QUALITY_WRITE)?;
    let id: CapaId = dto::parse_id(&path.id, "capa")?;
    let action_no = dto::parse_number(&path.no, "action")?;

    let cmd = CapaCommand::CompleteAction(CompleteAction {
        tenant_id: tenant.tenant_id(),
        action_no,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_capa(&services, &tenant, id, cmd).await?;
    errors::ok(Committed::new(id, &committed))
}

pub async fn mark_implemented(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::QUALITY_WRITE)?;
    let id: CapaId = dto::parse_id(&path.id, "capa")?;

    let cmd = CapaCommand::MarkImplemented(MarkImplemented {
        tenant_id: tenant.tenant_id(),
        occurred_at: Utc::now(),
    });
    let committed = dispatch_capa(&services, &tenant, id, cmd).await?;
    errors::ok(Committed::new(id, &committed))
}

pub async fn verify(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
    AppJson(body): AppJson<dto::VerifyRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::QUALITY_WRITE)?;
    let id: CapaId = dto::parse_id(&path.id, "capa")?;

    let cmd = CapaCommand::VerifyEffectiveness(VerifyEffectiveness {
        tenant_id: tenant.tenant_id(),
        effective: body.effective,
        notes: body.notes,
        verified_by: principal.user_id(),
        occurred_at: Utc::now(),
    });
    let committed = dispatch_capa(&services, &tenant, id, cmd).await?;
    errors::ok(Committed::new(id, &committed))
}

pub async fn close(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::QUALITY_WRITE)?;
    let id: CapaId = dto::parse_id(&path.id, "capa")?;

    let cmd = CapaCommand::Close(CloseCapa {
        tenant_id: tenant.tenant_id(),
        occurred_at: Utc::now(),
    });
    let committed = dispatch_capa(&services, &tenant, id, cmd).await?;
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
    let id: CapaId = dto::parse_id(&path.id, "capa")?;

    let cmd = CapaCommand::Cancel(CancelCapa {
        tenant_id: tenant.tenant_id(),
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_capa(&services, &tenant, id, cmd).await?;
    errors::ok(Committed::new(id, &committed))
}

async fn dispatch_capa(
    services: &AppServices,
    tenant: &TenantContext,
    id: CapaId,
    cmd: CapaCommand,
) -> Result<Vec<ironbooks_infra::event_store::StoredEvent>, ApiError> {
    Ok(services
        .dispatch(tenant.tenant_id(), id.aggregate_id(), cmd, |agg| {
            Capa::empty(CapaId::from(agg))
        })
        .await?)
}
