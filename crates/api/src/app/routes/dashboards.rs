use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;

use ironbooks_auth::permissions::catalog;
use ironbooks_reporting::dashboard::{
    AddWidget, ArchiveDashboard, CreateDashboard, RemoveWidget, RenameDashboard,
};
use ironbooks_reporting::{Dashboard, DashboardCommand, DashboardId, evaluate};

use crate::app::dto::{self, ChildPath, Committed, DashboardData, IdPath, ListResponse, WidgetData};
use crate::app::errors::{self, ApiError, ApiResult};
use crate::app::extract::{AppJson, AppQuery};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create).get(list))
        .route("/:id", get(get_one).patch(rename))
        .route("/:id/widgets", post(add_widget))
        .route("/:id/widgets/:no", delete(remove_widget))
        .route("/:id/archive", post(archive))
        .route("/:id/data", get(data))
}

pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    AppJson(body): AppJson<dto::CreateDashboardRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::REPORTS_WRITE)?;

    let id = DashboardId::generate();
    let cmd = DashboardCommand::Create(CreateDashboard {
        tenant_id: tenant.tenant_id(),
        name: body.name,
        description: body.description,
        owner: principal.user_id(),
        occurred_at: Utc::now(),
    });
    let committed = dispatch_dashboard(&services, &tenant, id, cmd).await?;
    errors::created(Committed::new(id, &committed))
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::REPORTS_READ)?;
    errors::ok(ListResponse::from(
        services.read_models().dashboards.list(tenant.tenant_id()),
    ))
}

pub async fn get_one(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::REPORTS_READ)?;
    let id: DashboardId = dto::parse_id(&path.id, "dashboard")?;

    match services.read_models().dashboards.get(tenant.tenant_id(), id) {
        Some(view) => errors::ok(view),
        None => Err(ApiError::not_found("dashboard")),
    }
}

pub async fn rename(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
    AppJson(body): AppJson<dto::RenameRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::REPORTS_WRITE)?;
    let id: DashboardId = dto::parse_id(&path.id, "dashboard")?;

    let cmd = DashboardCommand::Rename(RenameDashboard {
        tenant_id: tenant.tenant_id(),
        name: body.name,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_dashboard(&services, &tenant, id, cmd).await?;
    errors::ok(Committed::new(id, &committed))
}

pub async fn add_widget(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
    AppJson(body): AppJson<dto::AddWidgetRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::REPORTS_WRITE)?;
    let id: DashboardId = dto::parse_id(&path.id, "dashboard")?;

    let cmd = DashboardCommand::AddWidget(AddWidget {
        tenant_id: tenant.tenant_id(),
        title: body.title,
        kind: body.kind,
        metric: body.metric,
        position: body.position,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_dashboard(&services, &tenant, id, cmd).await?;
    errors::created(Committed::new(id, &committed))
}

pub async fn remove_widget(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<ChildPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::REPORTS_WRITE)?;
    let id: DashboardId = dto::parse_id(&path.id, "dashboard")?;
    let widget_no = dto::parse_number(&path.no, "widget")?;

    let cmd = DashboardCommand::RemoveWidget(RemoveWidget {
        tenant_id: tenant.tenant_id(),
        widget_no,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_dashboard(&services, &tenant, id, cmd).await?;
    errors::ok(Committed::new(id, &committed))
}

pub async fn archive(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::REPORTS_WRITE)?;
    let id: DashboardId = dto::parse_id(&path.id, "dashboard")?;

    let cmd = DashboardCommand::Archive(ArchiveDashboard {
        tenant_id: tenant.tenant_id(),
        occurred_at: Utc::now(),
    });
    let committed = dispatch_dashboard(&services, &tenant, id, cmd).await?;
    errors::ok(Committed::new(id, &committed))
}

/// Evaluate every widget's metric over the tenant's read models.
pub async fn data(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
    AppQuery(query): AppQuery<dto::AsOfQuery>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::REPORTS_READ)?;
    let id: DashboardId = dto::parse_id(&path.id, "dashboard")?;
    let dashboard = services
        .read_models()
        .dashboards
        .get(tenant.tenant_id(), id)
        .ok_or_else(|| ApiError::not_found("dashboard"))?;

    let as_of = query.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let source = services.read_models().metrics(tenant.tenant_id());
    let widgets = dashboard
        .widgets
        .into_iter()
        .map(|widget| {
            let value = evaluate(widget.metric, &source, as_of);
            WidgetData {
                widget_no: widget.widget_no,
                title: widget.title,
                kind: widget.kind,
                metric: widget.metric,
                unit: value.unit,
                value: value.value,
            }
        })
        .collect();

    errors::ok(DashboardData {
        dashboard_id: id.to_string(),
        as_of,
        widgets,
    })
}

async fn dispatch_dashboard(
    services: &AppServices,
    tenant: &TenantContext,
    id: DashboardId,
    cmd: DashboardCommand,
) -> Result<Vec<ironbooks_infra::event_store::StoredEvent>, ApiError> {
    Ok(services
        .dispatch(tenant.tenant_id(), id.aggregate_id(), cmd, |agg| {
            Dashboard::empty(DashboardId::from(agg))
        })
        .await?)
}
