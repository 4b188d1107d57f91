use std::sync::Arc;

use axum::extract::{Extension, Path};

use ironbooks_auth::permissions::catalog;
use ironbooks_core::AggregateId;

use crate::app::dto::{self, HistoryEntry, HistoryPath, ListResponse};
use crate::app::errors::{self, ApiError, ApiResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

/// Every event of one aggregate, oldest first.
pub async fn aggregate_history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<HistoryPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::AUDIT_READ)?;
    let aggregate_id: AggregateId = dto::parse_id(&path.aggregate_id, "aggregate")?;

    let events = services.history(tenant.tenant_id(), aggregate_id).await?;
    if events.is_empty() {
        return Err(ApiError::not_found("aggregate"));
    }
    errors::ok(ListResponse::from(
        events.into_iter().map(HistoryEntry::from).collect::<Vec<_>>(),
    ))
}
