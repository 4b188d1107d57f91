use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::sse::{Event as SseEvent, Sse},
};
use serde::Serialize;

use crate::app::errors::{self, ApiResult};
use crate::app::services::{self, AppServices};
use crate::context::{OrgContext, PrincipalContext, TenantContext};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize)]
struct WhoAmI {
    tenant_id: String,
    principal_id: String,
    roles: Vec<String>,
}

pub async fn whoami(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    errors::ok(WhoAmI {
        tenant_id: tenant.tenant_id().to_string(),
        principal_id: principal.principal_id().to_string(),
        roles: principal.roles().iter().map(|r| r.as_str().to_string()).collect(),
    })
}

/// Read-model update notifications for the organization's tenant.
pub async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(org): Extension<OrgContext>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, std::convert::Infallible>>> {
    services::tenant_sse_stream(services, org.organization().tenant_id)
}
