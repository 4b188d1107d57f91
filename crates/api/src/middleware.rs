use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension,
};
use chrono::Utc;
use serde::Deserialize;

use ironbooks_auth::JwtValidator;

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::{OrgContext, PrincipalContext, TenantContext};

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

/// Bearer token -> [`TenantContext`] + [`PrincipalContext`]. Anything off is a bare 401.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer(req.headers())?;

    let claims = state.jwt.validate(token, Utc::now()).map_err(|e| {
        tracing::debug!(error = %e, "rejected bearer token");
        StatusCode::UNAUTHORIZED
    })?;

    req.extensions_mut()
        .insert(TenantContext::new(claims.tenant_id));
    req.extensions_mut()
        .insert(PrincipalContext::new(claims.sub, claims.roles));

    Ok(next.run(req).await)
}

#[derive(Debug, Deserialize)]
pub struct SlugPath {
    slug: String,
}

/// `{slug}` -> [`OrgContext`], only for an organization of the caller's tenant.
///
/// Unknown slugs and slugs of other tenants both answer `404 org_not_found`.
pub async fn org_middleware(
    State(services): State<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(path): Path<SlugPath>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let org = services
        .read_models()
        .organizations
        .find_by_slug(&path.slug)
        .filter(|org| org.tenant_id == tenant.tenant_id());

    match org {
        Some(org) => {
            req.extensions_mut().insert(OrgContext::new(org));
            next.run(req).await
        }
        None => ApiError::OrgNotFound.into_response(),
    }
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn bearer_prefix_is_required() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), Err(StatusCode::UNAUTHORIZED));

        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer(&headers), Err(StatusCode::UNAUTHORIZED));

        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_bearer(&headers), Err(StatusCode::UNAUTHORIZED));

        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer tok"));
        assert_eq!(extract_bearer(&headers), Ok("tok"));
    }
}
