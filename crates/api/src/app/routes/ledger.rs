use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use uuid::Uuid;

use ironbooks_accounting::{JournalEntryLine, chart, posting};
use ironbooks_auth::permissions::catalog;

use crate::app::dto::{self, EntryPath, ListResponse, Side};
use crate::app::errors::{self, ApiError, ApiResult};
use crate::app::extract::AppJson;
use crate::app::services::{AppServices, JournalPosting};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/balances", get(balances))
        .route("/journal", get(journal).post(post_manual_entry))
        .route("/journal/:entry_id", get(get_entry))
        .route("/journal/:entry_id/reverse", post(reverse_entry))
}

#[derive(Debug, Serialize)]
struct PostedEntry {
    entry_id: Uuid,
}

pub async fn balances(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::LEDGER_READ)?;
    errors::ok(ListResponse::from(
        services.read_models().ledger.balances(tenant.tenant_id()),
    ))
}

pub async fn journal(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::LEDGER_READ)?;
    errors::ok(ListResponse::from(
        services.read_models().ledger.journal(tenant.tenant_id()),
    ))
}

pub async fn get_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<EntryPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::LEDGER_READ)?;
    let entry_id = dto::parse_uuid(&path.entry_id, "journal entry")?;

    match services.read_models().ledger.entry(tenant.tenant_id(), entry_id) {
        Some(entry) => errors::ok(entry),
        None => Err(ApiError::not_found("journal entry")),
    }
}

/// Manual adjustment. Lines must balance; account codes are 4-6 digits.
pub async fn post_manual_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    AppJson(body): AppJson<dto::ManualJournalRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::LEDGER_POST)?;

    let lines = body
        .lines
        .iter()
        .map(|line| {
            let code = line.account_code.trim();
            if !chart::is_valid_code(code) {
                return Err(ApiError::validation(format!("invalid account code '{code}'")));
            }
            let account = chart::account(code);
            Ok(match line.side {
                Side::Debit => JournalEntryLine::debit(account, line.amount),
                Side::Credit => JournalEntryLine::credit(account, line.amount),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    posting::ensure_balanced(&lines)?;

    let description = body.description.trim();
    if description.is_empty() {
        return Err(ApiError::validation("description is required"));
    }

    let entry_id = services
        .post_journal(
            tenant.tenant_id(),
            JournalPosting {
                lines,
                description: description.to_string(),
                source: None,
            },
        )
        .await?
        .ok_or_else(|| ApiError::validation("journal entry must have lines"))?;

    errors::created(PostedEntry { entry_id })
}

pub async fn reverse_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<EntryPath>,
    body: Option<AppJson<dto::ReasonRequest>>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::LEDGER_POST)?;
    let entry_id = dto::parse_uuid(&path.entry_id, "journal entry")?;
    let reason = body.and_then(|AppJson(b)| b.reason);

    let reversal_id = services
        .reverse_journal(tenant.tenant_id(), entry_id, reason)
        .await?;
    errors::created(PostedEntry {
        entry_id: reversal_id,
    })
}
