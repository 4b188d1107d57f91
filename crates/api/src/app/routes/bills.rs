use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use tracing::warn;

use ironbooks_accounting::{PostingSource, posting};
use ironbooks_auth::permissions::catalog;
use ironbooks_payables::{
    ApproveBill, Bill, BillCommand, BillId, BillStatus, CreateBill, ReviseBill, VendorId, VoidBill,
};

use crate::app::dto::{self, Committed, IdPath, ListResponse};
use crate::app::errors::{self, ApiError, ApiResult};
use crate::app::extract::{AppJson, AppQuery};
use crate::app::routes::vendors::active_vendor;
use crate::app::services::{AppServices, JournalPosting};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_bill).get(list_bills))
        .route("/:id", get(get_bill).put(revise_bill))
        .route("/:id/approve", post(approve_bill))
        .route("/:id/void", post(void_bill))
}

pub async fn create_bill(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    AppJson(body): AppJson<dto::CreateBillRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::BILLS_WRITE)?;
    let vendor_id: VendorId = dto::parse_id(&body.vendor_id, "vendor")?;
    let vendor = active_vendor(&services, &tenant, vendor_id).await?;

    if services
        .read_models()
        .bills
        .find_by_number(tenant.tenant_id(), vendor_id, &body.bill_number)
        .is_some()
    {
        return Err(ApiError::conflict(format!(
            "bill number '{}' already exists for this vendor",
            body.bill_number.trim()
        )));
    }

    let currency = match body.currency {
        Some(c) => c,
        None => vendor
            .currency()
            .map(ToString::to_string)
            .ok_or_else(|| ApiError::validation("currency is required"))?,
    };

    let bill_id = BillId::generate();
    let cmd = BillCommand::Create(CreateBill {
        tenant_id: tenant.tenant_id(),
        vendor_id,
        bill_number: body.bill_number,
        bill_date: body.bill_date,
        terms: body.terms.unwrap_or_else(|| vendor.default_terms()),
        currency,
        items: body.items,
        tax_lines: body.tax_lines,
        memo: body.memo,
        occurred_at: Utc::now(),
    });

    let committed = services
        .dispatch(tenant.tenant_id(), bill_id.aggregate_id(), cmd, |id| {
            Bill::empty(BillId::from(id))
        })
        .await?;

    errors::created(Committed::new(bill_id, &committed))
}

pub async fn list_bills(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    AppQuery(query): AppQuery<dto::BillListQuery>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::BILLS_READ)?;
    let vendor_id = query
        .vendor_id
        .as_deref()
        .map(|raw| dto::parse_id::<VendorId>(raw, "vendor"))
        .transpose()?;

    let items = services
        .read_models()
        .bills
        .list(tenant.tenant_id())
        .into_iter()
        .filter(|b| vendor_id.is_none_or(|v| b.vendor_id == v))
        .filter(|b| query.status.is_none_or(|s| b.status == s))
        .collect::<Vec<_>>();
    errors::ok(ListResponse::from(items))
}

pub async fn get_bill(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::BILLS_READ)?;
    let bill_id: BillId = dto::parse_id(&path.id, "bill")?;

    match services.read_models().bills.get(tenant.tenant_id(), bill_id) {
        Some(bill) => errors::ok(bill),
        None => Err(ApiError::not_found("bill")),
    }
}

pub async fn revise_bill(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
    AppJson(body): AppJson<dto::ReviseBillRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::BILLS_WRITE)?;
    let bill_id: BillId = dto::parse_id(&path.id, "bill")?;

    let cmd = BillCommand::Revise(ReviseBill {
        tenant_id: tenant.tenant_id(),
        bill_date: body.bill_date,
        terms: body.terms,
        items: body.items,
        tax_lines: body.tax_lines,
        memo: body.memo,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_bill(&services, &tenant, bill_id, cmd).await?;
    errors::ok(Committed::new(bill_id, &committed))
}

/// Draft -> Open, then post the approval journal (expenses and input tax against AP).
pub async fn approve_bill(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::BILLS_APPROVE)?;
    let bill_id: BillId = dto::parse_id(&path.id, "bill")?;

    let cmd = BillCommand::Approve(ApproveBill {
        tenant_id: tenant.tenant_id(),
        approved_by: principal.user_id(),
        occurred_at: Utc::now(),
    });
    let committed = dispatch_bill(&services, &tenant, bill_id, cmd).await?;

    let bill = load_bill(&services, &tenant, bill_id).await?;
    let lines = posting::bill_approval(
        bill.items()
            .iter()
            .map(|item| (item.account_code.as_str(), item.line_total)),
        bill.totals().tax_total,
    )?;

    let entry_id = services
        .post_journal(
            tenant.tenant_id(),
            JournalPosting {
                lines,
                description: format!("Bill {} approved", bill.bill_number()),
                source: Some(PostingSource::new("bill", bill_id.aggregate_id())),
            },
        )
        .await
        .inspect_err(|e| warn!(bill_id = %bill_id, error = %e, "bill approved but journal posting failed"))?;

    errors::ok(Committed::new(bill_id, &committed).with_journal(entry_id))
}

/// Void a bill. An approved bill also gets its approval journal reversed.
pub async fn void_bill(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
    body: Option<AppJson<dto::ReasonRequest>>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::BILLS_WRITE)?;
    let bill_id: BillId = dto::parse_id(&path.id, "bill")?;
    let body = body.map(|AppJson(b)| b).unwrap_or_default();

    let was_open = load_bill(&services, &tenant, bill_id).await?.status() == BillStatus::Open;

    let cmd = BillCommand::Void(VoidBill {
        tenant_id: tenant.tenant_id(),
        reason: body.reason.clone(),
        occurred_at: Utc::now(),
    });
    let committed = dispatch_bill(&services, &tenant, bill_id, cmd).await?;

    let mut reversal = None;
    if was_open {
        let entries = services
            .unreversed_journal_entries(tenant.tenant_id(), bill_id.aggregate_id())
            .await?;
        for entry_id in entries {
            let reversal_id = services
                .reverse_journal(tenant.tenant_id(), entry_id, body.reason.clone())
                .await
                .inspect_err(|e| warn!(bill_id = %bill_id, error = %e, "bill voided but journal reversal failed"))?;
            reversal = Some(reversal_id);
        }
    }

    errors::ok(Committed::new(bill_id, &committed).with_journal(reversal))
}

pub async fn aging(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    AppQuery(query): AppQuery<dto::AsOfQuery>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::BILLS_READ)?;
    let as_of = query.as_of.unwrap_or_else(|| Utc::now().date_naive());
    errors::ok(services.read_models().bills.aging(tenant.tenant_id(), as_of))
}

async fn dispatch_bill(
    services: &AppServices,
    tenant: &TenantContext,
    bill_id: BillId,
    cmd: BillCommand,
) -> Result<Vec<ironbooks_infra::event_store::StoredEvent>, ApiError> {
    Ok(services
        .dispatch(tenant.tenant_id(), bill_id.aggregate_id(), cmd, |id| {
            Bill::empty(BillId::from(id))
        })
        .await?)
}

pub(crate) async fn load_bill(
    services: &AppServices,
    tenant: &TenantContext,
    bill_id: BillId,
) -> Result<Bill, ApiError> {
    services
        .load(tenant.tenant_id(), bill_id.aggregate_id(), |id| Bill::empty(BillId::from(id)))
        .await?
        .ok_or_else(|| ApiError::not_found("bill"))
}
