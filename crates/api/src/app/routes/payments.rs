use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use tracing::{info, warn};

use ironbooks_accounting::{PostingSource, posting};
use ironbooks_auth::permissions::catalog;
use ironbooks_infra::event_store::StoredEvent;
use ironbooks_payables::{
    Allocation, ApplyPayment, Bill, BillCommand, BillId, Payment, PaymentCommand, PaymentId,
    RecordPayment, RejectAllocation, VendorId,
};

use crate::app::dto::{self, Committed, IdPath, ListResponse};
use crate::app::errors::{self, ApiError, ApiResult};
use crate::app::extract::AppJson;
use crate::app::routes::bills::load_bill;
use crate::app::routes::vendors::active_vendor;
use crate::app::services::{AppServices, JournalPosting};
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(record_payment).get(list_payments))
        .route("/:id", get(get_payment))
}

/// Record a vendor payment and apply it to the allocated bills.
///
/// Allocations are checked against the bills before anything is written. A
/// bill that still refuses its share afterwards (raced by another payment or
/// a void) gets the allocation rejected on the payment; the rejected amount
/// stays unapplied.
pub async fn record_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    AppJson(body): AppJson<dto::RecordPaymentRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::PAYMENTS_WRITE)?;
    let vendor_id: VendorId = dto::parse_id(&body.vendor_id, "vendor")?;
    let vendor = active_vendor(&services, &tenant, vendor_id).await?;

    let mut allocations = Vec::with_capacity(body.allocations.len());
    for requested in &body.allocations {
        let bill_id: BillId = dto::parse_id(&requested.bill_id, "bill")?;
        let bill = match load_bill(&services, &tenant, bill_id).await {
            Err(ApiError::NotFound(_)) => {
                return Err(ApiError::invariant(format!("bill {bill_id} does not exist")));
            }
            other => other?,
        };
        check_allocation(&bill, bill_id, vendor_id, requested.amount)?;
        allocations.push(Allocation::new(bill_id, requested.amount));
    }

    let currency = match body.currency {
        Some(c) => c,
        None => vendor
            .currency()
            .map(ToString::to_string)
            .ok_or_else(|| ApiError::validation("currency is required"))?,
    };

    let payment_id = PaymentId::generate();
    let cmd = PaymentCommand::Record(RecordPayment {
        tenant_id: tenant.tenant_id(),
        vendor_id,
        payment_date: body.payment_date,
        method: body.method,
        reference: body.reference,
        amount: body.amount,
        currency,
        allocations: allocations.clone(),
        recorded_by: principal.user_id(),
        occurred_at: Utc::now(),
    });
    let mut committed = dispatch_payment(&services, &tenant, payment_id, cmd).await?;

    committed.extend(apply_allocations(&services, &tenant, payment_id, &allocations).await?);

    let payment = services
        .load(tenant.tenant_id(), payment_id.aggregate_id(), |id| {
            Payment::empty(PaymentId::from(id))
        })
        .await?
        .ok_or_else(|| ApiError::not_found("payment"))?;

    let lines = posting::vendor_payment(payment.applied(), payment.unapplied())?;
    let entry_id = services
        .post_journal(
            tenant.tenant_id(),
            JournalPosting {
                lines,
                description: format!("Payment to vendor {}", vendor.code()),
                source: Some(PostingSource::new("payment", payment_id.aggregate_id())),
            },
        )
        .await
        .inspect_err(|e| warn!(payment_id = %payment_id, error = %e, "payment recorded but journal posting failed"))?;

    info!(
        payment_id = %payment_id,
        applied = payment.applied(),
        unapplied = payment.unapplied(),
        "payment recorded"
    );

    errors::created(Committed::new(payment_id, &committed).with_journal(entry_id))
}

/// Apply each allocation to its bill. A bill that refuses gets the allocation
/// rejected on the payment instead.
async fn apply_allocations(
    services: &AppServices,
    tenant: &TenantContext,
    payment_id: PaymentId,
    allocations: &[Allocation],
) -> Result<Vec<StoredEvent>, ApiError> {
    let mut committed = Vec::new();
    for allocation in allocations {
        let apply = BillCommand::ApplyPayment(ApplyPayment {
            tenant_id: tenant.tenant_id(),
            payment_id,
            amount: allocation.amount,
            occurred_at: Utc::now(),
        });
        let applied = services
            .dispatch(tenant.tenant_id(), allocation.bill_id.aggregate_id(), apply, |id| {
                Bill::empty(BillId::from(id))
            })
            .await;

        if let Err(err) = applied {
            warn!(
                payment_id = %payment_id,
                bill_id = %allocation.bill_id,
                error = %err,
                "bill refused allocation; rejecting it on the payment"
            );
            let reject = PaymentCommand::RejectAllocation(RejectAllocation {
                tenant_id: tenant.tenant_id(),
                bill_id: allocation.bill_id,
                reason: err.to_string(),
                occurred_at: Utc::now(),
            });
            committed.extend(dispatch_payment(services, tenant, payment_id, reject).await?);
        }
    }
    Ok(committed)
}

fn check_allocation(
    bill: &Bill,
    bill_id: BillId,
    vendor_id: VendorId,
    amount: i64,
) -> Result<(), ApiError> {
    if bill.vendor_id() != Some(vendor_id) {
        return Err(ApiError::invariant(format!(
            "bill {bill_id} belongs to a different vendor"
        )));
    }
    if !bill.status().is_payable() {
        return Err(ApiError::invariant(format!(
            "bill {bill_id} is not open for payment"
        )));
    }
    if amount > bill.outstanding() {
        return Err(ApiError::invariant(format!(
            "allocation {amount} exceeds outstanding {} on bill {bill_id}",
            bill.outstanding()
        )));
    }
    Ok(())
}

pub async fn list_payments(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::PAYMENTS_READ)?;
    errors::ok(ListResponse::from(
        services.read_models().payments.list(tenant.tenant_id()),
    ))
}

pub async fn get_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(path): Path<IdPath>,
) -> ApiResult {
    authz::require(&tenant, &principal, &catalog::PAYMENTS_READ)?;
    let payment_id: PaymentId = dto::parse_id(&path.id, "payment")?;

    match services.read_models().payments.get(tenant.tenant_id(), payment_id) {
        Some(payment) => errors::ok(payment),
        None => Err(ApiError::not_found("payment")),
    }
}

async fn dispatch_payment(
    services: &AppServices,
    tenant: &TenantContext,
    payment_id: PaymentId,
    cmd: PaymentCommand,
) -> Result<Vec<StoredEvent>, ApiError> {
    Ok(services
        .dispatch(tenant.tenant_id(), payment_id.aggregate_id(), cmd, |id| {
            Payment::empty(PaymentId::from(id))
        })
        .await?)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use ironbooks_core::{TenantId, UserId};
    use ironbooks_payables::{
        AllocationStatus, ApproveBill, BillItemInput, Contact, CreateBill, PaymentMethod,
        PaymentTerms, RegisterVendor, Vendor, VendorCommand, VoidBill,
    };

    use super::*;
    use crate::config::ApiConfig;

    async fn open_bill(services: &AppServices, tenant: &TenantContext) -> (VendorId, BillId) {
        let tenant_id = tenant.tenant_id();
        let vendor_id = VendorId::generate();
        services
            .dispatch(
                tenant_id,
                vendor_id.aggregate_id(),
                VendorCommand::Register(RegisterVendor {
                    tenant_id,
                    code: "ACME".to_string(),
                    name: "Acme Steel".to_string(),
                    contact: Contact::default(),
                    default_terms: PaymentTerms::net(30).unwrap(),
                    currency: "USD".to_string(),
                    occurred_at: Utc::now(),
                }),
                |id| Vendor::empty(VendorId::from(id)),
            )
            .await
            .unwrap();

        let bill_id = BillId::generate();
        let commands = [
            BillCommand::Create(CreateBill {
                tenant_id,
                vendor_id,
                bill_number: "INV-9".to_string(),
                bill_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                terms: PaymentTerms::net(30).unwrap(),
                currency: "USD".to_string(),
                items: vec![BillItemInput {
                    description: "Plate".to_string(),
                    quantity: 1,
                    unit_price: 5_000,
                    account_code: None,
                    sku: None,
                }],
                tax_lines: vec![],
                memo: None,
                occurred_at: Utc::now(),
            }),
            BillCommand::Approve(ApproveBill {
                tenant_id,
                approved_by: UserId::new(),
                occurred_at: Utc::now(),
            }),
        ];
        for cmd in commands {
            dispatch_bill_cmd(services, tenant, bill_id, cmd).await;
        }
        (vendor_id, bill_id)
    }

    async fn dispatch_bill_cmd(
        services: &AppServices,
        tenant: &TenantContext,
        bill_id: BillId,
        cmd: BillCommand,
    ) {
        services
            .dispatch(tenant.tenant_id(), bill_id.aggregate_id(), cmd, |id| {
                Bill::empty(BillId::from(id))
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn refused_allocation_is_rejected_on_the_payment() {
        let services = AppServices::build(&ApiConfig::for_tests("secret")).await.unwrap();
        let tenant = TenantContext::new(TenantId::new());
        let (vendor_id, bill_id) = open_bill(&services, &tenant).await;

        let payment_id = PaymentId::generate();
        let allocations = vec![Allocation::new(bill_id, 5_000)];
        dispatch_payment(
            &services,
            &tenant,
            payment_id,
            PaymentCommand::Record(RecordPayment {
                tenant_id: tenant.tenant_id(),
                vendor_id,
                payment_date: NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
                method: PaymentMethod::Wire,
                reference: None,
                amount: 5_000,
                currency: "USD".to_string(),
                allocations: allocations.clone(),
                recorded_by: UserId::new(),
                occurred_at: Utc::now(),
            }),
        )
        .await
        .unwrap();

        // The bill is voided after the payment was checked against it.
        dispatch_bill_cmd(
            &services,
            &tenant,
            bill_id,
            BillCommand::Void(VoidBill {
                tenant_id: tenant.tenant_id(),
                reason: None,
                occurred_at: Utc::now(),
            }),
        )
        .await;

        let events = apply_allocations(&services, &tenant, payment_id, &allocations)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);

        let payment = services
            .load(tenant.tenant_id(), payment_id.aggregate_id(), |id| {
                Payment::empty(PaymentId::from(id))
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.applied(), 0);
        assert_eq!(payment.unapplied(), 5_000);
        assert_eq!(payment.allocations()[0].status, AllocationStatus::Rejected);
        assert!(payment.allocations()[0].rejection_reason.is_some());

        // The whole amount is booked as a vendor advance.
        let lines = posting::vendor_payment(payment.applied(), payment.unapplied()).unwrap();
        assert!(lines.iter().all(|l| l.account.code != ironbooks_accounting::chart::ACCOUNTS_PAYABLE));

        services.shutdown();
    }
}
