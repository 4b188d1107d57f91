//! Vendor bill aggregate.
//!
//! Totals are always derived from the lines: `total = subtotal + tax_total`,
//! and the due date from the bill date plus the payment terms.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use ironbooks_core::money::{self, Currency};
use ironbooks_core::{Aggregate, AggregateId, DomainError, DomainResult, TenantId, UserId, text, typed_id};
use ironbooks_events::Event;

use crate::payment::PaymentId;
use crate::terms::PaymentTerms;
use crate::vendor::VendorId;

typed_id!(
    /// Vendor bill identifier.
    BillId
);

/// Expense account used when a line does not name one.
pub const DEFAULT_EXPENSE_ACCOUNT: &str = "5000";

const MAX_LINES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    Draft,
    Open,
    PartiallyPaid,
    Paid,
    Void,
}

impl BillStatus {
    /// Approved and still owing money.
    pub fn is_payable(self) -> bool {
        matches!(self, BillStatus::Open | BillStatus::PartiallyPaid)
    }
}

/// Line as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillItemInput {
    pub description: String,
    pub quantity: i64,
    pub unit_price: i64,
    pub account_code: Option<String>,
    pub sku: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillItem {
    pub line_no: u32,
    pub description: String,
    pub quantity: i64,
    pub unit_price: i64,
    pub line_total: i64,
    pub account_code: String,
    pub sku: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxLineInput {
    pub name: String,
    pub rate_bps: u32,
}

/// Tax applied to the bill subtotal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxLine {
    pub name: String,
    pub rate_bps: u32,
    pub amount: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillTotals {
    pub subtotal: i64,
    pub tax_total: i64,
    pub total: i64,
}

/// Validate lines and taxes and compute every derived amount.
pub fn price_bill(
    items: &[BillItemInput],
    taxes: &[TaxLineInput],
) -> DomainResult<(Vec<BillItem>, Vec<TaxLine>, BillTotals)> {
    if items.len() > MAX_LINES {
        return Err(DomainError::validation(format!(
            "a bill can have at most {MAX_LINES} lines"
        )));
    }

    let mut priced = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let line_no = idx as u32 + 1;
        money::ensure_positive(&format!("line {line_no} quantity"), item.quantity)?;
        money::ensure_positive(&format!("line {line_no} unit_price"), item.unit_price)?;

        let account_code = match text::optional(item.account_code.as_deref()) {
            Some(code) if (4..=6).contains(&code.len()) && code.bytes().all(|b| b.is_ascii_digit()) => code,
            Some(code) => {
                return Err(DomainError::validation(format!(
                    "line {line_no} account code '{code}' must be 4-6 digits"
                )));
            }
            None => DEFAULT_EXPENSE_ACCOUNT.to_string(),
        };

        priced.push(BillItem {
            line_no,
            description: text::required_max(&format!("line {line_no} description"), &item.description, 500)?,
            quantity: item.quantity,
            unit_price: item.unit_price,
            line_total: money::checked_line_total(item.quantity, item.unit_price)?,
            account_code,
            sku: text::optional(item.sku.as_deref()),
        });
    }

    let subtotal = money::checked_sum(priced.iter().map(|i| i.line_total))?;

    let mut seen = HashSet::new();
    let mut tax_lines = Vec::with_capacity(taxes.len());
    for tax in taxes {
        let name = text::required_max("tax name", &tax.name, 100)?;
        if !seen.insert(name.to_ascii_lowercase()) {
            return Err(DomainError::validation(format!("duplicate tax line '{name}'")));
        }
        if tax.rate_bps > 10_000 {
            return Err(DomainError::validation(format!(
                "tax rate for '{name}' cannot exceed 100%"
            )));
        }
        tax_lines.push(TaxLine {
            amount: money::apply_rate_bps(subtotal, tax.rate_bps)?,
            name,
            rate_bps: tax.rate_bps,
        });
    }

    let tax_total = money::checked_sum(tax_lines.iter().map(|t| t.amount))?;
    let total = money::checked_sum([subtotal, tax_total])?;

    Ok((
        priced,
        tax_lines,
        BillTotals {
            subtotal,
            tax_total,
            total,
        },
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bill {
    id: BillId,
    tenant_id: Option<TenantId>,
    vendor_id: Option<VendorId>,
    bill_number: String,
    bill_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    terms: PaymentTerms,
    items: Vec<BillItem>,
    tax_lines: Vec<TaxLine>,
    totals: BillTotals,
    paid: i64,
    payments: HashSet<PaymentId>,
    status: BillStatus,
    version: u64,
    created: bool,
}

impl Bill {
    pub fn empty(id: BillId) -> Self {
        Self {
            id,
            tenant_id: None,
            vendor_id: None,
            bill_number: String::new(),
            bill_date: None,
            due_date: None,
            terms: PaymentTerms::default(),
            items: Vec::new(),
            tax_lines: Vec::new(),
            totals: BillTotals::default(),
            paid: 0,
            payments: HashSet::new(),
            status: BillStatus::Draft,
            version: 0,
            created: false,
        }
    }

    pub fn vendor_id(&self) -> Option<VendorId> {
        self.vendor_id
    }

    pub fn bill_number(&self) -> &str {
        &self.bill_number
    }

    pub fn bill_date(&self) -> Option<NaiveDate> {
        self.bill_date
    }

    pub fn terms(&self) -> PaymentTerms {
        self.terms
    }

    pub fn status(&self) -> BillStatus {
        self.status
    }

    pub fn totals(&self) -> BillTotals {
        self.totals
    }

    pub fn items(&self) -> &[BillItem] {
        &self.items
    }

    pub fn tax_lines(&self) -> &[TaxLine] {
        &self.tax_lines
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn paid(&self) -> i64 {
        self.paid
    }

    pub fn outstanding(&self) -> i64 {
        self.totals.total - self.paid
    }

    pub fn is_overdue(&self, as_of: NaiveDate) -> bool {
        self.status.is_payable() && self.due_date.is_some_and(|d| d < as_of)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBill {
    pub tenant_id: TenantId,
    pub vendor_id: VendorId,
    pub bill_number: String,
    pub bill_date: NaiveDate,
    pub terms: PaymentTerms,
    pub currency: String,
    pub items: Vec<BillItemInput>,
    pub tax_lines: Vec<TaxLineInput>,
    pub memo: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Replace the editable content of a draft bill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviseBill {
    pub tenant_id: TenantId,
    pub bill_date: NaiveDate,
    pub terms: PaymentTerms,
    pub items: Vec<BillItemInput>,
    pub tax_lines: Vec<TaxLineInput>,
    pub memo: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveBill {
    pub tenant_id: TenantId,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyPayment {
    pub tenant_id: TenantId,
    pub payment_id: PaymentId,
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidBill {
    pub tenant_id: TenantId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillCommand {
    Create(CreateBill),
    Revise(ReviseBill),
    Approve(ApproveBill),
    ApplyPayment(ApplyPayment),
    Void(VoidBill),
}

ironbooks_events::tenant_command!(BillCommand { Create, Revise, Approve, ApplyPayment, Void });

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillCreated {
    pub tenant_id: TenantId,
    pub bill_id: BillId,
    pub vendor_id: VendorId,
    pub bill_number: String,
    pub bill_date: NaiveDate,
    pub due_date: NaiveDate,
    pub terms: PaymentTerms,
    pub currency: Currency,
    pub items: Vec<BillItem>,
    pub tax_lines: Vec<TaxLine>,
    pub totals: BillTotals,
    pub memo: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillRevised {
    pub tenant_id: TenantId,
    pub bill_id: BillId,
    pub bill_date: NaiveDate,
    pub due_date: NaiveDate,
    pub terms: PaymentTerms,
    pub items: Vec<BillItem>,
    pub tax_lines: Vec<TaxLine>,
    pub totals: BillTotals,
    pub memo: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Carries the posting inputs so the GL entry can be built from the event alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillApproved {
    pub tenant_id: TenantId,
    pub bill_id: BillId,
    pub approved_by: UserId,
    pub items: Vec<BillItem>,
    pub totals: BillTotals,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentApplied {
    pub tenant_id: TenantId,
    pub bill_id: BillId,
    pub payment_id: PaymentId,
    pub amount: i64,
    pub paid_total: i64,
    pub outstanding: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillVoided {
    pub tenant_id: TenantId,
    pub bill_id: BillId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillEvent {
    Created(BillCreated),
    Revised(BillRevised),
    Approved(BillApproved),
    PaymentApplied(PaymentApplied),
    Voided(BillVoided),
}

impl Event for BillEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BillEvent::Created(_) => "payables.bill.created",
            BillEvent::Revised(_) => "payables.bill.revised",
            BillEvent::Approved(_) => "payables.bill.approved",
            BillEvent::PaymentApplied(_) => "payables.bill.payment_applied",
            BillEvent::Voided(_) => "payables.bill.voided",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BillEvent::Created(e) => e.occurred_at,
            BillEvent::Revised(e) => e.occurred_at,
            BillEvent::Approved(e) => e.occurred_at,
            BillEvent::PaymentApplied(e) => e.occurred_at,
            BillEvent::Voided(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Bill {
    type Command = BillCommand;
    type Event = BillEvent;

    const AGGREGATE_TYPE: &'static str = "payables.bill";

    fn id(&self) -> AggregateId {
        self.id.0
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BillEvent::Created(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.vendor_id = Some(e.vendor_id);
                self.bill_number = e.bill_number.clone();
                self.bill_date = Some(e.bill_date);
                self.due_date = Some(e.due_date);
                self.terms = e.terms;
                self.items = e.items.clone();
                self.tax_lines = e.tax_lines.clone();
                self.totals = e.totals;
                self.status = BillStatus::Draft;
                self.created = true;
            }
            BillEvent::Revised(e) => {
                self.bill_date = Some(e.bill_date);
                self.due_date = Some(e.due_date);
                self.terms = e.terms;
                self.items = e.items.clone();
                self.tax_lines = e.tax_lines.clone();
                self.totals = e.totals;
            }
            BillEvent::Approved(_) => self.status = BillStatus::Open,
            BillEvent::PaymentApplied(e) => {
                self.paid = e.paid_total;
                self.payments.insert(e.payment_id);
                self.status = if e.outstanding == 0 {
                    BillStatus::Paid
                } else {
                    BillStatus::PartiallyPaid
                };
            }
            BillEvent::Voided(_) => self.status = BillStatus::Void,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, DomainError> {
        match command {
            BillCommand::Create(cmd) => self.handle_create(cmd),
            BillCommand::Revise(cmd) => self.handle_revise(cmd),
            BillCommand::Approve(cmd) => self.handle_approve(cmd),
            BillCommand::ApplyPayment(cmd) => self.handle_apply_payment(cmd),
            BillCommand::Void(cmd) => self.handle_void(cmd),
        }
    }
}

impl Bill {
    fn ensure_exists(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateBill) -> Result<Vec<BillEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("bill already exists"));
        }
        let (items, tax_lines, totals) = price_bill(&cmd.items, &cmd.tax_lines)?;

        Ok(vec![BillEvent::Created(BillCreated {
            tenant_id: cmd.tenant_id,
            bill_id: self.id,
            vendor_id: cmd.vendor_id,
            bill_number: text::required_max("bill_number", &cmd.bill_number, 64)?,
            bill_date: cmd.bill_date,
            due_date: cmd.terms.due_date(cmd.bill_date)?,
            terms: cmd.terms,
            currency: Currency::parse(&cmd.currency)?,
            items,
            tax_lines,
            totals,
            memo: text::optional(cmd.memo.as_deref()),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revise(&self, cmd: &ReviseBill) -> Result<Vec<BillEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id)?;
        if self.status != BillStatus::Draft {
            return Err(DomainError::invariant("only draft bills can be revised"));
        }
        let (items, tax_lines, totals) = price_bill(&cmd.items, &cmd.tax_lines)?;

        Ok(vec![BillEvent::Revised(BillRevised {
            tenant_id: cmd.tenant_id,
            bill_id: self.id,
            bill_date: cmd.bill_date,
            due_date: cmd.terms.due_date(cmd.bill_date)?,
            terms: cmd.terms,
            items,
            tax_lines,
            totals,
            memo: text::optional(cmd.memo.as_deref()),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveBill) -> Result<Vec<BillEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id)?;
        if self.status != BillStatus::Draft {
            return Err(DomainError::invariant("only draft bills can be approved"));
        }
        if self.items.is_empty() {
            return Err(DomainError::invariant("cannot approve a bill without lines"));
        }

        Ok(vec![BillEvent::Approved(BillApproved {
            tenant_id: cmd.tenant_id,
            bill_id: self.id,
            approved_by: cmd.approved_by,
            items: self.items.clone(),
            totals: self.totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_apply_payment(&self, cmd: &ApplyPayment) -> Result<Vec<BillEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id)?;
        if !self.status.is_payable() {
            return Err(DomainError::invariant(format!(
                "cannot apply a payment to a bill in status {:?}",
                self.status
            )));
        }
        if self.payments.contains(&cmd.payment_id) {
            return Err(DomainError::conflict("payment already applied to this bill"));
        }
        money::ensure_positive("payment amount", cmd.amount)?;

        let outstanding = self.outstanding();
        if cmd.amount > outstanding {
            return Err(DomainError::invariant(format!(
                "payment of {} exceeds outstanding balance of {outstanding}",
                cmd.amount
            )));
        }

        let paid_total = self.paid + cmd.amount;
        Ok(vec![BillEvent::PaymentApplied(PaymentApplied {
            tenant_id: cmd.tenant_id,
            bill_id: self.id,
            payment_id: cmd.payment_id,
            amount: cmd.amount,
            paid_total,
            outstanding: self.totals.total - paid_total,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void(&self, cmd: &VoidBill) -> Result<Vec<BillEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id)?;
        match self.status {
            BillStatus::Draft => {}
            BillStatus::Open if self.paid == 0 => {}
            BillStatus::Void => return Err(DomainError::invariant("bill is already void")),
            _ => {
                return Err(DomainError::invariant(
                    "bills with applied payments cannot be voided",
                ));
            }
        }

        Ok(vec![BillEvent::Voided(BillVoided {
            tenant_id: cmd.tenant_id,
            bill_id: self.id,
            reason: text::optional(cmd.reason.as_deref()),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn item(quantity: i64, unit_price: i64) -> BillItemInput {
        BillItemInput {
            description: "Widgets".to_string(),
            quantity,
            unit_price,
            account_code: None,
            sku: Some("W-1".to_string()),
        }
    }

    fn create_cmd(tenant_id: TenantId) -> BillCommand {
        BillCommand::Create(CreateBill {
            tenant_id,
            vendor_id: VendorId::generate(),
            bill_number: "INV-1001".to_string(),
            bill_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            terms: PaymentTerms::net(30).unwrap(),
            currency: "USD".to_string(),
            items: vec![item(10, 1_250), item(2, 500)],
            tax_lines: vec![TaxLineInput {
                name: "State".to_string(),
                rate_bps: 825,
            }],
            memo: None,
            occurred_at: Utc::now(),
        })
    }

    fn exec(bill: &mut Bill, cmd: BillCommand) -> Result<Vec<BillEvent>, DomainError> {
        let events = bill.handle(&cmd)?;
        for e in &events {
            bill.apply(e);
        }
        Ok(events)
    }

    fn approved_bill(tenant_id: TenantId) -> Bill {
        let mut bill = Bill::empty(BillId::generate());
        exec(&mut bill, create_cmd(tenant_id)).unwrap();
        exec(
            &mut bill,
            BillCommand::Approve(ApproveBill {
                tenant_id,
                approved_by: UserId::new(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        bill
    }

    fn pay(tenant_id: TenantId, amount: i64) -> BillCommand {
        BillCommand::ApplyPayment(ApplyPayment {
            tenant_id,
            payment_id: PaymentId::generate(),
            amount,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn create_computes_totals_and_due_date() {
        let mut bill = Bill::empty(BillId::generate());
        exec(&mut bill, create_cmd(test_tenant_id())).unwrap();

        // 10 × 12.50 + 2 × 5.00 = 135.00; 8.25% = 11.1375 -> 11.14
        assert_eq!(bill.totals().subtotal, 13_500);
        assert_eq!(bill.totals().tax_total, 1_114);
        assert_eq!(bill.totals().total, 14_614);
        assert_eq!(bill.due_date(), NaiveDate::from_ymd_opt(2026, 3, 31));
        assert_eq!(bill.items()[1].line_no, 2);
        assert_eq!(bill.items()[0].account_code, DEFAULT_EXPENSE_ACCOUNT);
        assert_eq!(bill.status(), BillStatus::Draft);
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let result = price_bill(&[item(0, 100)], &[]);
        assert!(matches!(result, Err(DomainError::Validation(_))));
        let result = price_bill(&[item(1, -5)], &[]);
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn approve_requires_lines_and_draft() {
        let tenant_id = test_tenant_id();
        let mut bill = Bill::empty(BillId::generate());
        let mut cmd = create_cmd(tenant_id);
        if let BillCommand::Create(c) = &mut cmd {
            c.items.clear();
            c.tax_lines.clear();
        }
        exec(&mut bill, cmd).unwrap();

        let approve = BillCommand::Approve(ApproveBill {
            tenant_id,
            approved_by: UserId::new(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(exec(&mut bill, approve.clone()), Err(DomainError::InvariantViolation(_))));

        let approved = approved_bill(tenant_id);
        assert_eq!(approved.status(), BillStatus::Open);
        assert!(approved.handle(&approve).is_err());
    }

    #[test]
    fn payments_move_bill_to_paid() {
        let tenant_id = test_tenant_id();
        let mut bill = approved_bill(tenant_id);

        exec(&mut bill, pay(tenant_id, 4_614)).unwrap();
        assert_eq!(bill.status(), BillStatus::PartiallyPaid);
        assert_eq!(bill.outstanding(), 10_000);

        let err = exec(&mut bill, pay(tenant_id, 10_001)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        exec(&mut bill, pay(tenant_id, 10_000)).unwrap();
        assert_eq!(bill.status(), BillStatus::Paid);
        assert_eq!(bill.outstanding(), 0);
        assert!(exec(&mut bill, pay(tenant_id, 1)).is_err());
    }

    #[test]
    fn same_payment_cannot_apply_twice() {
        let tenant_id = test_tenant_id();
        let mut bill = approved_bill(tenant_id);
        let cmd = pay(tenant_id, 100);
        exec(&mut bill, cmd.clone()).unwrap();
        assert!(matches!(exec(&mut bill, cmd), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn draft_bills_cannot_be_paid_and_paid_bills_cannot_be_voided() {
        let tenant_id = test_tenant_id();
        let mut draft = Bill::empty(BillId::generate());
        exec(&mut draft, create_cmd(tenant_id)).unwrap();
        assert!(exec(&mut draft, pay(tenant_id, 100)).is_err());

        let mut bill = approved_bill(tenant_id);
        exec(&mut bill, pay(tenant_id, 100)).unwrap();
        let void = BillCommand::Void(VoidBill {
            tenant_id,
            reason: None,
            occurred_at: Utc::now(),
        });
        assert!(exec(&mut bill, void.clone()).is_err());

        let mut unpaid = approved_bill(tenant_id);
        exec(&mut unpaid, void).unwrap();
        assert_eq!(unpaid.status(), BillStatus::Void);
    }

    #[test]
    fn revise_only_in_draft() {
        let tenant_id = test_tenant_id();
        let mut bill = Bill::empty(BillId::generate());
        exec(&mut bill, create_cmd(tenant_id)).unwrap();

        let revise = BillCommand::Revise(ReviseBill {
            tenant_id,
            bill_date: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            terms: PaymentTerms::DUE_ON_RECEIPT,
            items: vec![item(1, 1_000)],
            tax_lines: vec![],
            memo: Some("corrected".to_string()),
            occurred_at: Utc::now(),
        });
        exec(&mut bill, revise.clone()).unwrap();
        assert_eq!(bill.totals().total, 1_000);
        assert_eq!(bill.due_date(), NaiveDate::from_ymd_opt(2026, 3, 10));

        let approved = approved_bill(tenant_id);
        assert!(approved.handle(&revise).is_err());
    }

    #[test]
    fn overdue_only_when_payable() {
        let tenant_id = test_tenant_id();
        let bill = approved_bill(tenant_id);
        let after_due = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
        assert!(bill.is_overdue(after_due));
        assert!(!bill.is_overdue(NaiveDate::from_ymd_opt(2026, 3, 31).unwrap()));

        let mut draft = Bill::empty(BillId::generate());
        exec(&mut draft, create_cmd(tenant_id)).unwrap();
        assert!(!draft.is_overdue(after_due));
    }

    proptest! {
        #[test]
        fn total_is_subtotal_plus_tax(
            lines in prop::collection::vec((1i64..1_000, 1i64..1_000_000), 1..20),
            rates in prop::collection::vec(0u32..=10_000, 0..4),
        ) {
            let items: Vec<_> = lines.iter().map(|(q, p)| item(*q, *p)).collect();
            let taxes: Vec<_> = rates
                .iter()
                .enumerate()
                .map(|(i, r)| TaxLineInput { name: format!("T{i}"), rate_bps: *r })
                .collect();

            let (priced, tax_lines, totals) = price_bill(&items, &taxes).unwrap();

            let subtotal: i64 = priced.iter().map(|i| i.line_total).sum();
            let tax: i64 = tax_lines.iter().map(|t| t.amount).sum();
            prop_assert_eq!(totals.subtotal, subtotal);
            prop_assert_eq!(totals.tax_total, tax);
            prop_assert_eq!(totals.total, subtotal + tax);
        }
    }
}
