//! Outgoing vendor payment and its allocation across bills.
//!
//! Allocations are accepted when the payment is recorded; the API then applies
//! each one to its bill and records a rejection if the bill refuses it.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use ironbooks_core::money::{self, Currency};
use ironbooks_core::{Aggregate, AggregateId, DomainError, TenantId, UserId, text, typed_id};
use ironbooks_events::Event;

use crate::bill::BillId;
use crate::vendor::VendorId;

typed_id!(
    /// Vendor payment identifier.
    PaymentId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Check,
    Ach,
    Wire,
    Card,
    Cash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStatus {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub bill_id: BillId,
    pub amount: i64,
    #[serde(default = "accepted")]
    pub status: AllocationStatus,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

fn accepted() -> AllocationStatus {
    AllocationStatus::Accepted
}

impl Allocation {
    pub fn new(bill_id: BillId, amount: i64) -> Self {
        Self {
            bill_id,
            amount,
            status: AllocationStatus::Accepted,
            rejection_reason: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    id: PaymentId,
    tenant_id: Option<TenantId>,
    vendor_id: Option<VendorId>,
    amount: i64,
    allocations: Vec<Allocation>,
    version: u64,
    created: bool,
}

impl Payment {
    pub fn empty(id: PaymentId) -> Self {
        Self {
            id,
            tenant_id: None,
            vendor_id: None,
            amount: 0,
            allocations: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn vendor_id(&self) -> Option<VendorId> {
        self.vendor_id
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    /// Sum of allocations that were not rejected.
    pub fn applied(&self) -> i64 {
        self.allocations
            .iter()
            .filter(|a| a.status == AllocationStatus::Accepted)
            .map(|a| a.amount)
            .sum()
    }

    pub fn unapplied(&self) -> i64 {
        self.amount - self.applied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub tenant_id: TenantId,
    pub vendor_id: VendorId,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub allocations: Vec<Allocation>,
    pub recorded_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Compensation: the bill refused its allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectAllocation {
    pub tenant_id: TenantId,
    pub bill_id: BillId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentCommand {
    Record(RecordPayment),
    RejectAllocation(RejectAllocation),
}

ironbooks_events::tenant_command!(PaymentCommand { Record, RejectAllocation });

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub tenant_id: TenantId,
    pub payment_id: PaymentId,
    pub vendor_id: VendorId,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub amount: i64,
    pub currency: Currency,
    pub allocations: Vec<Allocation>,
    pub recorded_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRejected {
    pub tenant_id: TenantId,
    pub payment_id: PaymentId,
    pub bill_id: BillId,
    pub amount: i64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentEvent {
    Recorded(PaymentRecorded),
    AllocationRejected(AllocationRejected),
}

impl Event for PaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentEvent::Recorded(_) => "payables.payment.recorded",
            PaymentEvent::AllocationRejected(_) => "payables.payment.allocation_rejected",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PaymentEvent::Recorded(e) => e.occurred_at,
            PaymentEvent::AllocationRejected(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Payment {
    type Command = PaymentCommand;
    type Event = PaymentEvent;

    const AGGREGATE_TYPE: &'static str = "payables.payment";

    fn id(&self) -> AggregateId {
        self.id.0
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PaymentEvent::Recorded(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.vendor_id = Some(e.vendor_id);
                self.amount = e.amount;
                self.allocations = e.allocations.clone();
                self.created = true;
            }
            PaymentEvent::AllocationRejected(e) => {
                if let Some(a) = self.allocations.iter_mut().find(|a| a.bill_id == e.bill_id) {
                    a.status = AllocationStatus::Rejected;
                    a.rejection_reason = Some(e.reason.clone());
                }
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, DomainError> {
        match command {
            PaymentCommand::Record(cmd) => self.handle_record(cmd),
            PaymentCommand::RejectAllocation(cmd) => self.handle_reject(cmd),
        }
    }
}

impl Payment {
    fn handle_record(&self, cmd: &RecordPayment) -> Result<Vec<PaymentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("payment already recorded"));
        }
        money::ensure_positive("amount", cmd.amount)?;

        let mut seen = HashSet::new();
        for a in &cmd.allocations {
            money::ensure_positive("allocation amount", a.amount)?;
            if !seen.insert(a.bill_id) {
                return Err(DomainError::validation(format!(
                    "bill {} is allocated more than once",
                    a.bill_id
                )));
            }
        }
        let allocated = money::checked_sum(cmd.allocations.iter().map(|a| a.amount))?;
        if allocated > cmd.amount {
            return Err(DomainError::invariant(format!(
                "allocations total {allocated} exceeds payment amount {}",
                cmd.amount
            )));
        }

        Ok(vec![PaymentEvent::Recorded(PaymentRecorded {
            tenant_id: cmd.tenant_id,
            payment_id: self.id,
            vendor_id: cmd.vendor_id,
            payment_date: cmd.payment_date,
            method: cmd.method,
            reference: text::optional(cmd.reference.as_deref()),
            amount: cmd.amount,
            currency: Currency::parse(&cmd.currency)?,
            allocations: cmd
                .allocations
                .iter()
                .map(|a| Allocation::new(a.bill_id, a.amount))
                .collect(),
            recorded_by: cmd.recorded_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectAllocation) -> Result<Vec<PaymentEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(cmd.tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        let Some(allocation) = self.allocations.iter().find(|a| a.bill_id == cmd.bill_id) else {
            return Err(DomainError::invariant("bill is not allocated on this payment"));
        };
        if allocation.status == AllocationStatus::Rejected {
            return Ok(vec![]);
        }

        Ok(vec![PaymentEvent::AllocationRejected(AllocationRejected {
            tenant_id: cmd.tenant_id,
            payment_id: self.id,
            bill_id: cmd.bill_id,
            amount: allocation.amount,
            reason: text::required("reason", &cmd.reason)?,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(tenant_id: TenantId, amount: i64, allocations: Vec<Allocation>) -> PaymentCommand {
        PaymentCommand::Record(RecordPayment {
            tenant_id,
            vendor_id: VendorId::generate(),
            payment_date: NaiveDate::from_ymd_opt(2026, 4, 2).unwrap(),
            method: PaymentMethod::Ach,
            reference: Some("ACH-778".to_string()),
            amount,
            currency: "USD".to_string(),
            allocations,
            recorded_by: UserId::new(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn allocations_cannot_exceed_amount() {
        let payment = Payment::empty(PaymentId::generate());
        let cmd = record(
            TenantId::new(),
            1_000,
            vec![
                Allocation::new(BillId::generate(), 600),
                Allocation::new(BillId::generate(), 401),
            ],
        );
        assert!(matches!(payment.handle(&cmd), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn duplicate_bills_and_zero_amounts_are_rejected() {
        let payment = Payment::empty(PaymentId::generate());
        let bill = BillId::generate();
        let dup = record(
            TenantId::new(),
            1_000,
            vec![Allocation::new(bill, 100), Allocation::new(bill, 100)],
        );
        assert!(matches!(payment.handle(&dup), Err(DomainError::Validation(_))));

        let zero = record(TenantId::new(), 1_000, vec![Allocation::new(bill, 0)]);
        assert!(matches!(payment.handle(&zero), Err(DomainError::Validation(_))));
    }

    #[test]
    fn rejection_moves_amount_back_to_unapplied() {
        let tenant_id = TenantId::new();
        let bill_a = BillId::generate();
        let bill_b = BillId::generate();
        let mut payment = Payment::empty(PaymentId::generate());
        for e in payment
            .handle(&record(
                tenant_id,
                1_000,
                vec![Allocation::new(bill_a, 600), Allocation::new(bill_b, 300)],
            ))
            .unwrap()
        {
            payment.apply(&e);
        }
        assert_eq!(payment.applied(), 900);
        assert_eq!(payment.unapplied(), 100);

        let reject = PaymentCommand::RejectAllocation(RejectAllocation {
            tenant_id,
            bill_id: bill_b,
            reason: "bill was voided".to_string(),
            occurred_at: Utc::now(),
        });
        for e in payment.handle(&reject).unwrap() {
            payment.apply(&e);
        }
        assert_eq!(payment.applied(), 600);
        assert_eq!(payment.unapplied(), 400);
        assert!(payment.handle(&reject).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn accepted_payments_never_over_allocate(
            amount in 1i64..10_000_000,
            parts in prop::collection::vec(1i64..5_000_000, 0..6),
        ) {
            let payment = Payment::empty(PaymentId::generate());
            let allocations: Vec<_> = parts.iter().map(|p| Allocation::new(BillId::generate(), *p)).collect();
            let total: i64 = parts.iter().sum();

            match payment.handle(&record(TenantId::new(), amount, allocations)) {
                Ok(events) => {
                    prop_assert!(total <= amount);
                    let PaymentEvent::Recorded(e) = &events[0] else { unreachable!() };
                    prop_assert_eq!(e.allocations.iter().map(|a| a.amount).sum::<i64>(), total);
                }
                Err(_) => prop_assert!(total > amount),
            }
        }
    }
}
