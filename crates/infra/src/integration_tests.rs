//! Command -> event store -> bus -> read models, end to end in memory.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, Utc};
    use serde_json::Value as JsonValue;
    use uuid::Uuid;

    use ironbooks_accounting::{
        Ledger, LedgerCommand, LedgerId, PostJournalEntry, PostingSource, chart, posting,
    };
    use ironbooks_core::{AggregateId, TenantId, UserId};
    use ironbooks_costing::revaluation::RevaluationId;
    use ironbooks_costing::standard_cost::{
        ApplyRevaluation, EstablishStandardCost, RevertRevaluation, StandardCost,
        StandardCostCommand, StandardCostId,
    };
    use ironbooks_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
    use ironbooks_payables::{
        ApproveBill, Bill, BillCommand, BillId, BillItemInput, BillStatus, Contact, CreateBill,
        PaymentTerms, RegisterVendor, TaxLineInput, Vendor, VendorCommand, VendorId,
    };
    use ironbooks_reporting::{Metric, evaluate};

    use crate::command_dispatcher::{CommandDispatcher, DispatchError};
    use crate::event_store::{EventStore, InMemoryEventStore};
    use crate::projections::{ReadModels, replay_all};

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

    struct Harness {
        dispatcher: CommandDispatcher<Arc<InMemoryEventStore>, Bus>,
        models: ReadModels,
        sub: Subscription<EventEnvelope<JsonValue>>,
    }

    impl Harness {
        fn new() -> Self {
            let bus: Bus = Arc::new(InMemoryEventBus::new());
            let sub = bus.subscribe();
            Self {
                dispatcher: CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), bus),
                models: ReadModels::new(),
                sub,
            }
        }

        fn drain(&self) {
            while let Ok(env) = self.sub.try_recv() {
                assert!(self.models.apply(&env));
            }
        }
    }

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    async fn register_vendor(h: &Harness, tenant_id: TenantId, code: &str) -> VendorId {
        let id = VendorId::generate();
        let cmd = VendorCommand::Register(RegisterVendor {
            tenant_id,
            code: code.to_string(),
            name: format!("Vendor {code}"),
            contact: Contact::default(),
            default_terms: PaymentTerms::net(30).unwrap(),
            currency: "USD".to_string(),
            occurred_at: Utc::now(),
        });
        h.dispatcher
            .dispatch(tenant_id, id.aggregate_id(), cmd, |a| Vendor::empty(a.into()))
            .await
            .unwrap();
        id
    }

    async fn create_bill(h: &Harness, tenant_id: TenantId, vendor_id: VendorId, number: &str) -> BillId {
        let id = BillId::generate();
        let cmd = BillCommand::Create(CreateBill {
            tenant_id,
            vendor_id,
            bill_number: number.to_string(),
            bill_date: date(3, 1),
            terms: PaymentTerms::net(30).unwrap(),
            currency: "USD".to_string(),
            items: vec![BillItemInput {
                description: "Widgets".to_string(),
                quantity: 4,
                unit_price: 2_500,
                account_code: None,
                sku: None,
            }],
            tax_lines: vec![TaxLineInput {
                name: "VAT".to_string(),
                rate_bps: 1_000,
            }],
            memo: None,
            occurred_at: Utc::now(),
        });
        h.dispatcher
            .dispatch(tenant_id, id.aggregate_id(), cmd, |a| Bill::empty(a.into()))
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn bill_lifecycle_reaches_read_models() {
        let h = Harness::new();
        let tenant_id = TenantId::new();
        let vendor_id = register_vendor(&h, tenant_id, "ACME").await;
        let bill_id = create_bill(&h, tenant_id, vendor_id, "INV-1").await;
        h.drain();

        let bill = h.models.bills.get(tenant_id, bill_id).unwrap();
        assert_eq!(bill.subtotal, 10_000);
        assert_eq!(bill.tax_total, 1_000);
        assert_eq!(bill.total, 11_000);
        assert_eq!(bill.due_date, date(3, 31));
        assert_eq!(bill.status, BillStatus::Draft);
        assert!(h.models.bills.find_by_number(tenant_id, vendor_id, "INV-1").is_some());
        assert!(h.models.vendors.find_by_code(tenant_id, "acme").is_some());

        let approve = BillCommand::Approve(ApproveBill {
            tenant_id,
            approved_by: UserId::new(),
            occurred_at: Utc::now(),
        });
        h.dispatcher
            .dispatch(tenant_id, bill_id.aggregate_id(), approve, |a| Bill::empty(a.into()))
            .await
            .unwrap();
        h.drain();

        let bill = h.models.bills.get(tenant_id, bill_id).unwrap();
        assert_eq!(bill.status, BillStatus::Open);
        let metrics = h.models.metrics(tenant_id);
        assert_eq!(evaluate(Metric::ApOutstanding, &metrics, date(3, 15)).value, 11_000);
        assert_eq!(evaluate(Metric::ApOverdue, &metrics, date(4, 15)).value, 11_000);
        assert_eq!(h.models.bills.aging(tenant_id, date(4, 15)).days_1_30, 11_000);
    }

    #[tokio::test]
    async fn journal_postings_update_balances() {
        let h = Harness::new();
        let tenant_id = TenantId::new();
        let ledger_id = LedgerId::for_tenant(tenant_id);
        let document_id = AggregateId::new();

        let lines = posting::bill_approval([("5000", 10_000)], 1_000).unwrap();
        let cmd = LedgerCommand::PostJournalEntry(PostJournalEntry {
            tenant_id,
            entry_id: Uuid::now_v7(),
            lines,
            description: Some("Bill INV-1".to_string()),
            source: Some(PostingSource::new("bill", document_id)),
            occurred_at: Utc::now(),
        });
        h.dispatcher
            .dispatch(tenant_id, ledger_id.aggregate_id(), cmd, |a| Ledger::empty(a.into()))
            .await
            .unwrap();
        h.drain();

        let ap = h.models.ledger.balance(tenant_id, chart::ACCOUNTS_PAYABLE).unwrap();
        assert_eq!(ap.credits, 11_000);
        assert_eq!(ap.balance, 11_000);
        let expense = h.models.ledger.balance(tenant_id, chart::GENERAL_EXPENSE).unwrap();
        assert_eq!(expense.balance, 10_000);

        let journal = h.models.ledger.journal(tenant_id);
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].total, 11_000);
        assert_eq!(h.models.ledger.entries_for_document(tenant_id, document_id).len(), 1);
    }

    #[tokio::test]
    async fn read_models_stay_per_tenant() {
        let h = Harness::new();
        let (t1, t2) = (TenantId::new(), TenantId::new());
        register_vendor(&h, t1, "ACME").await;
        register_vendor(&h, t2, "ACME").await;
        register_vendor(&h, t2, "GLOBEX").await;
        h.drain();

        assert_eq!(h.models.vendors.list(t1).len(), 1);
        assert_eq!(h.models.vendors.list(t2).len(), 2);
    }

    #[tokio::test]
    async fn stale_writer_gets_a_conflict() {
        let h = Harness::new();
        let tenant_id = TenantId::new();
        let vendor_id = register_vendor(&h, tenant_id, "ACME").await;

        // A second registration on the same stream is refused by the aggregate.
        let again = VendorCommand::Register(RegisterVendor {
            tenant_id,
            code: "ACME".to_string(),
            name: "Acme".to_string(),
            contact: Contact::default(),
            default_terms: PaymentTerms::default(),
            currency: "USD".to_string(),
            occurred_at: Utc::now(),
        });
        let err = h
            .dispatcher
            .dispatch(tenant_id, vendor_id.aggregate_id(), again, |a| Vendor::empty(a.into()))
            .await
            .unwrap_err();
        assert!(err.is_concurrency(), "unexpected error {err:?}");
        assert!(!matches!(err, DispatchError::Store(_)));
    }

    #[tokio::test]
    async fn replay_rebuilds_identical_read_models() {
        let h = Harness::new();
        let tenant_id = TenantId::new();
        let vendor_id = register_vendor(&h, tenant_id, "ACME").await;
        create_bill(&h, tenant_id, vendor_id, "INV-1").await;
        create_bill(&h, tenant_id, vendor_id, "INV-2").await;
        h.drain();

        let rebuilt = ReadModels::new();
        let report = replay_all(h.dispatcher.store(), &rebuilt).await.unwrap();
        assert_eq!(report.events, 3);
        assert_eq!(report.streams, 3);
        assert_eq!(report.tenants, 1);

        assert_eq!(rebuilt.bills.list(tenant_id), h.models.bills.list(tenant_id));
        assert_eq!(rebuilt.vendors.list(tenant_id), h.models.vendors.list(tenant_id));

        // Replaying the same envelopes through the live models is a no-op.
        for stored in h.dispatcher.store().load_all().await.unwrap() {
            assert!(h.models.apply(&stored.to_envelope()));
        }
        assert_eq!(h.models.bills.list(tenant_id).len(), 2);
    }

    #[tokio::test]
    async fn ledger_stream_knows_document_entries_before_projection() {
        let h = Harness::new();
        let tenant_id = TenantId::new();
        let ledger_id = LedgerId::for_tenant(tenant_id);
        let document_id = AggregateId::new();
        let entry_id = Uuid::now_v7();

        let cmd = LedgerCommand::PostJournalEntry(PostJournalEntry {
            tenant_id,
            entry_id,
            lines: posting::bill_approval([("5000", 2_000)], 0).unwrap(),
            description: None,
            source: Some(PostingSource::new("bill", document_id)),
            occurred_at: Utc::now(),
        });
        h.dispatcher
            .dispatch(tenant_id, ledger_id.aggregate_id(), cmd, |a| Ledger::empty(a.into()))
            .await
            .unwrap();

        // Nothing drained yet.
        assert!(h.models.ledger.entries_for_document(tenant_id, document_id).is_empty());

        let ledger = h
            .dispatcher
            .load(tenant_id, ledger_id.aggregate_id(), |a| Ledger::empty(a.into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ledger.unreversed_entries_for(document_id), vec![entry_id]);
    }

    #[tokio::test]
    async fn reverted_revaluation_restores_standard_cost_view() {
        let h = Harness::new();
        let tenant_id = TenantId::new();
        let id = StandardCostId::generate();
        let revaluation_id = RevaluationId::generate();

        let commands = [
            StandardCostCommand::Establish(EstablishStandardCost {
                tenant_id,
                sku: "BOLT-M8".to_string(),
                description: "M8 hex bolt".to_string(),
                unit_cost: 125,
                effective_from: date(1, 1),
                occurred_at: Utc::now(),
            }),
            StandardCostCommand::ApplyRevaluation(ApplyRevaluation {
                tenant_id,
                revaluation_id,
                expected_unit_cost: 125,
                new_unit_cost: 140,
                effective_from: date(7, 1),
                occurred_at: Utc::now(),
            }),
            StandardCostCommand::RevertRevaluation(RevertRevaluation {
                tenant_id,
                revaluation_id,
                occurred_at: Utc::now(),
            }),
        ];
        for cmd in commands {
            h.dispatcher
                .dispatch(tenant_id, id.aggregate_id(), cmd, |a| StandardCost::empty(a.into()))
                .await
                .unwrap();
        }
        h.drain();

        let view = h.models.standard_costs.get(tenant_id, id).unwrap();
        assert_eq!(view.unit_cost, 125);
        assert_eq!(view.effective_from, date(1, 1));
        assert_eq!(view.history.len(), 1);
    }
}
