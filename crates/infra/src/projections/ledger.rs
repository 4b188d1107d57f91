//! General-ledger read models: account balances and the journal.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use ironbooks_accounting::{AccountKind, JournalEntryLine, LedgerEvent, PostingSource};
use ironbooks_core::{AggregateId, TenantId};
use ironbooks_events::EventEnvelope;

use super::{Projection, ProjectionError, StreamCursors};
use crate::read_model::{InMemoryTenantStore, TenantStore};

/// Per-account totals. `balance` is signed toward the account's normal side,
/// so a liability with more credits than debits reads positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountBalance {
    pub account_code: String,
    pub account_name: String,
    pub kind: AccountKind,
    pub debits: i64,
    pub credits: i64,
    pub balance: i64,
}

impl AccountBalance {
    fn add(&mut self, line: &JournalEntryLine) {
        if line.is_debit {
            self.debits += line.amount;
        } else {
            self.credits += line.amount;
        }
        self.balance = if self.kind.is_debit_normal() {
            self.debits - self.credits
        } else {
            self.credits - self.debits
        };
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalEntryView {
    pub entry_id: Uuid,
    pub description: Option<String>,
    pub source: Option<PostingSource>,
    pub lines: Vec<JournalEntryLine>,
    pub total: i64,
    pub reversed_by: Option<Uuid>,
    pub posted_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct LedgerProjection {
    balances: InMemoryTenantStore<String, AccountBalance>,
    // Keyed by (posted_at, entry_id) so listing yields posting order.
    journal: InMemoryTenantStore<(DateTime<Utc>, Uuid), JournalEntryView>,
    entry_index: InMemoryTenantStore<Uuid, DateTime<Utc>>,
    cursors: StreamCursors,
}

impl LedgerProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balances in account-code order.
    pub fn balances(&self, tenant_id: TenantId) -> Vec<AccountBalance> {
        self.balances.list(tenant_id)
    }

    pub fn balance(&self, tenant_id: TenantId, code: &str) -> Option<AccountBalance> {
        self.balances.get(tenant_id, &code.to_string())
    }

    pub fn journal(&self, tenant_id: TenantId) -> Vec<JournalEntryView> {
        self.journal.list(tenant_id)
    }

    pub fn entry(&self, tenant_id: TenantId, entry_id: Uuid) -> Option<JournalEntryView> {
        let posted_at = self.entry_index.get(tenant_id, &entry_id)?;
        self.journal.get(tenant_id, &(posted_at, entry_id))
    }

    /// Journal entries produced for one source document.
    pub fn entries_for_document(
        &self,
        tenant_id: TenantId,
        document_id: AggregateId,
    ) -> Vec<JournalEntryView> {
        self.journal
            .list(tenant_id)
            .into_iter()
            .filter(|e| e.source.as_ref().is_some_and(|s| s.document_id == document_id))
            .collect()
    }
}

impl Projection for LedgerProjection {
    type Event = LedgerEvent;

    const NAME: &'static str = "accounting.ledger";
    const AGGREGATE_TYPE: &'static str = "accounting.ledger";

    fn cursors(&self) -> &StreamCursors {
        &self.cursors
    }

    fn project(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        event: LedgerEvent,
    ) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();

        match event {
            LedgerEvent::JournalEntryPosted(e) => {
                for line in &e.lines {
                    let code = line.account.code.clone();
                    let mut row = self.balances.get(tenant_id, &code).unwrap_or(AccountBalance {
                        account_code: code.clone(),
                        account_name: line.account.name.clone(),
                        kind: line.account.kind,
                        debits: 0,
                        credits: 0,
                        balance: 0,
                    });
                    row.add(line);
                    self.balances.upsert(tenant_id, code, row);
                }

                let total = e.lines.iter().filter(|l| l.is_debit).map(|l| l.amount).sum();
                self.entry_index.upsert(tenant_id, e.entry_id, e.occurred_at);
                self.journal.upsert(
                    tenant_id,
                    (e.occurred_at, e.entry_id),
                    JournalEntryView {
                        entry_id: e.entry_id,
                        description: e.description,
                        source: e.source,
                        lines: e.lines,
                        total,
                        reversed_by: None,
                        posted_at: e.occurred_at,
                    },
                );
            }
            LedgerEvent::JournalEntryReversed(e) => {
                if let Some(posted_at) = self.entry_index.get(tenant_id, &e.entry_id) {
                    self.journal
                        .update(tenant_id, &(posted_at, e.entry_id), &mut |entry| {
                            entry.reversed_by = Some(e.reversal_id);
                        });
                }
            }
        }
        Ok(())
    }

    fn clear_rows(&self, tenant_id: TenantId) {
        self.balances.clear_tenant(tenant_id);
        self.journal.clear_tenant(tenant_id);
        self.entry_index.clear_tenant(tenant_id);
    }
}
