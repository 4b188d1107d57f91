//! Infrastructure wiring: event store, bus, dispatcher, read models and the
//! projection worker that connects them.

use std::{
    convert::Infallible,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};
use tracing::{info, warn};
use uuid::Uuid;

use ironbooks_accounting::{
    JournalEntryLine, Ledger, LedgerCommand, LedgerId, PostJournalEntry, PostingSource,
    ReverseJournalEntry,
};
use ironbooks_core::{Aggregate, AggregateId, TenantId};
use ironbooks_events::{Command, Event, EventEnvelope, InMemoryEventBus};
use ironbooks_infra::{
    command_dispatcher::{CommandDispatcher, DispatchError},
    event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent},
    projections::{ProjectionError, ReadModels, replay_all},
    workers::{ProjectionWorker, WorkerHandle},
};

use crate::config::ApiConfig;

pub type SharedBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type Dispatcher = CommandDispatcher<Arc<dyn EventStore>, SharedBus>;

/// Read-model update notification pushed over SSE.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeMessage {
    pub tenant_id: TenantId,
    pub topic: String,
    pub payload: JsonValue,
}

impl RealtimeMessage {
    fn projection_updated(env: &EventEnvelope<JsonValue>) -> Self {
        Self {
            tenant_id: env.tenant_id(),
            topic: format!("{}.projection_updated", env.aggregate_type()),
            payload: serde_json::json!({
                "kind": "projection_update",
                "aggregate_type": env.aggregate_type(),
                "aggregate_id": env.aggregate_id().to_string(),
                "event_type": env.event_type(),
                "sequence_number": env.sequence_number(),
            }),
        }
    }
}

/// A balanced set of lines and where they came from.
#[derive(Debug, Clone)]
pub struct JournalPosting {
    pub lines: Vec<JournalEntryLine>,
    pub description: String,
    pub source: Option<PostingSource>,
}

pub struct AppServices {
    dispatcher: Dispatcher,
    read_models: Arc<ReadModels>,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
    ledger_retry_limit: u32,
    worker: Mutex<Option<WorkerHandle>>,
}

impl AppServices {
    /// Open the event store, start the projection worker and replay history
    /// into the read models.
    pub async fn build(config: &ApiConfig) -> anyhow::Result<Self> {
        let store = open_store(config).await?;
        let bus: SharedBus = Arc::new(InMemoryEventBus::new());
        let read_models = Arc::new(ReadModels::new());

        // Realtime channel (SSE): lossy broadcast, tenant-filtered in handlers.
        let (realtime_tx, _realtime_rx) = broadcast::channel::<RealtimeMessage>(256);

        // Subscribe before replaying; cursors drop anything delivered twice.
        let worker = {
            let read_models = read_models.clone();
            let realtime_tx = realtime_tx.clone();
            ProjectionWorker::spawn(
                "ironbooks.read_models",
                &bus,
                None,
                move |env: EventEnvelope<JsonValue>| {
                    read_models.try_apply(&env)?;
                    let _ = realtime_tx.send(RealtimeMessage::projection_updated(&env));
                    Ok::<(), ProjectionError>(())
                },
            )?
        };

        let report = replay_all(store.as_ref(), &read_models).await?;
        info!(
            events = report.events,
            streams = report.streams,
            tenants = report.tenants,
            "read models rebuilt from event store"
        );

        Ok(Self {
            dispatcher: CommandDispatcher::new(store, bus),
            read_models,
            realtime_tx,
            ledger_retry_limit: config.ledger_retry_limit,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn read_models(&self) -> &ReadModels {
        &self.read_models
    }

    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        &self.realtime_tx
    }

    pub async fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate,
        A::Command: Command,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        self.dispatcher
            .dispatch(tenant_id, aggregate_id, command, make_aggregate)
            .await
    }

    /// Rehydrate one aggregate straight from its stream.
    pub async fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Option<A>, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        self.dispatcher.load(tenant_id, aggregate_id, make_aggregate).await
    }

    /// Post a journal entry to the tenant ledger. Returns the entry id, or
    /// `None` when there was nothing to post.
    pub async fn post_journal(
        &self,
        tenant_id: TenantId,
        posting: JournalPosting,
    ) -> Result<Option<Uuid>, DispatchError> {
        if posting.lines.is_empty() {
            return Ok(None);
        }

        let entry_id = Uuid::now_v7();
        self.dispatch_ledger(tenant_id, || {
            LedgerCommand::PostJournalEntry(PostJournalEntry {
                tenant_id,
                entry_id,
                lines: posting.lines.clone(),
                description: Some(posting.description.clone()),
                source: posting.source.clone(),
                occurred_at: Utc::now(),
            })
        })
        .await?;
        Ok(Some(entry_id))
    }

    /// Post the mirror of `entry_id`. Returns the reversal entry id.
    pub async fn reverse_journal(
        &self,
        tenant_id: TenantId,
        entry_id: Uuid,
        reason: Option<String>,
    ) -> Result<Uuid, DispatchError> {
        let reversal_id = Uuid::now_v7();
        self.dispatch_ledger(tenant_id, || {
            LedgerCommand::ReverseJournalEntry(ReverseJournalEntry {
                tenant_id,
                entry_id,
                reversal_id,
                reason: reason.clone(),
                occurred_at: Utc::now(),
            })
        })
        .await?;
        Ok(reversal_id)
    }

    /// Unreversed entries posted for one document, read from the ledger stream
    /// itself so a posting that projections have not seen yet is included.
    pub async fn unreversed_journal_entries(
        &self,
        tenant_id: TenantId,
        document_id: AggregateId,
    ) -> Result<Vec<Uuid>, DispatchError> {
        let ledger = self
            .load(tenant_id, LedgerId::for_tenant(tenant_id).aggregate_id(), |id| {
                Ledger::empty(LedgerId::from(id))
            })
            .await?;
        Ok(ledger
            .map(|l| l.unreversed_entries_for(document_id))
            .unwrap_or_default())
    }

    /// Every tenant shares one ledger stream, so concurrent postings race on
    /// its version. Losers reload and retry up to the configured limit.
    async fn dispatch_ledger(
        &self,
        tenant_id: TenantId,
        command: impl Fn() -> LedgerCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let ledger_id = LedgerId::for_tenant(tenant_id);
        let mut attempt = 1;
        loop {
            let result = self
                .dispatch(tenant_id, ledger_id.aggregate_id(), command(), |id| {
                    Ledger::empty(LedgerId::from(id))
                })
                .await;

            match result {
                Err(err) if err.is_concurrency() && attempt < self.ledger_retry_limit => {
                    warn!(tenant_id = %tenant_id, attempt, error = %err, "ledger append lost a race; retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Full event history of one aggregate, oldest first.
    pub async fn history(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.dispatcher
            .store()
            .load_stream(tenant_id, aggregate_id)
            .await
    }

    /// Stop the projection worker. Later calls are no-ops.
    pub fn shutdown(&self) {
        let handle = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(handle) = handle {
            handle.shutdown();
        }
    }
}

async fn open_store(config: &ApiConfig) -> anyhow::Result<Arc<dyn EventStore>> {
    #[cfg(feature = "postgres")]
    {
        if let Some(url) = config.database_url.as_deref() {
            let store = ironbooks_infra::event_store::PostgresEventStore::connect(url).await?;
            store.migrate().await?;
            info!("using postgres event store");
            return Ok(Arc::new(store));
        }
    }
    #[cfg(not(feature = "postgres"))]
    {
        if config.database_url.is_some() {
            warn!("DATABASE_URL is set but the postgres feature is off; events stay in memory");
        }
    }

    info!("using in-memory event store");
    Ok(Arc::new(InMemoryEventStore::new()))
}

pub fn tenant_sse_stream(
    services: Arc<AppServices>,
    tenant_id: TenantId,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(m) if m.tenant_id == tenant_id => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
