use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use ironbooks_core::TenantId;
use ironbooks_events::{EventBus, Subscription, TenantScoped};

/// Handle to stop and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request shutdown and wait for the worker thread to exit.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Thread that drains a bus subscription into a handler.
///
/// Handlers must tolerate redelivery. A failing handler is logged and the loop
/// continues with the next message.
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// Subscribe to `bus` and spawn the worker thread.
    ///
    /// With `tenant_id` set, messages for other tenants are skipped.
    pub fn spawn<M, B, H, E>(
        name: &'static str,
        bus: &B,
        tenant_id: Option<TenantId>,
        mut handler: H,
    ) -> io::Result<WorkerHandle>
    where
        M: TenantScoped + Send + 'static,
        B: EventBus<M> + ?Sized,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Display + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<M> = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, tenant_id, &mut handler))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<M, H, E>(
    name: &'static str,
    sub: Subscription<M>,
    shutdown_rx: mpsc::Receiver<()>,
    tenant_id: Option<TenantId>,
    handler: &mut H,
) where
    M: TenantScoped,
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Display,
{
    let tick = Duration::from_millis(100);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            debug!(worker = name, "worker shutting down");
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => {
                if tenant_id.is_some_and(|t| msg.tenant_id() != t) {
                    continue;
                }
                if let Err(err) = handler(msg) {
                    warn!(worker = name, error = %err, "worker handler failed");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    use chrono::Utc;
    use ironbooks_core::AggregateId;
    use ironbooks_events::{EventEnvelope, InMemoryEventBus};
    use serde_json::Value as JsonValue;
    use uuid::Uuid;

    use super::*;

    fn env(tenant_id: TenantId) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            AggregateId::new(),
            "test.thing",
            1,
            "test.thing.happened",
            Utc::now(),
            JsonValue::Null,
        )
    }

    #[test]
    fn filters_by_tenant_and_stops_on_shutdown() {
        let bus = InMemoryEventBus::<EventEnvelope<JsonValue>>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (mine, other) = (TenantId::new(), TenantId::new());

        let sink = seen.clone();
        let handle = ProjectionWorker::spawn("test-worker", &bus, Some(mine), move |m: EventEnvelope<JsonValue>| {
            sink.lock().unwrap().push(m.tenant_id());
            Ok::<_, String>(())
        })
        .unwrap();

        bus.publish(env(other)).unwrap();
        bus.publish(env(mine)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while seen.lock().unwrap().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        handle.shutdown();

        assert_eq!(*seen.lock().unwrap(), vec![mine]);
    }
}
