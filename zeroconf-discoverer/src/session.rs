use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use crate::engine::DiscoveryEngine;
use crate::error::DiscoveryError;
use crate::listeners::TypeListener;
use crate::report::{drain, ReportSink};
use crate::store::EventStore;

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub types_browsed: usize,
    pub records: usize,
    pub written: usize,
    pub failed: usize,
}

/// Listens for exactly `window`, then reports everything resolved so far.
pub async fn run_session<E>(
    engine: Arc<E>,
    window: Duration,
    sink: &mut dyn ReportSink,
) -> Result<SessionSummary, DiscoveryError>
where
    E: DiscoveryEngine + 'static,
{
    tracing::info!("Waiting {} seconds...", window.as_secs_f64());
    run_session_until(engine, tokio::time::sleep(window), sink).await
}

/// Same as [`run_session`] with an arbitrary deadline. Events that arrive
/// after `deadline` completes are not reported.
pub async fn run_session_until<E, F>(
    engine: Arc<E>,
    deadline: F,
    sink: &mut dyn ReportSink,
) -> Result<SessionSummary, DiscoveryError>
where
    E: DiscoveryEngine + 'static,
    F: Future<Output = ()>,
{
    let started_at = Utc::now();
    let store = Arc::new(EventStore::new());

    let handle: Arc<dyn DiscoveryEngine> = engine.clone();
    let type_listener = Arc::new(TypeListener::new(Arc::downgrade(&handle), store.clone()));

    let listener_id = match engine.add_service_type_listener(type_listener.clone()) {
        Ok(id) => id,
        Err(e) => {
            if let Err(close_err) = engine.close() {
                tracing::error!("Failed to release discovery engine: {}", close_err);
            }
            return Err(e);
        }
    };

    deadline.await;

    tracing::info!("Discovery window closed, cleaning up listeners");
    engine.remove_service_type_listener(listener_id);
    engine.unregister_all_services();
    let types_browsed = type_listener.browsed_count();
    tracing::debug!("Browsed types: {:?}", type_listener.browsed_types());
    type_listener.clear();

    if store.is_empty() {
        tracing::info!("No services resolved during the window");
    }
    tracing::info!("Writing {} events from {} service types", store.len(), types_browsed);
    let records = store.snapshot();
    let drained = drain(&records, sink);

    if let Err(e) = engine.close() {
        tracing::error!("Failed to release discovery engine: {}", e);
    }

    let summary = SessionSummary {
        started_at,
        finished_at: Utc::now(),
        types_browsed,
        records: records.len(),
        written: drained.written,
        failed: drained.failed,
    };

    tracing::info!(
        "Session finished: {} written, {} failed in {}s",
        summary.written,
        summary.failed,
        (summary.finished_at - summary.started_at).num_seconds()
    );

    Ok(summary)
}
