//! End-to-end pipelines.
//!
//! - `collect_topology`: request → window → connector → adjacency list → store
//! - `build_prompt`: store (latest snapshot) + config → prompt document

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use meshctx_shared::{
    AdjacencyList, AppConfig, MeshCtxError, PromptDocument, Result, SnapshotId, TimeWindow,
    TopologyConfig,
};
use meshctx_storage::TopologyStore;

use crate::assembler::assemble_prompt;
use crate::connector::TopologyConnector;
use crate::window::resolve_window;

/// Parameters of one collection request.
///
/// Both bounds accept RFC 3339 or Unix seconds; empty strings count as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectParams {
    pub from_timestamp: Option<String>,
    pub to_timestamp: Option<String>,
}

/// Result of the `collect_topology` pipeline.
#[derive(Debug, Clone)]
pub struct CollectOutcome {
    /// The freshly collected adjacency list.
    pub adjacency_list: AdjacencyList,
    /// Identifier of the stored snapshot.
    pub snapshot_id: SnapshotId,
    /// When collection completed.
    pub collected_at: DateTime<Utc>,
    /// Name of the connector used.
    pub connector: String,
    /// Effective query window; `None` for an instant query.
    pub window: Option<TimeWindow>,
    /// Set only when the configured default window was applied.
    pub time_window_minutes: Option<u32>,
    /// Total elapsed time.
    pub elapsed: std::time::Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the collection completes.
    fn done(&self, outcome: &CollectOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _outcome: &CollectOutcome) {}
}

/// Collect the current topology and persist it as a new snapshot.
///
/// 1. Validate the configured source workloads
/// 2. Resolve the query window
/// 3. Fetch edges through the connector
/// 4. Save the snapshot
#[instrument(skip_all, fields(connector = connector.name(), store = store.name()))]
pub async fn collect_topology(
    connector: &dyn TopologyConnector,
    store: &dyn TopologyStore,
    topology: &TopologyConfig,
    params: &CollectParams,
    progress: &dyn ProgressReporter,
) -> Result<CollectOutcome> {
    let start = Instant::now();

    if topology.workloads.is_empty() {
        return Err(MeshCtxError::invalid_input(
            "no workloads configured under [topology]",
        ));
    }

    // --- Phase 1: Window ---
    progress.phase("Resolving time window");
    let window = resolve_window(
        params.from_timestamp.as_deref(),
        params.to_timestamp.as_deref(),
        topology.time_window_minutes,
    )?;
    let explicit = params.from_timestamp.as_deref().is_some_and(|s| !s.is_empty());
    if let Some(window) = &window {
        debug!(
            from = %window.from(),
            to = %window.to(),
            minutes = window.duration().num_minutes(),
            "resolved query window"
        );
    }
    let time_window_minutes = match (&window, explicit) {
        (Some(_), false) => topology.time_window_minutes,
        _ => None,
    };

    // --- Phase 2: Fetch ---
    progress.phase("Querying metrics backend");
    let adjacency_list = connector
        .fetch_topology(&topology.workloads, window.as_ref())
        .await?;
    if adjacency_list.is_empty() {
        warn!("no edges observed for the configured workloads");
    }

    // --- Phase 3: Persist ---
    progress.phase("Saving snapshot");
    let snapshot_id = store.save_snapshot(&adjacency_list).await?;

    let outcome = CollectOutcome {
        adjacency_list,
        snapshot_id,
        collected_at: Utc::now(),
        connector: connector.name().to_string(),
        window,
        time_window_minutes,
        elapsed: start.elapsed(),
    };

    info!(
        %snapshot_id,
        sources = outcome.adjacency_list.source_count(),
        edges = outcome.adjacency_list.edge_count(),
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        "topology collected"
    );
    progress.done(&outcome);
    Ok(outcome)
}

/// Build the prompt document from the latest stored snapshot.
///
/// With no snapshot yet, the document still lists every configured workload.
#[instrument(skip_all, fields(store = store.name()))]
pub async fn build_prompt(store: &dyn TopologyStore, config: &AppConfig) -> Result<PromptDocument> {
    let adjacency_list = match store.latest_adjacency_list().await? {
        Some(list) => list,
        None => {
            info!("no stored snapshot, assembling from configured workloads only");
            AdjacencyList::new()
        }
    };

    let document = assemble_prompt(&adjacency_list, config);
    info!(
        entries = document.context_definitions.len(),
        "built prompt document"
    );
    Ok(document)
}
