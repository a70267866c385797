//! Folds request-flow samples into a workload adjacency list.
//!
//! Telemetry is noisy: series without a source or destination workload
//! (unknown callers, failed DNS, passthrough traffic) are skipped rather
//! than reported as errors.

use tracing::{debug, info, instrument};

use meshctx_shared::{AdjacencyList, EdgeSample, Workload};

/// Build the adjacency list for `samples`.
///
/// Each sample contributes the edge `source_workload → destination_workload`
/// once. Samples with an empty label on either side contribute nothing. The
/// result depends only on the set of edges, not on sample order or repeats.
#[instrument(skip_all, fields(samples = samples.len()))]
pub fn build_adjacency_list(samples: &[EdgeSample]) -> AdjacencyList {
    let mut adjacency_list = AdjacencyList::new();
    let mut skipped = 0usize;

    for sample in samples {
        let source = sample.source_workload();
        let destination = sample.destination_workload();

        if source.is_empty() || destination.is_empty() {
            skipped += 1;
            continue;
        }
        adjacency_list.insert_edge(Workload::from(source), Workload::from(destination));
    }

    if skipped > 0 {
        debug!(skipped, "skipped samples without both workload labels");
    }
    info!(
        sources = adjacency_list.source_count(),
        edges = adjacency_list.edge_count(),
        "extracted adjacency list"
    );
    adjacency_list
}

/// One sample per edge of `adjacency_list`; the inverse of [`build_adjacency_list`].
pub fn flatten(adjacency_list: &AdjacencyList) -> Vec<EdgeSample> {
    adjacency_list
        .edges()
        .map(|(src, dst)| EdgeSample::between(src.as_str(), dst.as_str()))
        .collect()
}
