//! Context document assembler.
//!
//! Takes the latest adjacency list plus the static policy and metric
//! configuration, then produces one [`ContextDefinition`] per workload:
//!
//! ```text
//! adjacency list ─┐
//!                 ├─ workload union ─► per workload: identity, metrics,
//! config workloads┘                    policy, dependencies, dependents
//! ```

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, instrument};

use meshctx_shared::{
    AdjacencyList, AppConfig, CONTEXT_DOMAIN, ContextDefinition, Identity, MetricDefinition,
    PromptDocument, Topology, Workload,
};

/// Build the context definitions for every known workload.
///
/// The workload set is the union of all sources and destinations in
/// `adjacency_list` and every entry of `configured`, so configured workloads
/// without observed traffic still get an entry. `metrics` and `policy` are
/// copied unchanged into each entry. Entries come out sorted by workload name;
/// callers should not depend on that order.
#[instrument(skip_all, fields(sources = adjacency_list.source_count(), configured = configured.len()))]
pub fn assemble_contexts(
    adjacency_list: &AdjacencyList,
    configured: &[Workload],
    metrics: &[MetricDefinition],
    policy: &[String],
) -> Vec<ContextDefinition> {
    let mut workloads = adjacency_list.workloads();
    workloads.extend(configured.iter());

    let dependents = reverse_index(adjacency_list);

    let definitions: Vec<ContextDefinition> = workloads
        .into_iter()
        .map(|workload| ContextDefinition {
            resource_id: workload.resource_id(),
            domain: CONTEXT_DOMAIN.to_string(),
            identity: Identity {
                workload: workload.clone(),
            },
            metrics: metrics.to_vec(),
            topology: topology_for(adjacency_list, &dependents, workload),
            policy: policy.to_vec(),
        })
        .collect();

    debug!(entries = definitions.len(), "assembled context definitions");
    definitions
}

/// Assemble the full prompt document from an adjacency list and the config.
pub fn assemble_prompt(adjacency_list: &AdjacencyList, config: &AppConfig) -> PromptDocument {
    PromptDocument::new(assemble_contexts(
        adjacency_list,
        &config.topology.workloads,
        &config.metrics,
        &config.policy,
    ))
}

/// destination → sources calling it, built once per call.
fn reverse_index(adjacency_list: &AdjacencyList) -> BTreeMap<&Workload, BTreeSet<&Workload>> {
    let mut index: BTreeMap<&Workload, BTreeSet<&Workload>> = BTreeMap::new();
    for (src, dst) in adjacency_list.edges() {
        index.entry(dst).or_default().insert(src);
    }
    index
}

/// `None` when the workload has neither dependencies nor dependents.
fn topology_for(
    adjacency_list: &AdjacencyList,
    dependents: &BTreeMap<&Workload, BTreeSet<&Workload>>,
    workload: &Workload,
) -> Option<Topology> {
    let topology = Topology {
        dependencies: adjacency_list
            .destinations(workload.as_str())
            .map(|dests| dests.iter().cloned().collect())
            .unwrap_or_default(),
        dependents: dependents
            .get(workload)
            .map(|srcs| srcs.iter().map(|w| (*w).clone()).collect())
            .unwrap_or_default(),
    };
    (!topology.is_empty()).then_some(topology)
}
