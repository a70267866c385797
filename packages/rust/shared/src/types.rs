//! Core domain types for the workload topology and the context document.

use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MeshCtxError, Result};

/// Version tag of the prompt document format.
pub const PROMPT_SPEC_VERSION: &str = "0.1";

/// Domain tag attached to every workload context definition.
pub const CONTEXT_DOMAIN: &str = "compute.k8s";

/// Prefix of every workload resource identifier.
const RESOURCE_ID_PREFIX: &str = "workload-";

/// Label carrying the calling workload on a request-flow series.
const SOURCE_LABEL: &str = "source_workload";

/// Label carrying the called workload on a request-flow series.
const DESTINATION_LABEL: &str = "destination_workload";

// ---------------------------------------------------------------------------
// Workload
// ---------------------------------------------------------------------------

/// Name of a compute unit (service or deployment). Opaque apart from equality.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Workload(String);

impl Workload {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic resource identifier: a fixed prefix plus the name.
    pub fn resource_id(&self) -> String {
        format!("{RESOURCE_ID_PREFIX}{}", self.0)
    }
}

impl std::fmt::Display for Workload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Workload {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Workload {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl Borrow<str> for Workload {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Workload {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// AdjacencyList
// ---------------------------------------------------------------------------

/// Directed workload graph: source workload → set of destination workloads.
///
/// A missing key means "no observed outgoing edges". Destination sets never
/// hold duplicates, and both levels are ordered so two lists built from the
/// same edges compare and serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdjacencyList(BTreeMap<Workload, BTreeSet<Workload>>);

impl AdjacencyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `source → destination`. Returns `false` if the edge was already present.
    pub fn insert_edge(&mut self, source: Workload, destination: Workload) -> bool {
        self.0.entry(source).or_default().insert(destination)
    }

    /// Destinations of `workload`, if it has any outgoing edges.
    pub fn destinations(&self, workload: &str) -> Option<&BTreeSet<Workload>> {
        self.0.get(workload)
    }

    /// All workloads with at least one outgoing edge.
    pub fn sources(&self) -> impl Iterator<Item = &Workload> {
        self.0.keys()
    }

    /// Flattened `(source, destination)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (&Workload, &Workload)> {
        self.0
            .iter()
            .flat_map(|(src, dests)| dests.iter().map(move |dst| (src, dst)))
    }

    /// Union of every source and destination.
    pub fn workloads(&self) -> BTreeSet<&Workload> {
        self.0
            .iter()
            .flat_map(|(src, dests)| std::iter::once(src).chain(dests.iter()))
            .collect()
    }

    pub fn source_count(&self) -> usize {
        self.0.len()
    }

    pub fn edge_count(&self) -> usize {
        self.0.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Workload, Workload)> for AdjacencyList {
    fn from_iter<I: IntoIterator<Item = (Workload, Workload)>>(iter: I) -> Self {
        let mut list = Self::new();
        for (src, dst) in iter {
            list.insert_edge(src, dst);
        }
        list
    }
}

// ---------------------------------------------------------------------------
// EdgeSample
// ---------------------------------------------------------------------------

/// One series returned by the metrics backend, reduced to its label set.
///
/// Only the label set matters for edge existence; sample values are not kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeSample {
    labels: BTreeMap<String, String>,
}

impl EdgeSample {
    pub fn new(labels: BTreeMap<String, String>) -> Self {
        Self { labels }
    }

    /// Build a sample carrying only the two workload labels.
    pub fn between(source: &str, destination: &str) -> Self {
        let labels = BTreeMap::from([
            (SOURCE_LABEL.to_string(), source.to_string()),
            (DESTINATION_LABEL.to_string(), destination.to_string()),
        ]);
        Self { labels }
    }

    /// The `source_workload` label, or `""` when absent.
    pub fn source_workload(&self) -> &str {
        self.label(SOURCE_LABEL)
    }

    /// The `destination_workload` label, or `""` when absent.
    pub fn destination_workload(&self) -> &str {
        self.label(DESTINATION_LABEL)
    }

    pub fn label(&self, name: &str) -> &str {
        self.labels.get(name).map(String::as_str).unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// TimeWindow
// ---------------------------------------------------------------------------

/// A closed query interval. `from` never lies after `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl TimeWindow {
    /// Build a window, rejecting `from > to`.
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self> {
        if from > to {
            return Err(MeshCtxError::invalid_input(
                "from_timestamp must be before to_timestamp",
            ));
        }
        Ok(Self { from, to })
    }

    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    pub fn to(&self) -> DateTime<Utc> {
        self.to
    }

    pub fn duration(&self) -> chrono::Duration {
        self.to - self.from
    }
}

// ---------------------------------------------------------------------------
// Metric definitions
// ---------------------------------------------------------------------------

/// Static description of a metric attached to every context definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub description: String,
    /// Free-form rule describing how samples are aggregated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation_logic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_config: Option<HealthConfig>,
}

impl MetricDefinition {
    /// A definition carrying only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: String::new(),
            unit: String::new(),
            description: String::new(),
            aggregation_logic: None,
            health_config: None,
        }
    }
}

/// Which way a metric degrades.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthDirection {
    /// Latency, error rate: larger values are worse.
    #[default]
    LowerIsBetter,
    /// Throughput, availability: smaller values are worse.
    HigherIsBetter,
}

/// Health thresholds for a metric.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthConfig {
    #[serde(default)]
    pub direction: HealthDirection,
    /// Expected steady-state value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical: Option<f64>,
}

impl HealthConfig {
    /// Check that `warning` comes before `critical` along `direction`.
    pub fn validate(&self) -> Result<()> {
        if let (Some(warning), Some(critical)) = (self.warning, self.critical) {
            let ordered = match self.direction {
                HealthDirection::LowerIsBetter => warning <= critical,
                HealthDirection::HigherIsBetter => warning >= critical,
            };
            if !ordered {
                return Err(MeshCtxError::config(format!(
                    "health_config: warning ({warning}) and critical ({critical}) are out of order for {:?}",
                    self.direction
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Context definitions
// ---------------------------------------------------------------------------

/// Identity payload of a context definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub workload: Workload,
}

/// Forward and reverse dependencies of one workload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    /// Workloads this workload calls.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Workload>,
    /// Workloads that call this workload.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependents: Vec<Workload>,
}

impl Topology {
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty() && self.dependents.is_empty()
    }
}

/// One entry of the prompt document, describing a single workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDefinition {
    pub resource_id: String,
    pub domain: String,
    pub identity: Identity,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<MetricDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology: Option<Topology>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policy: Vec<String>,
}

/// The document returned to prompt consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptDocument {
    pub spec_version: String,
    pub context_definitions: Vec<ContextDefinition>,
}

impl PromptDocument {
    pub fn new(context_definitions: Vec<ContextDefinition>) -> Self {
        Self {
            spec_version: PROMPT_SPEC_VERSION.to_string(),
            context_definitions,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for snapshot identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(pub Uuid);

impl SnapshotId {
    /// Generate a new time-sortable snapshot identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SnapshotId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A persisted adjacency list. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub adjacency_list: AdjacencyList,
    pub created_at: DateTime<Utc>,
    pub source_count: usize,
    pub total_edges: usize,
}

impl Snapshot {
    /// Capture `adjacency_list` at `created_at`, deriving the counts.
    pub fn capture(adjacency_list: AdjacencyList, created_at: DateTime<Utc>) -> Self {
        Self {
            id: SnapshotId::new(),
            source_count: adjacency_list.source_count(),
            total_edges: adjacency_list.edge_count(),
            adjacency_list,
            created_at,
        }
    }
}
