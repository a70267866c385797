//! Shared types, error model, and configuration for meshctx.
//!
//! This crate is the foundation depended on by all other meshctx crates.
//! It provides:
//! - [`MeshCtxError`]: the unified error type
//! - Domain types ([`Workload`], [`AdjacencyList`], [`ContextDefinition`], [`Snapshot`])
//! - Configuration ([`AppConfig`], [`TopologyConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, PrometheusInstance, ServerConfig, StorageConfig, TopologyConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{MeshCtxError, Result, UpstreamError};
pub use types::{
    AdjacencyList, CONTEXT_DOMAIN, ContextDefinition, EdgeSample, HealthConfig, HealthDirection,
    Identity, MetricDefinition, PROMPT_SPEC_VERSION, PromptDocument, Snapshot,
    SnapshotId, TimeWindow, Topology, Workload,
};
