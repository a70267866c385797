//! Core pipeline orchestration and domain logic for meshctx.
//!
//! Ties the metrics client, the topology extractor, and the snapshot store
//! into the two end-to-end workflows: `collect_topology` and `build_prompt`.

pub mod assembler;
pub mod connector;
pub mod extractor;
pub mod pipeline;
pub mod window;

pub use connector::{IstioConnector, TopologyConnector};
pub use pipeline::{
    CollectOutcome, CollectParams, ProgressReporter, SilentProgress, build_prompt,
    collect_topology,
};
