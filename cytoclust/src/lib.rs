//! # cytoclust: per-sample graph clustering of cytometry events
//!
//! Each sample is clustered on its own: k-nearest neighbors of every event, a shared-nearest-neighbor graph
//! weighted by the Jaccard index of neighbor sets, and Louvain modularity optimization. Clusters are then
//! summarized by their mean marker expression and by how the antigen specificities of their events distribute.

#![deny(missing_docs)]

/// Per-cluster marker means and specificity counts
pub mod aggregate;

/// Content-addressed storage of clustering runs
pub mod cache;

/// Error types and failure reporting
pub mod error;

/// CSV input and output
pub mod io;

/// Nearest-neighbor search
pub mod nn;

/// Clustering parameters
pub mod params;

/// Per-sample clustering pipeline
pub mod pipeline;

/// Run orchestration over a cohort of samples
pub mod run;

/// Samples, cohorts and specificity panels
pub mod sample;

/// Shared-nearest-neighbor similarity graphs
pub mod snn;

#[cfg(test)]
mod test;

pub use error::{ClusterError, SampleFailure, Stage};
pub use params::ClusteringParams;
pub use run::{ClusteringRun, Orchestrator};
pub use sample::{Cohort, Sample, SpecificityPanel};
