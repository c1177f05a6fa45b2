use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while validating inputs or running the clustering pipeline.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The neighbor count is outside `1..=events - 2`.
    #[error("invalid number of neighbors k = {k} for {events} events (k must be between 1 and {})", .events.saturating_sub(2))]
    InvalidK {
        /// Requested neighbor count
        k: usize,
        /// Number of events in the sample
        events: usize,
    },

    /// A clustering parameter is out of range.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// What is wrong with it
        message: String,
    },

    /// The marker matrix does not have one column per clustering marker.
    #[error("sample '{sample}' has {found} marker columns but {expected} clustering markers are configured")]
    MarkerCount {
        /// Sample id
        sample: String,
        /// Configured number of markers
        expected: usize,
        /// Columns found in the matrix
        found: usize,
    },

    /// A required column is absent from an input table.
    #[error("column '{column}' is missing from {source_name}")]
    MissingColumn {
        /// Column name
        column: String,
        /// Table the column was expected in
        source_name: String,
    },

    /// A marker cell could not be parsed as a number.
    #[error("cannot parse '{value}' as a number for marker '{marker}' at row {row} of {source_name}")]
    NonNumeric {
        /// Table being read
        source_name: String,
        /// One-based data row
        row: usize,
        /// Marker column
        marker: String,
        /// Offending cell
        value: String,
    },

    /// A marker value is NaN or infinite.
    #[error("sample '{sample}' has non-finite value {value} for marker {marker} at event {event}")]
    NonFinite {
        /// Sample id
        sample: String,
        /// Zero-based event index
        event: usize,
        /// Zero-based marker index
        marker: usize,
        /// Offending value
        value: f64,
    },

    /// The specificity label vector is not parallel to the event rows.
    #[error("sample '{sample}' has {labels} specificity labels for {events} events")]
    LabelCount {
        /// Sample id
        sample: String,
        /// Number of labels
        labels: usize,
        /// Number of events
        events: usize,
    },

    /// A specificity tag is not part of the run's panel.
    #[error("specificity '{0}' is not part of the panel")]
    UnknownSpecificity(String),

    /// A name appears twice where names must be unique.
    #[error("duplicate {kind} '{name}'")]
    Duplicate {
        /// What kind of name (panel tag, sample id, marker)
        kind: &'static str,
        /// The repeated name
        name: String,
    },

    /// A cluster assignment is not a dense `1..=K` labelling of the sample's events.
    #[error("invalid cluster assignment: {0}")]
    InvalidAssignment(String),

    /// A cache artifact holds a run stored under a different key.
    #[error("cache artifact {path} holds run {found}, expected {expected}")]
    CacheKeyMismatch {
        /// Artifact path
        path: String,
        /// Key the artifact was looked up by
        expected: String,
        /// Key recorded inside the artifact
        found: String,
    },

    /// I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// CSV read or write failure
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// JSON encode or decode failure
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Pipeline stage, used to report where a sample failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// k-nearest-neighbor search
    NeighborIndex,
    /// Per-cluster means and specificity counts
    Aggregation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::NeighborIndex => "neighbor index",
            Stage::Aggregation => "aggregation",
        })
    }
}

/// A sample whose pipeline failed. Other samples of the run are unaffected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleFailure {
    /// Sample id
    pub sample: String,
    /// Stage that failed
    pub stage: Stage,
    /// Rendered error
    pub message: String,
}

impl SampleFailure {
    /// Record `error` raised by `stage` while processing `sample`.
    pub fn new(sample: &str, stage: Stage, error: &ClusterError) -> Self {
        SampleFailure {
            sample: sample.to_string(),
            stage,
            message: error.to_string(),
        }
    }
}

impl fmt::Display for SampleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sample '{}' failed at {}: {}", self.sample, self.stage, self.message)
    }
}
