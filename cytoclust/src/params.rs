use crate::error::ClusterError;
use louvain::louvain::{DEFAULT_MAX_LEVELS, DEFAULT_MAX_PASSES, DEFAULT_RESOLUTION};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Default number of nearest neighbors per event
pub const DEFAULT_K: usize = 30;

/// Default seed for the community detector's node visitation order
pub const DEFAULT_SEED: u64 = 0xBADC0FFEE0DDF00D;

/// Parameters of a clustering run. Every field is part of the cache key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusteringParams {
    /// Number of nearest neighbors per event
    pub k: usize,
    /// Modularity resolution; larger values give more, smaller clusters
    pub resolution: f64,
    /// Seed for the node visitation order of community detection
    pub seed: u64,
    /// Bound on local-moving passes per aggregation level
    pub max_passes: usize,
    /// Bound on the number of aggregation levels
    pub max_levels: usize,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        ClusteringParams {
            k: DEFAULT_K,
            resolution: DEFAULT_RESOLUTION,
            seed: DEFAULT_SEED,
            max_passes: DEFAULT_MAX_PASSES,
            max_levels: DEFAULT_MAX_LEVELS,
        }
    }
}

impl ClusteringParams {
    /// Read parameters from a JSON object. Missing fields take their default.
    pub fn from_json(path: impl AsRef<Path>) -> Result<Self, ClusterError> {
        let reader = BufReader::new(File::open(path)?);
        let params: ClusteringParams = serde_json::from_reader(reader)?;
        params.validate()?;
        Ok(params)
    }

    /// Check the sample-independent constraints. Whether `k` fits a given sample is checked per sample.
    pub fn validate(&self) -> Result<(), ClusterError> {
        if self.k == 0 {
            return Err(ClusterError::InvalidParameter {
                name: "k",
                message: "must be at least 1".to_string(),
            });
        }
        if !self.resolution.is_finite() || self.resolution <= 0.0 {
            return Err(ClusterError::InvalidParameter {
                name: "resolution",
                message: format!("must be a positive number, got {}", self.resolution),
            });
        }
        if self.max_passes == 0 {
            return Err(ClusterError::InvalidParameter {
                name: "max_passes",
                message: "must be at least 1".to_string(),
            });
        }
        if self.max_levels == 0 {
            return Err(ClusterError::InvalidParameter {
                name: "max_levels",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
