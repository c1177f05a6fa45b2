use crate::error::ClusterError;
use crate::sample::{Sample, SpecificityPanel};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Row key of the cluster tables: a cluster of the sample, or the whole-sample baseline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ClusterKey {
    /// A cluster id in `1..=K`
    Cluster(u32),
    /// All events of the sample, ignoring cluster assignment
    WholeSample,
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterKey::Cluster(id) => write!(f, "{id}"),
            ClusterKey::WholeSample => f.write_str("all"),
        }
    }
}

/// Mean marker expression of one cluster (or of the whole sample).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterMeans {
    /// Sample id
    pub sample: String,
    /// Cluster the row describes
    pub cluster: ClusterKey,
    /// Events in the cluster
    pub events: usize,
    /// Mean of each marker, in marker order
    pub means: Vec<f64>,
}

/// Specificity make-up of one cluster.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpecificityCounts {
    /// Sample id
    pub sample: String,
    /// Cluster id in `1..=K`
    pub cluster: u32,
    /// Events of each panel tag in this cluster
    pub counts: Vec<usize>,
    /// Events of each panel tag in the whole sample
    pub totals: Vec<usize>,
    /// `100 * counts / totals` per tag; `None` when the sample has no event with that tag
    pub percentages: Vec<Option<f64>>,
}

/// Everything the aggregator derives for one sample.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleSummary {
    /// One row per cluster, in id order, followed by the whole-sample row
    pub means: Vec<ClusterMeans>,
    /// One row per cluster, in id order
    pub counts: Vec<SpecificityCounts>,
}

/// Percentage of a tag's sample-wide events that fall in one cluster. Undefined when the tag is absent from the
/// sample.
pub fn percentage(count: usize, total: usize) -> Option<f64> {
    (total > 0).then(|| 100.0 * count as f64 / total as f64)
}

fn check_labels(labels: &[u32], events: usize, num_clusters: usize) -> Result<Vec<usize>, ClusterError> {
    if labels.len() != events {
        return Err(ClusterError::InvalidAssignment(format!(
            "{} labels for {} events",
            labels.len(),
            events
        )));
    }
    let mut sizes = vec![0usize; num_clusters];
    for &l in labels {
        if l == 0 || l as usize > num_clusters {
            return Err(ClusterError::InvalidAssignment(format!(
                "label {l} outside 1..={num_clusters}"
            )));
        }
        sizes[l as usize - 1] += 1;
    }
    if let Some(empty) = sizes.iter().position(|&s| s == 0) {
        return Err(ClusterError::InvalidAssignment(format!("cluster {} has no events", empty + 1)));
    }
    Ok(sizes)
}

/// Per-cluster marker means, the whole-sample baseline, and per-cluster specificity counts and percentages.
///
/// `labels` must be a dense `1..=num_clusters` assignment of the sample's events.
pub fn summarize(
    sample: &Sample,
    panel: &SpecificityPanel,
    labels: &[u32],
    num_clusters: usize,
) -> Result<SampleSummary, ClusterError> {
    let sizes = check_labels(labels, sample.events(), num_clusters)?;
    let values = sample.values();

    let mut sums = Array2::<f64>::zeros((num_clusters, sample.markers()));
    for (row, &label) in values.outer_iter().zip(labels) {
        let mut acc = sums.row_mut(label as usize - 1);
        acc += &row;
    }

    let mut means = Vec::with_capacity(num_clusters + 1);
    for (i, (sum, &size)) in sums.outer_iter().zip(&sizes).enumerate() {
        means.push(ClusterMeans {
            sample: sample.id().to_string(),
            cluster: ClusterKey::Cluster(i as u32 + 1),
            events: size,
            means: (&sum / size as f64).to_vec(),
        });
    }
    if let Some(whole) = values.mean_axis(Axis(0)) {
        means.push(ClusterMeans {
            sample: sample.id().to_string(),
            cluster: ClusterKey::WholeSample,
            events: sample.events(),
            means: whole.to_vec(),
        });
    }

    let subsets = sample.events_by_specificity(panel);
    let totals = subsets.iter().map(Vec::len).collect::<Vec<_>>();
    let mut cluster_counts = vec![vec![0usize; panel.len()]; num_clusters];
    for (tag, events) in subsets.iter().enumerate() {
        for &event in events {
            cluster_counts[labels[event] as usize - 1][tag] += 1;
        }
    }

    let counts = cluster_counts
        .into_iter()
        .enumerate()
        .map(|(i, counts)| {
            let percentages = counts
                .iter()
                .zip(&totals)
                .map(|(&c, &t)| percentage(c, t))
                .collect();
            SpecificityCounts {
                sample: sample.id().to_string(),
                cluster: i as u32 + 1,
                counts,
                totals: totals.clone(),
                percentages,
            }
        })
        .collect();

    Ok(SampleSummary { means, counts })
}
