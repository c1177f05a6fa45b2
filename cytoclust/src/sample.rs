use crate::error::ClusterError;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The closed, ordered set of specificity tags of a run, e.g. `none`, `tetramerA`, `tetramerB`.
///
/// Events store their tag as an index into the panel, and every per-tag computation iterates the panel, so a new
/// tag needs no new code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecificityPanel {
    labels: Vec<String>,
}

impl SpecificityPanel {
    /// Build a panel from its tags. Tags must be non-empty and unique.
    pub fn new<S: Into<String>>(labels: impl IntoIterator<Item = S>) -> Result<Self, ClusterError> {
        let labels = labels.into_iter().map(Into::into).collect::<Vec<String>>();
        if labels.is_empty() {
            return Err(ClusterError::InvalidParameter {
                name: "panel",
                message: "at least one specificity tag is required".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for label in &labels {
            if label.is_empty() {
                return Err(ClusterError::InvalidParameter {
                    name: "panel",
                    message: "specificity tags cannot be empty".to_string(),
                });
            }
            if !seen.insert(label.as_str()) {
                return Err(ClusterError::Duplicate {
                    kind: "specificity tag",
                    name: label.clone(),
                });
            }
        }
        Ok(SpecificityPanel { labels })
    }

    /// Tags in panel order
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of tags
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always false for a constructed panel
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Get the index of a tag. Returns None if the tag is not in the panel.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|x| x == label)
    }

    /// Translate tags into panel indices.
    pub fn encode<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>, ClusterError> {
        labels
            .iter()
            .map(|l| {
                let l = l.as_ref();
                self.index_of(l)
                    .ok_or_else(|| ClusterError::UnknownSpecificity(l.to_string()))
            })
            .collect()
    }
}

/// The events of one subject/acquisition: an `events x markers` matrix and one specificity index per event.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    id: String,
    values: Array2<f64>,
    specificity: Vec<usize>,
}

impl Sample {
    /// Validate and wrap a sample. Every value must be finite, the label vector must be parallel to the rows, and
    /// every label must index into `panel`.
    pub fn new(
        id: impl Into<String>,
        values: Array2<f64>,
        specificity: Vec<usize>,
        panel: &SpecificityPanel,
    ) -> Result<Self, ClusterError> {
        let id = id.into();
        let (events, _) = values.dim();
        if specificity.len() != events {
            return Err(ClusterError::LabelCount {
                sample: id,
                labels: specificity.len(),
                events,
            });
        }
        if let Some(((event, marker), &value)) = values.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(ClusterError::NonFinite {
                sample: id,
                event,
                marker,
                value,
            });
        }
        if let Some(&bad) = specificity.iter().find(|&&l| l >= panel.len()) {
            return Err(ClusterError::UnknownSpecificity(format!("#{bad}")));
        }
        Ok(Sample {
            id,
            values,
            specificity,
        })
    }

    /// Sample id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Marker matrix, one row per event
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    /// Panel index of each event's specificity
    pub fn specificity(&self) -> &[usize] {
        &self.specificity
    }

    /// Number of events
    pub fn events(&self) -> usize {
        self.values.nrows()
    }

    /// Number of marker columns
    pub fn markers(&self) -> usize {
        self.values.ncols()
    }

    /// Events carrying each tag of the panel, in panel order. Tags without events get an empty list.
    pub fn events_by_specificity(&self, panel: &SpecificityPanel) -> Vec<Vec<usize>> {
        let mut subsets = vec![Vec::new(); panel.len()];
        for (event, &label) in self.specificity.iter().enumerate() {
            subsets[label].push(event);
        }
        subsets
    }
}

/// All samples of a run, sharing one ordered marker set and one specificity panel.
#[derive(Clone, Debug, PartialEq)]
pub struct Cohort {
    markers: Vec<String>,
    panel: SpecificityPanel,
    samples: Vec<Sample>,
}

impl Cohort {
    /// Check that there is at least one marker, that every sample has one column per marker and only uses tags of
    /// `panel`, and that sample ids and marker names are unique.
    pub fn new(markers: Vec<String>, panel: SpecificityPanel, samples: Vec<Sample>) -> Result<Self, ClusterError> {
        if markers.is_empty() {
            return Err(ClusterError::InvalidParameter {
                name: "markers",
                message: "at least one clustering marker is required".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for marker in &markers {
            if !seen.insert(marker.as_str()) {
                return Err(ClusterError::Duplicate {
                    kind: "marker",
                    name: marker.clone(),
                });
            }
        }

        let mut seen = HashSet::new();
        for sample in &samples {
            if !seen.insert(sample.id()) {
                return Err(ClusterError::Duplicate {
                    kind: "sample id",
                    name: sample.id().to_string(),
                });
            }
            // an empty matrix carries no column information
            if sample.events() > 0 && sample.markers() != markers.len() {
                return Err(ClusterError::MarkerCount {
                    sample: sample.id().to_string(),
                    expected: markers.len(),
                    found: sample.markers(),
                });
            }
            // samples may have been built against another panel
            if let Some(&bad) = sample.specificity().iter().find(|&&l| l >= panel.len()) {
                return Err(ClusterError::UnknownSpecificity(format!(
                    "#{bad} (sample '{}')",
                    sample.id()
                )));
            }
        }

        Ok(Cohort {
            markers,
            panel,
            samples,
        })
    }

    /// Clustering marker names, in column order
    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    /// Specificity panel
    pub fn panel(&self) -> &SpecificityPanel {
        &self.panel
    }

    /// Samples in input order
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}
