use crate::aggregate::{summarize, SampleSummary};
use crate::error::{SampleFailure, Stage};
use crate::nn::knn;
use crate::params::ClusteringParams;
use crate::sample::{Sample, SpecificityPanel};
use crate::snn::{build_network, jaccard_edges};
use log::{info, warn};
use louvain::Louvain;

/// Result of clustering one sample.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleClustering {
    /// Sample id
    pub sample: String,
    /// Cluster of each event, dense in `1..=num_clusters`
    pub labels: Vec<u32>,
    /// Number of clusters; zero only for a sample without events
    pub num_clusters: usize,
    /// Modularity of the final partition
    pub modularity: f64,
    /// Edges of the similarity graph
    pub edges: usize,
    /// Cluster means and specificity counts
    pub summary: SampleSummary,
}

/// Run neighbor search, similarity graph construction, community detection and aggregation on one sample.
///
/// Each stage consumes the complete output of the previous one. A failure names the stage it came from.
pub fn cluster_sample(
    sample: &Sample,
    panel: &SpecificityPanel,
    params: &ClusteringParams,
) -> Result<SampleClustering, SampleFailure> {
    let id = sample.id();

    if sample.events() == 0 {
        warn!("sample '{id}' has no events, producing no clusters");
        return Ok(SampleClustering {
            sample: id.to_string(),
            labels: vec![],
            num_clusters: 0,
            modularity: 0.0,
            edges: 0,
            summary: SampleSummary::default(),
        });
    }

    info!("sample '{id}': computing {} nearest neighbors of {} events", params.k, sample.events());
    let neighbors = knn(&sample.values(), params.k).map_err(|e| SampleFailure::new(id, Stage::NeighborIndex, &e))?;

    let edges = jaccard_edges(&neighbors.view());
    let network = build_network(sample.events(), &edges);

    info!("sample '{id}': running louvain on {} edges", network.edge_count());
    let mut louvain = Louvain::with_limits(params.resolution, Some(params.seed), params.max_passes, params.max_levels);
    let communities = louvain.run(&network);
    info!(
        "sample '{id}': {} clusters, modularity {:.4}",
        communities.num_communities, communities.modularity
    );

    let summary = summarize(sample, panel, &communities.labels, communities.num_communities)
        .map_err(|e| SampleFailure::new(id, Stage::Aggregation, &e))?;

    Ok(SampleClustering {
        sample: id.to_string(),
        labels: communities.labels,
        num_clusters: communities.num_communities,
        modularity: communities.modularity,
        edges: network.edge_count(),
        summary,
    })
}
