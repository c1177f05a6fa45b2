use crate::{Clustering, Network};

/// Newman-Girvan modularity of a clustering, generalized with a `resolution` parameter.
///
/// `Q = 1/(2m) * sum_ij [A_ij - resolution * k_i * k_j / (2m)] * delta(c_i, c_j)`, where node weights stand in for
/// the degrees `k_i` and `m` is the total edge weight. A resolution of 1.0 gives the classic modularity.
/// A network without edges has modularity 0.
pub fn modularity(resolution: f64, graph: &Network, clustering: &impl Clustering) -> f64 {
    let mut quality = 0.0f64;
    let mut total_edge_weight = 0.0f64;

    for e in graph.graph.edge_references() {
        let c1 = clustering.get(e.source() as usize);
        let c2 = clustering.get(e.target() as usize);

        if c1 == c2 {
            quality += 2.0 * *e.weight();
        }

        total_edge_weight += *e.weight();
    }

    if total_edge_weight <= 0.0 {
        return 0.0;
    }

    let mut cluster_weights = vec![0.0; clustering.num_clusters()];

    for i in 0..graph.nodes() {
        cluster_weights[clustering.get(i)] += graph.weight(i);
    }

    for cluster_weight in cluster_weights {
        quality -= cluster_weight * cluster_weight * resolution / (2.0 * total_edge_weight);
    }

    quality / (2.0 * total_edge_weight)
}
