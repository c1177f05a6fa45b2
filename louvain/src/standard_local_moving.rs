use crate::{Clustering, Network, ZeroVec};
use rand::{seq::SliceRandom, Rng};

#[derive(Default)]
pub(crate) struct StandardLocalMoving {
    resolution: f64,
    max_passes: usize,
    cluster_weights: Vec<f64>,
    nodes_per_cluster: Vec<usize>,
    unused_clusters: Vec<usize>,
    node_order: Vec<usize>,
    edge_weight_per_cluster: Vec<f64>,
    neighboring_clusters: Vec<usize>,
}

impl StandardLocalMoving {
    pub fn new(resolution: f64, max_passes: usize) -> Self {
        StandardLocalMoving {
            resolution,
            max_passes,
            ..StandardLocalMoving::default()
        }
    }

    /// Move single nodes between clusters until a full pass over the nodes finds no move with a strictly positive
    /// gain, or `max_passes` passes have been made. `total_edge_weight` is the edge weight of the original network,
    /// which stays the normalizer at every aggregation level. Returns true if any node changed cluster.
    pub fn iterate(
        &mut self,
        n: &Network,
        c: &mut impl Clustering,
        total_edge_weight: f64,
        rng: &mut impl Rng,
    ) -> bool {
        if n.nodes() == 0 || total_edge_weight <= 0.0 {
            return false;
        }

        let mut update = false;
        let scale = self.resolution / (2.0 * total_edge_weight);

        self.cluster_weights.zero_len(n.nodes());
        self.nodes_per_cluster.zero_len(n.nodes());

        for i in 0..n.nodes() {
            self.cluster_weights[c.get(i)] += n.weight(i);
            self.nodes_per_cluster[c.get(i)] += 1;
        }

        // stack of empty cluster ids, lowest id on top
        self.unused_clusters.clear();
        for i in (0..n.nodes()).rev() {
            if self.nodes_per_cluster[i] == 0 {
                self.unused_clusters.push(i);
            }
        }

        // generate random permutation of the nodes
        self.node_order.clear();
        self.node_order.extend(0..n.nodes());
        self.node_order.shuffle(rng);

        self.edge_weight_per_cluster.zero_len(n.nodes());
        self.neighboring_clusters.clear();

        for _ in 0..self.max_passes {
            let mut moved = false;

            for idx in 0..self.node_order.len() {
                let j = self.node_order[idx];
                let node_weight = n.weight(j);
                let current_cluster = c.get(j);

                // Remove the currently selected node from its current cluster.
                self.cluster_weights[current_cluster] -= node_weight;
                self.nodes_per_cluster[current_cluster] -= 1;
                if self.nodes_per_cluster[current_cluster] == 0 {
                    self.unused_clusters.push(current_cluster);
                }

                // An empty cluster is always a candidate, so a node can leave to sit on its own.
                self.neighboring_clusters.clear();
                if let Some(&empty) = self.unused_clusters.last() {
                    self.neighboring_clusters.push(empty);
                }
                for (target, edge_weight) in n.neighbors(j) {
                    let neighbor_cluster = c.get(target);

                    if self.edge_weight_per_cluster[neighbor_cluster] == 0.0 {
                        self.neighboring_clusters.push(neighbor_cluster);
                    }
                    self.edge_weight_per_cluster[neighbor_cluster] += edge_weight;
                }

                // The node only leaves its old cluster for a strictly larger gain. Among equally good new clusters
                // the lowest id wins.
                let gain = |cluster: usize, ew: &[f64], cw: &[f64]| ew[cluster] - node_weight * cw[cluster] * scale;
                let stay_gain = gain(current_cluster, &self.edge_weight_per_cluster, &self.cluster_weights);
                let mut best_cluster = current_cluster;
                let mut max_qv_increment = stay_gain;

                for &l in &self.neighboring_clusters {
                    let qv_increment = gain(l, &self.edge_weight_per_cluster, &self.cluster_weights);
                    if qv_increment > max_qv_increment
                        || (qv_increment == max_qv_increment && best_cluster != current_cluster && l < best_cluster)
                    {
                        best_cluster = l;
                        max_qv_increment = qv_increment;
                    }
                }
                for &l in &self.neighboring_clusters {
                    self.edge_weight_per_cluster[l] = 0.0;
                }

                self.cluster_weights[best_cluster] += node_weight;
                self.nodes_per_cluster[best_cluster] += 1;

                if self.unused_clusters.last() == Some(&best_cluster) {
                    self.unused_clusters.pop();
                }

                if best_cluster != current_cluster {
                    c.set(j, best_cluster);
                    moved = true;
                }
            }

            if !moved {
                break;
            }
            update = true;
        }

        if update {
            c.remove_empty_clusters();
        }

        update
    }
}
