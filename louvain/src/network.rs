use crate::graph::{Edges, UnGraph};
use crate::Clustering;
use fxhash::{FxHashMap, FxHashSet};

/// Container for the network graph.
///
/// Node weights hold the weighted degree of each node (the sum of its incident edge weights), which is what the
/// modularity null model needs. Aggregate networks carry the summed degree of their member nodes.
#[derive(Clone, Debug, Default)]
pub struct Network {
    pub(crate) graph: UnGraph,
}

/// Iterator over pairs of (adjacent node id, edge_weight) for all neighbors of a chosen node.
pub struct NeighborAndWeightIter<'a> {
    edge_iter: Edges<'a>,
    home_node: usize,
}

impl Iterator for NeighborAndWeightIter<'_> {
    type Item = (usize, f64);

    fn next(&mut self) -> Option<Self::Item> {
        self.edge_iter.next().map(|edge_ref| {
            debug_assert_eq!(edge_ref.source() as usize, self.home_node);
            (edge_ref.target() as usize, *edge_ref.weight())
        })
    }
}

impl Network {
    /// Build a network over `n_nodes` nodes from `(source, target, weight)` triples.
    ///
    /// The pair `(i, j)` and `(j, i)` name the same undirected edge; only its first occurrence is kept. Self loops
    /// and edges with a non-positive weight are skipped. Nodes without any surviving edge stay in the network as
    /// isolated nodes of zero weight.
    pub fn from_weighted_edges<I>(n_nodes: usize, edges: I) -> Network
    where
        I: IntoIterator<Item = (u32, u32, f64)>,
    {
        let mut graph = UnGraph::with_capacity(n_nodes);
        for _ in 0..n_nodes {
            graph.add_node(0.0);
        }
        let mut seen = vec![FxHashSet::<u32>::default(); n_nodes];
        let mut degrees = vec![0.0; n_nodes];
        for (i, j, w) in edges {
            if i == j || w <= 0.0 {
                continue;
            }
            let (i, j) = if i < j { (i, j) } else { (j, i) };
            if seen[i as usize].insert(j) {
                graph.add_edge(i, j, w);
                degrees[i as usize] += w;
                degrees[j as usize] += w;
            }
        }
        for (i, degree) in degrees.into_iter().enumerate() {
            if let Some(weight) = graph.node_weight_mut(i as u32) {
                *weight = degree;
            }
        }
        Network { graph }
    }

    /// Number of nodes in the graph
    pub fn nodes(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of undirected edges in the graph
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Get the node weight of `node`.
    pub fn weight(&self, node: usize) -> f64 {
        self.graph.node_weight(node as u32).copied().unwrap_or_default()
    }

    /// Iterator over pairs of (adjacent node id, edge_weight) for all neighbors of `node`.
    pub fn neighbors(&self, node: usize) -> NeighborAndWeightIter<'_> {
        NeighborAndWeightIter {
            edge_iter: self.graph.edges(node as u32),
            home_node: node,
        }
    }

    /// Get the total weight of all nodes in the graph
    pub fn get_total_node_weight(&self) -> f64 {
        (0..self.nodes()).map(|i| self.weight(i)).sum()
    }

    /// Get the total edge weight of the graph, counting each undirected edge once
    pub fn get_total_edge_weight(&self) -> f64 {
        self.graph
            .edge_references()
            .fold(0.0, |acc, edge| acc + *edge.weight())
    }

    /// Creates a reduced (or aggregate) network based on a clustering.
    /// Each node in the reduced network corresponds to a cluster of nodes in
    /// the original network. The weight of a node in the reduced network equals
    /// the sum of the weights of the nodes in the corresponding cluster in the
    /// original network. The weight of an edge between two nodes in the reduced
    /// network equals the sum of the weights of the edges between the nodes in
    /// the two corresponding clusters in the original network. Edges internal to
    /// a cluster are dropped; they do not change the gain of any later move.
    pub fn create_reduced_network(&self, clustering: &impl Clustering) -> Network {
        let mut cluster_g = UnGraph::with_capacity(clustering.num_clusters());

        for _ in 0..clustering.num_clusters() {
            cluster_g.add_node(0.0);
        }

        for n in 0..self.nodes() {
            let cluster = clustering.get(n) as u32;
            if let Some(cluster_node_weight) = cluster_g.node_weight_mut(cluster) {
                *cluster_node_weight += self.weight(n);
            }
        }

        let mut edge_memo = FxHashMap::default();

        for e in self.graph.edge_references() {
            let c1 = clustering.get(e.source() as usize) as u32;
            let c2 = clustering.get(e.target() as usize) as u32;

            if c1 == c2 {
                continue;
            }

            let key = if c1 < c2 { (c1, c2) } else { (c2, c1) };
            *edge_memo.entry(key).or_insert(0.0) += *e.weight();
        }

        // insert in a fixed order so that neighbor iteration does not depend on hashing
        let mut cluster_edges = edge_memo.into_iter().collect::<Vec<_>>();
        cluster_edges.sort_unstable_by_key(|&(key, _)| key);
        for ((c1, c2), weight) in cluster_edges {
            cluster_g.add_edge(c1, c2, weight);
        }

        Network { graph: cluster_g }
    }
}
