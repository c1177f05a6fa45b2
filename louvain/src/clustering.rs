/// Trait representing a clustering over a set of items
/// Each item is assigned a single integer label
pub trait Clustering: std::fmt::Debug {
    /// Initialize a fresh clustering with each node in it's own cluster
    fn init_different_clusters(num_nodes: usize) -> Self;

    /// Initialize a fresh clustering with all nodes in a single cluser
    fn init_same_cluster(num_nodes: usize) -> Self;

    /// Initialize the clustering with a known set of labels
    fn new_from_labels(labels: &[usize]) -> Self;

    /// Get the label of node `i`
    fn get(&self, i: usize) -> usize;

    /// Set the label of node 'i'. Note this must update the number of clusters
    fn set(&mut self, i: usize, cluster: usize);

    /// Total number of nodes
    fn nodes(&self) -> usize;

    /// Number of distinct clusters
    fn num_clusters(&self) -> usize;

    /// Reassign node labels, removing unused labels
    fn remove_empty_clusters(&mut self);

    /// Number of nodes carrying each label
    fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.num_clusters()];
        for i in 0..self.nodes() {
            sizes[self.get(i)] += 1;
        }
        sizes
    }

    /// Take clustering of the cluster labels, and reassign label to reflect the higher-order clustering
    fn merge_clusters<C: Clustering>(&mut self, cluster_clusterings: &C) {
        for i in 0..self.nodes() {
            self.set(i, cluster_clusterings.get(self.get(i)))
        }

        self.remove_empty_clusters();
    }

    /// One-based labels ordered by decreasing cluster size. Equal-sized clusters keep the order of their current
    /// labels. Every label in `1..=num_clusters()` is used when the clustering has no empty clusters.
    fn relabel_by_size(&self) -> Vec<u32> {
        let sizes = self.cluster_sizes();
        let mut order = (0..sizes.len()).collect::<Vec<_>>();
        order.sort_by(|&a, &b| sizes[b].cmp(&sizes[a]));

        let mut new_label = vec![0u32; sizes.len()];
        for (rank, &old) in order.iter().enumerate() {
            new_label[old] = rank as u32 + 1;
        }

        (0..self.nodes()).map(|i| new_label[self.get(i)]).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// A basic Vec-backed implementation of `Clustering`
pub struct SimpleClustering {
    labels: Vec<usize>,
    num_clusters: usize,
}

impl SimpleClustering {
    /// Zero-based label of every node
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }
}

impl Clustering for SimpleClustering {
    fn init_different_clusters(num_nodes: usize) -> Self {
        SimpleClustering {
            labels: (0..num_nodes).collect(),
            num_clusters: num_nodes,
        }
    }

    fn init_same_cluster(num_nodes: usize) -> Self {
        SimpleClustering {
            labels: vec![0; num_nodes],
            num_clusters: usize::from(num_nodes > 0),
        }
    }

    fn new_from_labels(input_labels: &[usize]) -> Self {
        let num_clusters = input_labels.iter().max().map_or(0, |&l| l + 1);

        let mut r = SimpleClustering {
            labels: input_labels.to_vec(),
            num_clusters,
        };

        r.remove_empty_clusters();
        r
    }

    fn get(&self, node: usize) -> usize {
        self.labels[node]
    }

    fn set(&mut self, node: usize, label: usize) {
        self.labels[node] = label;
        if label >= self.num_clusters {
            self.num_clusters = label + 1;
        }
    }

    fn nodes(&self) -> usize {
        self.labels.len()
    }

    fn num_clusters(&self) -> usize {
        self.num_clusters
    }

    fn remove_empty_clusters(&mut self) {
        let mut counts = vec![0; self.num_clusters()];

        for &l in self.labels.iter() {
            counts[l] += 1;
        }

        let mut new_labels = Vec::with_capacity(self.num_clusters());

        let mut new_label = 0;
        for cluster_count in counts {
            if cluster_count == 0 {
                new_labels.push(usize::MAX);
            } else {
                new_labels.push(new_label);
                new_label += 1;
            }
        }

        for l in self.labels.iter_mut() {
            *l = new_labels[*l];
        }

        self.num_clusters = new_label;
    }
}
