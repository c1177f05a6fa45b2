use crate::objective::modularity;
use crate::standard_local_moving::StandardLocalMoving;
use crate::{Clustering, Network, SimpleClustering};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Default resolution for Louvain
pub const DEFAULT_RESOLUTION: f64 = 1.0;

/// Default bound on the number of local-moving passes made at each level
pub const DEFAULT_MAX_PASSES: usize = 100;

/// Default bound on the number of aggregation levels
pub const DEFAULT_MAX_LEVELS: usize = 32;

/// Perform the Louvain clustering algorithm
pub struct Louvain {
    resolution: f64,
    max_levels: usize,
    rng: ChaCha20Rng,
    local_moving: StandardLocalMoving,
}

/// Final partition produced by [`Louvain::run`].
#[derive(Clone, Debug, PartialEq)]
pub struct Communities {
    /// Community of each node, dense in `1..=num_communities`. Community 1 is the largest.
    pub labels: Vec<u32>,
    /// Number of distinct communities. Zero only for an empty network.
    pub num_communities: usize,
    /// Modularity of the partition at the configured resolution
    pub modularity: f64,
}

impl Communities {
    /// Members of each community, indexed by `id - 1`.
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.num_communities];
        for (node, &label) in self.labels.iter().enumerate() {
            members[label as usize - 1].push(node);
        }
        members
    }
}

impl Louvain {
    /// Initialize the Louvain algorithm with the given resolution.
    /// An optional random seed can be supplied, otherwise a seed of 0 will be used.
    pub fn new(resolution: f64, seed: Option<u64>) -> Louvain {
        Louvain::with_limits(resolution, seed, DEFAULT_MAX_PASSES, DEFAULT_MAX_LEVELS)
    }

    /// Like [`Louvain::new`], with explicit bounds on the local-moving passes per level and on the number of
    /// aggregation levels. Both bounds guarantee termination; a value of 0 is treated as 1.
    pub fn with_limits(resolution: f64, seed: Option<u64>, max_passes: usize, max_levels: usize) -> Louvain {
        Louvain {
            resolution,
            max_levels: max_levels.max(1),
            rng: ChaCha20Rng::seed_from_u64(seed.unwrap_or_default()),
            local_moving: StandardLocalMoving::new(resolution, max_passes.max(1)),
        }
    }

    /// Run local moving and aggregation until a level merges nothing. Returns true if cluster labels were updated,
    /// otherwise returns false.
    pub fn iterate<C: Clustering>(&mut self, n: &Network, c: &mut C) -> bool {
        let total_edge_weight = n.get_total_edge_weight();
        self.iterate_level(n, c, total_edge_weight, 0)
    }

    fn iterate_level<C: Clustering>(&mut self, n: &Network, c: &mut C, total_edge_weight: f64, level: usize) -> bool {
        // Update the clustering by moving individual nodes between clusters.
        let mut update = self.local_moving.iterate(n, c, total_edge_weight, &mut self.rng);

        if c.num_clusters() == n.nodes() || level + 1 >= self.max_levels {
            return update;
        }

        // Create an aggregate network based on the clustering of the non-aggregate network.
        let reduced_n = n.create_reduced_network(c);

        // Create one-cluster-per-node clustering
        let mut reduced_clusters = C::init_different_clusters(reduced_n.nodes());

        update |= self.iterate_level(&reduced_n, &mut reduced_clusters, total_edge_weight, level + 1);

        c.merge_clusters(&reduced_clusters);

        update
    }

    /// Partition `n` starting from singletons. Labels are relabelled by decreasing community size. A network
    /// without edges yields one community per node.
    pub fn run(&mut self, n: &Network) -> Communities {
        let mut c = SimpleClustering::init_different_clusters(n.nodes());
        self.iterate(n, &mut c);

        Communities {
            labels: c.relabel_by_size(),
            num_communities: c.num_clusters(),
            modularity: modularity(self.resolution, n, &c),
        }
    }
}
