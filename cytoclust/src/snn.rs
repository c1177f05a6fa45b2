//! Shared-nearest-neighbor graph: kNN lists reweighted by the Jaccard index of the neighbor sets.

use log::info;
use louvain::Network;
use ndarray::ArrayView2;
use rayon::prelude::*;

/// One undirected edge of the similarity graph, with `0 < weight <= 1`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SnnEdge {
    /// Lower-numbered endpoint
    pub source: u32,
    /// Higher-numbered endpoint
    pub target: u32,
    /// `|N(source) ∩ N(target)| / |N(source) ∪ N(target)|`
    pub weight: f64,
}

fn intersection_size(a: &[u32], b: &[u32]) -> usize {
    let (mut i, mut j, mut n) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                n += 1;
                i += 1;
                j += 1;
            }
        }
    }
    n
}

/// Jaccard-weighted edges for every pair `(i, j)` where `j` is among the neighbors of `i` or `i` is among the
/// neighbors of `j`. Each unordered pair is reported once, with `source < target`. Pairs whose neighbor sets do not
/// intersect are dropped, so every weight is in `(0, 1]`. An event listed among its own neighbors is ignored.
pub fn jaccard_edges(neighbors: &ArrayView2<u32>) -> Vec<SnnEdge> {
    let sets = neighbors
        .outer_iter()
        .map(|row| {
            let mut set = row.to_vec();
            set.sort_unstable();
            set.dedup();
            set
        })
        .collect::<Vec<_>>();

    let sets = &sets;
    let edges = (0..sets.len())
        .into_par_iter()
        .flat_map_iter(move |i| {
            sets[i].iter().filter_map(move |&j| {
                if j as usize == i {
                    return None;
                }
                let (si, sj) = (&sets[i], &sets[j as usize]);
                // a mutual pair is reported from its lower endpoint only
                let mutual = sj.binary_search(&(i as u32)).is_ok();
                if mutual && (j as usize) < i {
                    return None;
                }
                let shared = intersection_size(si, sj);
                if shared == 0 {
                    return None;
                }
                let union = si.len() + sj.len() - shared;
                let (source, target) = if (i as u32) < j { (i as u32, j) } else { (j, i as u32) };
                Some(SnnEdge {
                    source,
                    target,
                    weight: shared as f64 / union as f64,
                })
            })
        })
        .collect::<Vec<_>>();

    info!("built {} jaccard edges over {} events", edges.len(), sets.len());
    edges
}

/// Undirected weighted network over `n_nodes` events. Events without a surviving edge stay as isolated nodes.
pub fn build_network(n_nodes: usize, edges: &[SnnEdge]) -> Network {
    Network::from_weighted_edges(n_nodes, edges.iter().map(|e| (e.source, e.target, e.weight)))
}
