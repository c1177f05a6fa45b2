use crate::aggregate::ClusterKey;
use crate::error::{ClusterError, Stage};
use crate::nn::knn;
use crate::params::ClusteringParams;
use crate::pipeline::{cluster_sample, SampleClustering};
use crate::sample::{Sample, SpecificityPanel};
use crate::snn::jaccard_edges;
use approx::assert_relative_eq;
use ndarray::{concatenate, Array2, Axis};
use ndarray_rand::RandomExt;
use rand::SeedableRng;
use rand_distr::Normal;
use rand_pcg::Pcg64Mcg;
use std::collections::{BTreeSet, HashMap};

/// Gaussian blobs of unit standard deviation in two markers, one blob per `(size, center)`, in order.
fn blobs(groups: &[(usize, [f64; 2])], seed: u64) -> Array2<f64> {
    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let parts = groups
        .iter()
        .map(|&(n, center)| {
            let mut blob = Array2::<f64>::random_using((n, 2), Normal::new(0.0, 1.0).unwrap(), &mut rng);
            blob.column_mut(0).mapv_inplace(|x| x + center[0]);
            blob.column_mut(1).mapv_inplace(|x| x + center[1]);
            blob
        })
        .collect::<Vec<_>>();
    let views = parts.iter().map(|p| p.view()).collect::<Vec<_>>();
    concatenate(Axis(0), &views).unwrap()
}

fn sample(values: Array2<f64>, panel: &SpecificityPanel) -> Sample {
    let spec = (0..values.nrows()).map(|i| i % panel.len()).collect();
    Sample::new("s", values, spec, panel).unwrap()
}

fn params(k: usize, resolution: f64, seed: u64) -> ClusteringParams {
    ClusteringParams {
        k,
        resolution,
        seed,
        ..ClusteringParams::default()
    }
}

/// Events per community, independent of the numeric ids.
fn partition(labels: &[u32]) -> BTreeSet<BTreeSet<usize>> {
    let mut members: HashMap<u32, BTreeSet<usize>> = HashMap::new();
    for (event, &l) in labels.iter().enumerate() {
        members.entry(l).or_default().insert(event);
    }
    members.into_values().collect()
}

fn check_dense(c: &SampleClustering) {
    let ids = c.labels.iter().copied().collect::<BTreeSet<_>>();
    assert_eq!(ids, (1..=c.num_clusters as u32).collect::<BTreeSet<_>>());
}

#[test]
fn test_two_blobs() {
    let panel = SpecificityPanel::new(["none", "flu"]).unwrap();
    let s = sample(blobs(&[(50, [0.0, 0.0]), (50, [10.0, 10.0])], 17), &panel);

    // At resolution 1.0 modularity favors cutting each 50-event blob into 3-4 pieces (K = 6-7, Q near 0.7 against
    // 0.5 for the two blobs), so the blob-level structure is checked at a coarser resolution.
    let c = cluster_sample(&s, &panel, &params(10, 0.1, 42)).unwrap();
    assert_eq!(c.num_clusters, 2);
    check_dense(&c);

    let expected = [(0..50).collect::<BTreeSet<_>>(), (50..100).collect::<BTreeSet<_>>()]
        .into_iter()
        .collect::<BTreeSet<_>>();
    assert_eq!(partition(&c.labels), expected);

    let means = c
        .summary
        .means
        .iter()
        .filter(|m| matches!(m.cluster, ClusterKey::Cluster(_)))
        .collect::<Vec<_>>();
    assert_eq!(means.len(), 2);
    for marker in 0..2 {
        // within-cluster standard deviation is 1
        assert!((means[0].means[marker] - means[1].means[marker]).abs() > 1.0);
    }

    let whole = c.summary.means.last().unwrap();
    assert_eq!(whole.cluster, ClusterKey::WholeSample);
    assert_eq!(whole.events, 100);
}

#[test]
fn test_identical_points() {
    let panel = SpecificityPanel::new(["none"]).unwrap();
    let s = sample(Array2::from_elem((6, 2), 3.0), &panel);

    let neighbors = knn(&s.values(), 3).unwrap();
    let edges = jaccard_edges(&neighbors.view());
    assert!(!edges.is_empty());
    // an event is never its own neighbor, so tied neighbor sets overlap without being equal
    for e in &edges {
        assert!(e.weight > 0.0 && e.weight <= 1.0);
        assert_relative_eq!(e.weight, edges[0].weight);
    }

    let c = cluster_sample(&s, &panel, &params(3, 1.0, 0)).unwrap();
    assert_eq!(c.num_clusters, 1);
    assert_eq!(c.labels, vec![1; 6]);
    assert_eq!(c.summary.means[0].events, 6);
    assert_eq!(c.summary.means[0].means, vec![3.0, 3.0]);
}

#[test]
fn test_same_seed_same_partition() {
    let panel = SpecificityPanel::new(["none", "flu"]).unwrap();
    let mut rng = Pcg64Mcg::seed_from_u64(5);
    let values = Array2::<f64>::random_using((150, 4), Normal::new(0.0, 1.0).unwrap(), &mut rng);
    let s = sample(values, &panel);

    let p = params(15, 1.0, 1234);
    let a = cluster_sample(&s, &panel, &p).unwrap();
    let b = cluster_sample(&s, &panel, &p).unwrap();
    assert_eq!(partition(&a.labels), partition(&b.labels));
    assert_eq!(a.num_clusters, b.num_clusters);
    assert_eq!(a.modularity, b.modularity);
    assert_eq!(a, b);
}

#[test]
fn test_seed_does_not_change_clear_structure() {
    let panel = SpecificityPanel::new(["none"]).unwrap();
    let s = sample(
        blobs(&[(40, [0.0, 0.0]), (60, [12.0, 0.0]), (80, [0.0, 12.0])], 3),
        &panel,
    );

    let runs = [1u64, 2, 3, 99]
        .iter()
        .map(|&seed| cluster_sample(&s, &panel, &params(10, 0.1, seed)).unwrap())
        .collect::<Vec<_>>();
    for r in &runs {
        assert_eq!(r.num_clusters, 3);
        assert_relative_eq!(r.modularity, runs[0].modularity, epsilon = 1e-9);
        assert_eq!(partition(&r.labels), partition(&runs[0].labels));
        // largest blob gets id 1
        assert_eq!(r.labels[179], 1);
        assert_eq!(r.labels[0], 3);
    }
}

#[test]
fn test_k_boundary() {
    let panel = SpecificityPanel::new(["none"]).unwrap();
    let mut rng = Pcg64Mcg::seed_from_u64(8);
    let values = Array2::<f64>::random_using((12, 3), Normal::new(0.0, 1.0).unwrap(), &mut rng);
    let s = sample(values, &panel);

    let c = cluster_sample(&s, &panel, &params(10, 1.0, 0)).unwrap();
    assert_eq!(c.labels.len(), 12);
    check_dense(&c);

    let failure = cluster_sample(&s, &panel, &params(11, 1.0, 0)).unwrap_err();
    assert_eq!(failure.sample, "s");
    assert_eq!(failure.stage, Stage::NeighborIndex);
    assert_eq!(
        failure.message,
        ClusterError::InvalidK { k: 11, events: 12 }.to_string()
    );
}

#[test]
fn test_summary_invariants() {
    // the third tag never occurs in the sample
    let panel = SpecificityPanel::new(["none", "flu", "cmv"]).unwrap();
    let values = blobs(&[(70, [0.0, 0.0]), (50, [8.0, 8.0]), (30, [-8.0, 8.0])], 21);
    let spec = (0..values.nrows()).map(|i| usize::from(i % 4 == 0)).collect();
    let s = Sample::new("s", values, spec, &panel).unwrap();

    let c = cluster_sample(&s, &panel, &params(12, 1.0, 7)).unwrap();
    check_dense(&c);
    assert_eq!(c.summary.means.len(), c.num_clusters + 1);
    assert_eq!(c.summary.counts.len(), c.num_clusters);

    let sizes = c.summary.means[..c.num_clusters].iter().map(|m| m.events).collect::<Vec<_>>();
    assert_eq!(sizes.iter().sum::<usize>(), 150);
    assert!(sizes.windows(2).all(|w| w[0] >= w[1]));

    let totals = &c.summary.counts[0].totals;
    assert_eq!(totals, &vec![112, 38, 0]);
    for tag in 0..panel.len() {
        let sum = c.summary.counts.iter().map(|row| row.counts[tag]).sum::<usize>();
        assert_eq!(sum, totals[tag]);
    }
    for row in &c.summary.counts {
        assert_eq!(row.counts.iter().sum::<usize>(), sizes[row.cluster as usize - 1]);
        assert!(row.percentages[0].is_some() && row.percentages[1].is_some());
        assert_eq!(row.percentages[2], None);
    }
    let pct = c.summary.counts.iter().filter_map(|row| row.percentages[1]).sum::<f64>();
    assert_relative_eq!(pct, 100.0, epsilon = 1e-9);
}

#[test]
fn test_edge_count_reported() {
    let panel = SpecificityPanel::new(["none"]).unwrap();
    let s = sample(blobs(&[(30, [0.0, 0.0])], 4), &panel);
    let c = cluster_sample(&s, &panel, &params(5, 1.0, 0)).unwrap();

    let neighbors = knn(&s.values(), 5).unwrap();
    assert_eq!(c.edges, jaccard_edges(&neighbors.view()).len());
    assert!(c.modularity >= 0.0);
}
