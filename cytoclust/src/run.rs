use crate::aggregate::{ClusterMeans, SpecificityCounts};
use crate::cache::{cache_key, RunCache, ALGORITHM_VERSION};
use crate::error::{ClusterError, SampleFailure};
use crate::params::ClusteringParams;
use crate::pipeline::cluster_sample;
use crate::sample::Cohort;
use log::{error, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Cluster assignment of one successfully processed sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleAssignment {
    /// Sample id
    pub sample: String,
    /// Cluster of each event, dense in `1..=num_clusters`
    pub labels: Vec<u32>,
    /// Number of clusters
    pub num_clusters: usize,
    /// Modularity of the final partition
    pub modularity: f64,
    /// Edges of the similarity graph
    pub edges: usize,
}

/// Everything a run produces. Rows appear in sample input order; within a sample, in cluster id order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusteringRun {
    /// Cache key the run was computed for
    pub key: String,
    /// Algorithm version that produced the run
    pub algorithm_version: String,
    /// Parameters of the run
    pub params: ClusteringParams,
    /// Clustering markers, in column order
    pub markers: Vec<String>,
    /// Specificity panel, in tag order
    pub specificities: Vec<String>,
    /// One entry per successful sample
    pub assignments: Vec<SampleAssignment>,
    /// Cluster means of every successful sample, each followed by its whole-sample row
    pub cluster_means: Vec<ClusterMeans>,
    /// Specificity counts of every cluster of every successful sample
    pub specificity_counts: Vec<SpecificityCounts>,
    /// Smallest and largest cluster count over successful samples with events
    pub cluster_range: Option<(usize, usize)>,
    /// Samples that failed, with the stage that failed
    pub failures: Vec<SampleFailure>,
}

impl ClusteringRun {
    /// Assignment of sample `id`, if it succeeded
    pub fn assignment(&self, id: &str) -> Option<&SampleAssignment> {
        self.assignments.iter().find(|a| a.sample == id)
    }
}

/// Runs the per-sample pipeline over a cohort and assembles the run tables.
#[derive(Clone, Debug)]
pub struct Orchestrator {
    params: ClusteringParams,
    cache: Option<RunCache>,
}

impl Orchestrator {
    /// Orchestrator without a cache
    pub fn new(params: ClusteringParams) -> Self {
        Orchestrator { params, cache: None }
    }

    /// Reuse and store whole runs in `cache`
    pub fn with_cache(mut self, cache: RunCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Cluster every sample of `cohort`.
    ///
    /// Invalid parameters fail the whole run. A failing sample is recorded in [`ClusteringRun::failures`] and the
    /// remaining samples are still processed. When a cache is configured, a stored run with the same key is
    /// returned instead of recomputing; cache read and write problems are logged and otherwise ignored.
    pub fn run(&self, cohort: &Cohort) -> Result<ClusteringRun, ClusterError> {
        self.params.validate()?;
        let key = cache_key(cohort, &self.params);

        if let Some(cache) = &self.cache {
            match cache.load(&key) {
                Ok(Some(run)) => {
                    info!(
                        "reusing cached clustering run {key} from {}; inputs are matched by content key only",
                        cache.path_for(&key).display()
                    );
                    return Ok(run);
                }
                Ok(None) => info!("no cached clustering run for key {key}"),
                Err(e) => warn!(
                    "ignoring unreadable cache artifact {}: {e}",
                    cache.path_for(&key).display()
                ),
            }
        }

        let run = self.compute(cohort, key);

        if let Some(cache) = &self.cache {
            match cache.store(&run) {
                Ok(path) => info!("stored clustering run at {}", path.display()),
                Err(e) => warn!("could not store clustering run in {}: {e}", cache.dir().display()),
            }
        }
        Ok(run)
    }

    fn compute(&self, cohort: &Cohort, key: String) -> ClusteringRun {
        info!(
            "clustering {} samples on {} markers with k = {}, resolution = {}",
            cohort.samples().len(),
            cohort.markers().len(),
            self.params.k,
            self.params.resolution
        );

        let results = cohort
            .samples()
            .par_iter()
            .map(|sample| cluster_sample(sample, cohort.panel(), &self.params))
            .collect::<Vec<_>>();

        let mut run = ClusteringRun {
            key,
            algorithm_version: ALGORITHM_VERSION.to_string(),
            params: self.params.clone(),
            markers: cohort.markers().to_vec(),
            specificities: cohort.panel().labels().to_vec(),
            assignments: Vec::with_capacity(results.len()),
            cluster_means: Vec::new(),
            specificity_counts: Vec::new(),
            cluster_range: None,
            failures: Vec::new(),
        };

        for result in results {
            match result {
                Ok(clustering) => {
                    if clustering.num_clusters > 0 {
                        let k = clustering.num_clusters;
                        run.cluster_range = Some(match run.cluster_range {
                            Some((lo, hi)) => (lo.min(k), hi.max(k)),
                            None => (k, k),
                        });
                    }
                    run.cluster_means.extend(clustering.summary.means);
                    run.specificity_counts.extend(clustering.summary.counts);
                    run.assignments.push(SampleAssignment {
                        sample: clustering.sample,
                        labels: clustering.labels,
                        num_clusters: clustering.num_clusters,
                        modularity: clustering.modularity,
                        edges: clustering.edges,
                    });
                }
                Err(failure) => {
                    error!("{failure}");
                    run.failures.push(failure);
                }
            }
        }

        match run.cluster_range {
            Some((lo, hi)) => info!("clusters per sample: min {lo}, max {hi}"),
            None => warn!("no sample produced clusters"),
        }
        if !run.failures.is_empty() {
            warn!("{} of {} samples failed", run.failures.len(), cohort.samples().len());
        }
        run
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::Stage;
    use crate::sample::{Sample, SpecificityPanel};
    use ndarray::Array2;
    use ndarray_rand::RandomExt;
    use rand::SeedableRng;
    use rand_distr::Normal;
    use rand_pcg::Pcg64Mcg;

    fn blob_sample(id: &str, events: usize, seed: u64, panel: &SpecificityPanel) -> Sample {
        let mut rng = Pcg64Mcg::seed_from_u64(seed);
        let values = Array2::<f64>::random_using((events, 3), Normal::new(0.0, 1.0).unwrap(), &mut rng);
        let spec = (0..events).map(|i| i % panel.len()).collect();
        Sample::new(id, values, spec, panel).unwrap()
    }

    fn cohort(samples: Vec<Sample>, panel: SpecificityPanel) -> Cohort {
        Cohort::new(vec!["CD3".into(), "CD4".into(), "CD8".into()], panel, samples).unwrap()
    }

    fn params(k: usize) -> ClusteringParams {
        ClusteringParams {
            k,
            ..ClusteringParams::default()
        }
    }

    #[test]
    fn test_failure_isolation() {
        let panel = SpecificityPanel::new(["none", "flu"]).unwrap();
        let samples = vec![
            blob_sample("a", 60, 1, &panel),
            blob_sample("tiny", 5, 2, &panel),
            blob_sample("b", 80, 3, &panel),
        ];
        let cohort = cohort(samples, panel);
        let run = Orchestrator::new(params(5)).run(&cohort).unwrap();

        assert_eq!(run.failures.len(), 1);
        assert_eq!(run.failures[0].sample, "tiny");
        assert_eq!(run.failures[0].stage, Stage::NeighborIndex);

        let ids = run.assignments.iter().map(|a| a.sample.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(run.assignment("tiny").is_none());
        assert_eq!(run.assignment("a").unwrap().labels.len(), 60);
        assert!(run.cluster_means.iter().all(|m| m.sample != "tiny"));

        let (lo, hi) = run.cluster_range.unwrap();
        let ks = run.assignments.iter().map(|a| a.num_clusters).collect::<Vec<_>>();
        assert_eq!(lo, *ks.iter().min().unwrap());
        assert_eq!(hi, *ks.iter().max().unwrap());
    }

    #[test]
    fn test_output_order() {
        let panel = SpecificityPanel::new(["none", "flu"]).unwrap();
        let samples = (0..4).map(|i| blob_sample(&format!("s{i}"), 50, i, &panel)).collect();
        let cohort = cohort(samples, panel);
        let run = Orchestrator::new(params(8)).run(&cohort).unwrap();

        let ids = run.assignments.iter().map(|a| a.sample.clone()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["s0", "s1", "s2", "s3"]);

        // the means table holds K cluster rows then the whole-sample row, per sample in input order
        let mut offset = 0;
        for a in &run.assignments {
            let rows = &run.cluster_means[offset..offset + a.num_clusters + 1];
            assert!(rows.iter().all(|m| m.sample == a.sample));
            offset += a.num_clusters + 1;
        }
        assert_eq!(offset, run.cluster_means.len());
        assert_eq!(
            run.specificity_counts.len(),
            run.assignments.iter().map(|a| a.num_clusters).sum::<usize>()
        );
    }

    #[test]
    fn test_empty_sample() {
        let panel = SpecificityPanel::new(["none"]).unwrap();
        let empty = Sample::new("empty", Array2::zeros((0, 3)), vec![], &panel).unwrap();
        let samples = vec![empty, blob_sample("full", 40, 7, &panel)];
        let cohort = cohort(samples, panel);
        let run = Orchestrator::new(params(5)).run(&cohort).unwrap();

        assert!(run.failures.is_empty());
        let empty = run.assignment("empty").unwrap();
        assert_eq!(empty.num_clusters, 0);
        assert!(empty.labels.is_empty());

        // the empty sample does not pull the minimum to zero
        let full = run.assignment("full").unwrap().num_clusters;
        assert_eq!(run.cluster_range, Some((full, full)));
    }

    #[test]
    fn test_invalid_params_fail_the_run() {
        let panel = SpecificityPanel::new(["none"]).unwrap();
        let cohort = cohort(vec![blob_sample("a", 20, 0, &panel)], panel);
        let bad = ClusteringParams {
            resolution: -1.0,
            ..ClusteringParams::default()
        };
        assert!(matches!(
            Orchestrator::new(bad).run(&cohort),
            Err(ClusterError::InvalidParameter { name: "resolution", .. })
        ));
    }

    #[test]
    fn test_cache_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let panel = SpecificityPanel::new(["none", "flu"]).unwrap();
        let cohort = cohort(vec![blob_sample("a", 50, 11, &panel), blob_sample("b", 50, 12, &panel)], panel);

        let orchestrator = Orchestrator::new(params(6)).with_cache(RunCache::new(dir.path()));
        let first = orchestrator.run(&cohort).unwrap();
        let path = RunCache::new(dir.path()).path_for(&first.key);
        assert!(path.exists());

        let second = orchestrator.run(&cohort).unwrap();
        assert_eq!(first, second);

        // a fresh computation agrees with the cached one
        let uncached = Orchestrator::new(params(6)).run(&cohort).unwrap();
        assert_eq!(first, uncached);
    }

    #[test]
    fn test_cache_key_changes() {
        let panel = SpecificityPanel::new(["none", "flu"]).unwrap();
        let base = cohort(vec![blob_sample("a", 30, 1, &panel)], panel.clone());
        let key = cache_key(&base, &params(5));
        assert_eq!(key, cache_key(&base.clone(), &params(5)));
        assert_eq!(key.len(), 64);

        assert_ne!(key, cache_key(&base, &params(6)));
        let reseeded = ClusteringParams {
            seed: 1,
            ..params(5)
        };
        assert_ne!(key, cache_key(&base, &reseeded));

        let other_values = cohort(vec![blob_sample("a", 30, 2, &panel)], panel.clone());
        assert_ne!(key, cache_key(&other_values, &params(5)));

        let renamed = cohort(vec![blob_sample("b", 30, 1, &panel)], panel.clone());
        assert_ne!(key, cache_key(&renamed, &params(5)));

        let relabelled = {
            let s = blob_sample("a", 30, 1, &panel);
            let spec = s.specificity().iter().map(|&t| 1 - t).collect();
            cohort(vec![Sample::new("a", s.values().to_owned(), spec, &panel).unwrap()], panel.clone())
        };
        assert_ne!(key, cache_key(&relabelled, &params(5)));
    }

    #[test]
    fn test_corrupt_cache_is_recomputed() {
        let dir = tempfile::tempdir().unwrap();
        let panel = SpecificityPanel::new(["none"]).unwrap();
        let cohort = cohort(vec![blob_sample("a", 30, 4, &panel)], panel);
        let cache = RunCache::new(dir.path());
        let key = cache_key(&cohort, &params(5));

        std::fs::write(cache.path_for(&key), b"not a gzip stream").unwrap();
        assert!(cache.load(&key).is_err());

        let run = Orchestrator::new(params(5)).with_cache(cache.clone()).run(&cohort).unwrap();
        assert_eq!(run.key, key);
        assert_eq!(cache.load(&key).unwrap(), Some(run));
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RunCache::new(dir.path().join("not-created-yet"));
        assert!(cache.load("0123").unwrap().is_none());
    }
}
