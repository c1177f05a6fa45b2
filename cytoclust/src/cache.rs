//! Content-addressed storage of whole clustering runs.
//!
//! A run is keyed by a SHA-256 digest of everything that determines its output: the algorithm version, every
//! clustering parameter, the marker set, the specificity panel and, per sample, its id, shape, values and
//! specificity labels. Any change to one of these yields a different key, so a stored run is never reused for
//! inputs it was not computed from.

use crate::error::ClusterError;
use crate::params::ClusteringParams;
use crate::run::ClusteringRun;
use crate::sample::Cohort;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Version of the clustering algorithm. Part of every cache key, bump it when results change for the same inputs.
pub const ALGORITHM_VERSION: &str = concat!("cytoclust/", env!("CARGO_PKG_VERSION"), "/knn-jaccard-louvain");

fn update_bytes(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn update_u64(hasher: &mut Sha256, v: u64) {
    hasher.update(v.to_le_bytes());
}

/// Hex SHA-256 key of a run over `cohort` with `params`.
pub fn cache_key(cohort: &Cohort, params: &ClusteringParams) -> String {
    let mut hasher = Sha256::new();
    update_bytes(&mut hasher, ALGORITHM_VERSION.as_bytes());

    update_u64(&mut hasher, params.k as u64);
    update_u64(&mut hasher, params.resolution.to_bits());
    update_u64(&mut hasher, params.seed);
    update_u64(&mut hasher, params.max_passes as u64);
    update_u64(&mut hasher, params.max_levels as u64);

    update_u64(&mut hasher, cohort.markers().len() as u64);
    for marker in cohort.markers() {
        update_bytes(&mut hasher, marker.as_bytes());
    }
    update_u64(&mut hasher, cohort.panel().len() as u64);
    for tag in cohort.panel().labels() {
        update_bytes(&mut hasher, tag.as_bytes());
    }

    update_u64(&mut hasher, cohort.samples().len() as u64);
    for sample in cohort.samples() {
        update_bytes(&mut hasher, sample.id().as_bytes());
        let (rows, cols) = sample.values().dim();
        update_u64(&mut hasher, rows as u64);
        update_u64(&mut hasher, cols as u64);
        for v in sample.values().iter() {
            hasher.update(v.to_bits().to_le_bytes());
        }
        for &s in sample.specificity() {
            update_u64(&mut hasher, s as u64);
        }
    }

    format!("{:x}", hasher.finalize())
}

/// Directory of gzipped JSON run artifacts, one file per key.
#[derive(Clone, Debug)]
pub struct RunCache {
    dir: PathBuf,
}

impl RunCache {
    /// Cache rooted at `dir`. The directory is created on first store.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        RunCache { dir: dir.into() }
    }

    /// Cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Artifact path for `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("clustering-{key}.json.gz"))
    }

    /// Load the run stored under `key`. `Ok(None)` when nothing is stored; an error when the artifact exists but
    /// cannot be decoded or was stored under another key.
    pub fn load(&self, key: &str) -> Result<Option<ClusteringRun>, ClusterError> {
        let path = self.path_for(key);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        debug!("reading cached run from {}", path.display());
        let reader = BufReader::new(MultiGzDecoder::new(BufReader::new(file)));
        let run: ClusteringRun = serde_json::from_reader(reader)?;
        if run.key != key {
            return Err(ClusterError::CacheKeyMismatch {
                path: path.display().to_string(),
                expected: key.to_string(),
                found: run.key,
            });
        }
        Ok(Some(run))
    }

    /// Store `run` under its key. The artifact is written to a temporary file and renamed into place, so readers
    /// never observe a partial artifact.
    pub fn store(&self, run: &ClusteringRun) -> Result<PathBuf, ClusterError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&run.key);
        let tmp = self.dir.join(format!(".clustering-{}.json.gz.partial", run.key));

        let mut encoder = GzEncoder::new(BufWriter::new(File::create(&tmp)?), Compression::default());
        serde_json::to_writer(&mut encoder, run)?;
        encoder.finish()?.flush()?;

        fs::rename(&tmp, &path)?;
        debug!("stored run {} at {}", run.key, path.display());
        Ok(path)
    }
}
