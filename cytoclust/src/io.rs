//! Reading per-sample event tables and writing run tables as CSV. Paths ending in `.gz` are read and written
//! gzip-compressed.

use crate::error::ClusterError;
use crate::run::ClusteringRun;
use crate::sample::{Cohort, Sample, SpecificityPanel};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;
use ndarray::Array2;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Default name of the specificity column of an event table
pub const DEFAULT_SPECIFICITY_COLUMN: &str = "specificity";

/// Written for a percentage that is undefined because the sample has no event with the tag
pub const UNDEFINED_PERCENTAGE: &str = "NA";

fn is_gz(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "gz")
}

fn open_reader(path: &Path) -> Result<Box<dyn Read>, ClusterError> {
    let file = BufReader::new(File::open(path)?);
    if is_gz(path) {
        Ok(Box::new(MultiGzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

enum Sink {
    Plain(BufWriter<File>),
    Gz(GzEncoder<BufWriter<File>>),
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Sink::Plain(w) => w.write(buf),
            Sink::Gz(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Sink::Plain(w) => w.flush(),
            Sink::Gz(w) => w.flush(),
        }
    }
}

struct TableWriter {
    inner: csv::Writer<Sink>,
}

impl TableWriter {
    fn create(path: &Path) -> Result<Self, ClusterError> {
        let file = BufWriter::new(File::create(path)?);
        let sink = if is_gz(path) {
            Sink::Gz(GzEncoder::new(file, Compression::default()))
        } else {
            Sink::Plain(file)
        };
        Ok(TableWriter {
            inner: csv::Writer::from_writer(sink),
        })
    }

    fn row<I, S>(&mut self, record: I) -> Result<(), ClusterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        self.inner.write_record(record)?;
        Ok(())
    }

    fn finish(self) -> Result<(), ClusterError> {
        let mut file = match self.inner.into_inner().map_err(|e| e.into_error())? {
            Sink::Plain(w) => w,
            Sink::Gz(w) => w.finish()?,
        };
        file.flush()?;
        Ok(())
    }
}

/// Which columns of an event table hold what.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CsvLayout {
    /// Column holding each event's specificity tag
    pub specificity_column: String,
    /// Clustering marker columns, in order. `None` takes every column except the specificity column.
    pub markers: Option<Vec<String>>,
}

impl Default for CsvLayout {
    fn default() -> Self {
        CsvLayout {
            specificity_column: DEFAULT_SPECIFICITY_COLUMN.to_string(),
            markers: None,
        }
    }
}

/// Sample id of an event table: its file name without `.gz` and `.csv` extensions.
pub fn sample_id(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    name.strip_suffix(".csv").unwrap_or(name).to_string()
}

/// Read one event table: a header row, then one row per event with a numeric cell per marker and a specificity
/// tag from `panel`. Returns the marker names in column order and the sample.
pub fn read_sample_csv(
    path: &Path,
    id: &str,
    layout: &CsvLayout,
    panel: &SpecificityPanel,
) -> Result<(Vec<String>, Sample), ClusterError> {
    let source_name = path.display().to_string();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(open_reader(path)?);
    let headers = reader.headers()?.clone();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ClusterError::MissingColumn {
                column: name.to_string(),
                source_name: source_name.clone(),
            })
    };

    let spec_col = column(&layout.specificity_column)?;
    let markers = match &layout.markers {
        Some(markers) => markers.clone(),
        None => headers
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != spec_col)
            .map(|(_, h)| h.to_string())
            .collect(),
    };
    let marker_cols = markers.iter().map(|m| column(m)).collect::<Result<Vec<_>, _>>()?;

    let mut values = Vec::new();
    let mut tags = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        for (&col, marker) in marker_cols.iter().zip(&markers) {
            let cell = record.get(col).unwrap_or("");
            let v = cell.parse::<f64>().map_err(|_| ClusterError::NonNumeric {
                source_name: source_name.clone(),
                row: row + 1,
                marker: marker.clone(),
                value: cell.to_string(),
            })?;
            values.push(v);
        }
        tags.push(record.get(spec_col).unwrap_or("").to_string());
    }

    let events = tags.len();
    let found = values.len().checked_div(events).unwrap_or(markers.len());
    let values = Array2::from_shape_vec((events, markers.len()), values).map_err(|_| ClusterError::MarkerCount {
        sample: id.to_string(),
        expected: markers.len(),
        found,
    })?;
    let specificity = panel.encode(&tags)?;
    let sample = Sample::new(id, values, specificity, panel)?;
    info!("read {} events of sample '{id}' from {source_name}", events);
    Ok((markers, sample))
}

/// Read one event table per path into a cohort. Sample ids come from the file names. When `layout` names no
/// markers, the first table's columns decide them and every other table must carry the same marker columns.
pub fn load_cohort(
    paths: &[PathBuf],
    layout: &CsvLayout,
    panel: SpecificityPanel,
) -> Result<Cohort, ClusterError> {
    let mut layout = layout.clone();
    let mut markers = None;
    let mut samples = Vec::with_capacity(paths.len());

    for path in paths {
        let (found, sample) = read_sample_csv(path, &sample_id(path), &layout, &panel)?;
        if markers.is_none() {
            layout.markers = Some(found.clone());
            markers = Some(found);
        }
        samples.push(sample);
    }

    Cohort::new(markers.or(layout.markers).unwrap_or_default(), panel, samples)
}

fn format_percentage(p: Option<f64>) -> String {
    p.map_or_else(|| UNDEFINED_PERCENTAGE.to_string(), |p| p.to_string())
}

/// Event-level assignments: `sample,event,cluster`, events numbered from zero.
pub fn write_assignments(run: &ClusteringRun, path: &Path) -> Result<(), ClusterError> {
    let mut w = TableWriter::create(path)?;
    w.row(["sample", "event", "cluster"])?;
    for a in &run.assignments {
        for (event, cluster) in a.labels.iter().enumerate() {
            w.row([a.sample.clone(), event.to_string(), cluster.to_string()])?;
        }
    }
    w.finish()
}

/// Cluster means: `sample,cluster,events,<marker>...`. The whole-sample row has cluster `all`.
pub fn write_cluster_means(run: &ClusteringRun, path: &Path) -> Result<(), ClusterError> {
    let mut w = TableWriter::create(path)?;
    let header = ["sample", "cluster", "events"]
        .into_iter()
        .map(str::to_string)
        .chain(run.markers.iter().cloned());
    w.row(header)?;
    for m in &run.cluster_means {
        let row = [m.sample.clone(), m.cluster.to_string(), m.events.to_string()]
            .into_iter()
            .chain(m.means.iter().map(f64::to_string));
        w.row(row)?;
    }
    w.finish()
}

/// Specificity make-up, one row per cluster and tag: `sample,cluster,specificity,count,total,percentage`.
pub fn write_specificity_counts(run: &ClusteringRun, path: &Path) -> Result<(), ClusterError> {
    let mut w = TableWriter::create(path)?;
    w.row(["sample", "cluster", "specificity", "count", "total", "percentage"])?;
    for c in &run.specificity_counts {
        for (tag, name) in run.specificities.iter().enumerate() {
            w.row([
                c.sample.clone(),
                c.cluster.to_string(),
                name.clone(),
                c.counts[tag].to_string(),
                c.totals[tag].to_string(),
                format_percentage(c.percentages[tag]),
            ])?;
        }
    }
    w.finish()
}

/// Per-sample statistics: `sample,events,clusters,modularity,edges`.
pub fn write_sample_stats(run: &ClusteringRun, path: &Path) -> Result<(), ClusterError> {
    let mut w = TableWriter::create(path)?;
    w.row(["sample", "events", "clusters", "modularity", "edges"])?;
    for a in &run.assignments {
        w.row([
            a.sample.clone(),
            a.labels.len().to_string(),
            a.num_clusters.to_string(),
            a.modularity.to_string(),
            a.edges.to_string(),
        ])?;
    }
    w.finish()
}

/// Failed samples: `sample,stage,message`.
pub fn write_failures(run: &ClusteringRun, path: &Path) -> Result<(), ClusterError> {
    let mut w = TableWriter::create(path)?;
    w.row(["sample", "stage", "message"])?;
    for f in &run.failures {
        w.row([f.sample.clone(), f.stage.to_string(), f.message.clone()])?;
    }
    w.finish()
}

/// Write every run table into `out_dir`, creating it if needed. Returns the written paths.
pub fn write_outputs(run: &ClusteringRun, out_dir: &Path) -> Result<Vec<PathBuf>, ClusterError> {
    fs::create_dir_all(out_dir)?;
    let assignments = out_dir.join("assignments.csv.gz");
    let means = out_dir.join("cluster_means.csv");
    let counts = out_dir.join("specificity_counts.csv");
    let stats = out_dir.join("sample_stats.csv");
    let failures = out_dir.join("failures.csv");

    write_assignments(run, &assignments)?;
    write_cluster_means(run, &means)?;
    write_specificity_counts(run, &counts)?;
    write_sample_stats(run, &stats)?;
    write_failures(run, &failures)?;

    info!("wrote run tables to {}", out_dir.display());
    Ok(vec![assignments, means, counts, stats, failures])
}
