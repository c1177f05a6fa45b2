// Command line utility for clustering cytometry samples with cytoclust

use anyhow::{Context, Error};
use clap::{value_parser, Arg, ArgAction, Command};
use cytoclust::cache::RunCache;
use cytoclust::io::{load_cohort, write_outputs, CsvLayout, DEFAULT_SPECIFICITY_COLUMN};
use cytoclust::{ClusteringParams, Orchestrator, SpecificityPanel};
use log::{info, warn};
use std::path::PathBuf;

pub fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Command::new("cytoclust-cmd")
        .about("Cluster each cytometry sample on its own and summarize the clusters")
        .arg(
            Arg::new("INPUT")
                .help("one CSV file per sample (optionally gzipped); the file name is the sample id")
                .required(true)
                .num_args(1..)
                .index(1)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("OUT_DIR")
                .help("Output directory")
                .short('o')
                .long("out_dir")
                .default_value(".")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("PANEL")
                .help("Comma-separated specificity tags, e.g. none,tetramerA,tetramerB")
                .short('p')
                .long("panel")
                .required(true)
                .value_delimiter(','),
        )
        .arg(
            Arg::new("MARKERS")
                .help("Comma-separated clustering marker columns [default: every column except the specificity column]")
                .short('m')
                .long("markers")
                .value_delimiter(','),
        )
        .arg(
            Arg::new("SPECIFICITY_COLUMN")
                .help("Name of the specificity column")
                .long("specificity_column")
                .default_value(DEFAULT_SPECIFICITY_COLUMN),
        )
        .arg(
            Arg::new("CONFIG")
                .help("JSON file with clustering parameters; flags below override its fields")
                .short('c')
                .long("config")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("K")
                .help("Number of nearest neighbors per event")
                .short('k')
                .long("k")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("RESOLUTION")
                .help("Modularity resolution")
                .short('r')
                .long("resolution")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("SEED")
                .help("Seed for community detection")
                .long("seed")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("CACHE_DIR")
                .help("Directory for reusing whole runs with identical inputs and parameters")
                .long("cache_dir")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("WRITE_RUN")
                .help("Also write the complete run as run.json")
                .long("write_run")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let inputs = matches
        .get_many::<PathBuf>("INPUT")
        .context("no input files")?
        .cloned()
        .collect::<Vec<_>>();
    let out_dir = matches.get_one::<PathBuf>("OUT_DIR").context("no output directory")?;

    let mut params = match matches.get_one::<PathBuf>("CONFIG") {
        Some(path) => ClusteringParams::from_json(path).with_context(|| path.display().to_string())?,
        None => ClusteringParams::default(),
    };
    if let Some(&k) = matches.get_one::<usize>("K") {
        params.k = k;
    }
    if let Some(&resolution) = matches.get_one::<f64>("RESOLUTION") {
        params.resolution = resolution;
    }
    if let Some(&seed) = matches.get_one::<u64>("SEED") {
        params.seed = seed;
    }
    params.validate()?;

    let panel = SpecificityPanel::new(matches.get_many::<String>("PANEL").context("no panel")?.cloned())?;
    let layout = CsvLayout {
        specificity_column: matches
            .get_one::<String>("SPECIFICITY_COLUMN")
            .context("no specificity column")?
            .clone(),
        markers: matches
            .get_many::<String>("MARKERS")
            .map(|markers| markers.cloned().collect()),
    };

    let cohort = load_cohort(&inputs, &layout, panel)?;
    info!(
        "loaded {} samples with markers {}",
        cohort.samples().len(),
        cohort.markers().join(",")
    );

    let mut orchestrator = Orchestrator::new(params);
    if let Some(dir) = matches.get_one::<PathBuf>("CACHE_DIR") {
        orchestrator = orchestrator.with_cache(RunCache::new(dir));
    }
    let run = orchestrator.run(&cohort)?;

    write_outputs(&run, out_dir).with_context(|| out_dir.display().to_string())?;
    if matches.get_flag("WRITE_RUN") {
        let path = out_dir.join("run.json");
        let file = std::fs::File::create(&path).with_context(|| path.display().to_string())?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &run)?;
    }

    if !run.failures.is_empty() {
        warn!("{} samples failed, see failures.csv", run.failures.len());
    }
    Ok(())
}
