use anyhow::Result;
use linkflow::graph::job::{LinkGraphJob, SolverSettings};
use linkflow::parsers::sndlib_parser::{build_job, load_network, resolve_sndlib_base_path};
use linkflow::scenarios;
use linkflow::solvers::solve;
use linkflow::utils::{link_count, max_congestion};
use std::fs::File;
use std::path::PathBuf;
use std::time::Instant;

use polars::prelude::*;
use rayon::prelude::*;

#[derive(Debug, Clone)]
enum InstanceKind {
    Sndlib(PathBuf),
    Line(usize),
    Grid(usize, usize),
    Ring(usize, usize),
}

#[derive(Debug, Clone)]
struct RunConfig {
    instance: String,
    kind: InstanceKind,
    accuracy: u32,
    saturation: u32,
}

#[derive(Debug)]
struct BenchmarkResult {
    instance: String,
    accuracy: u32,
    saturation: u32,
    nodes: u64,
    links: u64,
    total_demand: u64,
    unsatisfied_demand: u64,
    max_congestion: f64,
    pass1_sweeps: u64,
    pass2_sweeps: u64,
    cycles_eliminated: u64,
    time_sec: f64,
    history_json: String,
    error: String,
}

impl BenchmarkResult {
    fn failed(config: &RunConfig, error: String) -> Self {
        Self {
            instance: config.instance.clone(),
            accuracy: config.accuracy,
            saturation: config.saturation,
            nodes: 0,
            links: 0,
            total_demand: 0,
            unsatisfied_demand: 0,
            max_congestion: f64::NAN,
            pass1_sweeps: 0,
            pass2_sweeps: 0,
            cycles_eliminated: 0,
            time_sec: 0.0,
            history_json: "[]".to_string(),
            error,
        }
    }
}

fn build_instance(kind: &InstanceKind, settings: SolverSettings) -> Result<LinkGraphJob> {
    match kind {
        InstanceKind::Sndlib(path) => {
            let (graph, traffic) = load_network(path)?;
            build_job(&graph, &traffic, settings)
        }
        InstanceKind::Line(len) => scenarios::line(*len, settings),
        InstanceKind::Grid(width, height) => scenarios::grid(*width, *height, settings),
        InstanceKind::Ring(count, chord_step) => scenarios::ring_with_chords(*count, *chord_step, settings),
    }
}

fn run_single_benchmark(config: &RunConfig) -> BenchmarkResult {
    let settings = SolverSettings {
        accuracy: config.accuracy,
        short_path_saturation: config.saturation,
    };
    let mut job = match build_instance(&config.kind, settings) {
        Ok(job) => job,
        Err(e) => return BenchmarkResult::failed(config, format!("failed to build instance: {e}")),
    };
    let total_demand = job.total_demand();

    let solve_start = Instant::now();
    let stats = solve(&mut job);
    let time_sec = solve_start.elapsed().as_secs_f64();

    let history_json = serde_json::to_string(&stats).unwrap_or_else(|e| {
        eprintln!("failed to serialize pass history: {e}");
        "[]".to_string()
    });

    BenchmarkResult {
        instance: config.instance.clone(),
        accuracy: config.accuracy,
        saturation: config.saturation,
        nodes: job.size() as u64,
        links: link_count(&job) as u64,
        total_demand,
        unsatisfied_demand: job.total_unsatisfied_demand(),
        max_congestion: max_congestion(&job),
        pass1_sweeps: u64::from(stats.passes[0].sweeps),
        pass2_sweeps: u64::from(stats.passes[1].sweeps),
        cycles_eliminated: u64::from(stats.passes[0].cycles_eliminated),
        time_sec,
        history_json,
        error: String::new(),
    }
}

fn discover_instances() -> Vec<(String, InstanceKind)> {
    let mut kinds: Vec<(String, InstanceKind)> = vec![
        ("line-16".to_string(), InstanceKind::Line(16)),
        ("grid-6x6".to_string(), InstanceKind::Grid(6, 6)),
        ("ring-24".to_string(), InstanceKind::Ring(24, 4)),
    ];
    let base_path = resolve_sndlib_base_path();
    if let Ok(entries) = std::fs::read_dir(&base_path) {
        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "xml"))
            .collect();
        files.sort();
        for path in files {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "unnamed".to_string());
            kinds.push((name, InstanceKind::Sndlib(path)));
        }
    }
    kinds
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let accuracies = [4u32, 16, 64];
    let saturation = 80u32;

    let configs: Vec<RunConfig> = discover_instances()
        .into_iter()
        .flat_map(|(instance, kind)| {
            accuracies.iter().map(move |&accuracy| RunConfig {
                instance: instance.clone(),
                kind: kind.clone(),
                accuracy,
                saturation,
            })
        })
        .collect();

    println!("Running {} solver jobs...", configs.len());
    // Each job is single-threaded; independent jobs run in parallel.
    let results: Vec<BenchmarkResult> = configs.par_iter().map(run_single_benchmark).collect();

    for result in &results {
        println!(
            "{} (accuracy={}): demand={} residual={} congestion={:.3} sweeps={}+{} cycles={} time={:.4}s {}",
            result.instance,
            result.accuracy,
            result.total_demand,
            result.unsatisfied_demand,
            result.max_congestion,
            result.pass1_sweeps,
            result.pass2_sweeps,
            result.cycles_eliminated,
            result.time_sec,
            result.error,
        );
    }

    let instances_col: Vec<String> = results.iter().map(|r| r.instance.clone()).collect();
    let accuracies_col: Vec<u64> = results.iter().map(|r| u64::from(r.accuracy)).collect();
    let saturations_col: Vec<u64> = results.iter().map(|r| u64::from(r.saturation)).collect();
    let nodes_col: Vec<u64> = results.iter().map(|r| r.nodes).collect();
    let links_col: Vec<u64> = results.iter().map(|r| r.links).collect();
    let demand_col: Vec<u64> = results.iter().map(|r| r.total_demand).collect();
    let unsatisfied_col: Vec<u64> = results.iter().map(|r| r.unsatisfied_demand).collect();
    let congestion_col: Vec<f64> = results.iter().map(|r| r.max_congestion).collect();
    let pass1_col: Vec<u64> = results.iter().map(|r| r.pass1_sweeps).collect();
    let pass2_col: Vec<u64> = results.iter().map(|r| r.pass2_sweeps).collect();
    let cycles_col: Vec<u64> = results.iter().map(|r| r.cycles_eliminated).collect();
    let times_col: Vec<f64> = results.iter().map(|r| r.time_sec).collect();
    let history_col: Vec<String> = results.iter().map(|r| r.history_json.clone()).collect();
    let errors_col: Vec<String> = results.iter().map(|r| r.error.clone()).collect();

    let mut df_results = df!(
        "instance" => instances_col,
        "accuracy" => accuracies_col,
        "saturation" => saturations_col,
        "nodes" => nodes_col,
        "links" => links_col,
        "total_demand" => demand_col,
        "unsatisfied_demand" => unsatisfied_col,
        "max_congestion" => congestion_col,
        "pass1_sweeps" => pass1_col,
        "pass2_sweeps" => pass2_col,
        "cycles_eliminated" => cycles_col,
        "time_sec" => times_col,
        "history_json" => history_col,
        "error" => errors_col,
    )?;

    let mut output_file = File::create("mcf_results.csv")?;
    CsvWriter::new(&mut output_file)
        .include_header(true)
        .with_separator(b',')
        .finish(&mut df_results)?;

    println!("Results written to mcf_results.csv");

    Ok(())
}
