//! Run a tabfold experiment described by a TOML config.

use std::path::PathBuf;

use tabfold::config::{self, ExperimentConfig};
use tabfold::{experiment, logging};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

struct Options {
    config_path: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    init: Option<PathBuf>,
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };
    if let Some(path) = options.init {
        config::save(&ExperimentConfig::default(), &path).map_err(|err| err.to_string())?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }
    let mut config = match &options.config_path {
        Some(path) => config::load(path).map_err(|err| err.to_string())?,
        None => ExperimentConfig::default(),
    };
    if let Some(dir) = options.output_dir {
        config.output_dir = dir;
    }
    if let Err(err) = logging::init_in(&config.output_dir.join("logs")) {
        eprintln!("Cannot log to output directory: {err}");
        if let Err(err) = logging::init() {
            eprintln!("File logging disabled: {err}");
            logging::init_stderr();
        }
    }

    let summary = experiment::run(&config).map_err(|err| err.to_string())?;
    println!(
        "{}: {} training rows, {} test rows, {} resamples",
        summary.dataset, summary.n_training, summary.n_testing, summary.n_resamples
    );
    println!("Ranking:");
    for row in &summary.ranking {
        println!(
            "  {:>2}. {:<28} {} {:.4} (se {:.4}, n {})",
            row.rank, row.wflow_id, row.metric, row.mean, row.std_err, row.n
        );
    }
    for outcome in summary.workflows.iter().filter(|w| !w.params.is_empty()) {
        let params: Vec<String> = outcome
            .params
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        println!(
            "Tuned {} over {} candidates: {}",
            outcome.wflow_id,
            outcome.candidates,
            params.join(", ")
        );
    }
    println!("Best workflow: {}", summary.best);
    for result in &summary.test_metrics {
        println!("  test {}: {:.4}", result.metric, result.value);
    }
    println!("Reports written to {}", summary.output_dir.display());
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<Option<Options>, String> {
    let mut options = Options {
        config_path: None,
        output_dir: None,
        init: None,
    };
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--config" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--config requires a value".to_string())?;
                options.config_path = Some(PathBuf::from(value));
            }
            "--out" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--out requires a value".to_string())?;
                options.output_dir = Some(PathBuf::from(value));
            }
            "--init" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--init requires a value".to_string())?;
                options.init = Some(PathBuf::from(value));
            }
            unknown => {
                return Err(format!("Unknown argument: {unknown}\n\n{}", help_text()));
            }
        }
        idx += 1;
    }
    Ok(Some(options))
}

fn help_text() -> String {
    [
        "tabfold",
        "",
        "Split, resample, tune and compare models as described by an experiment config.",
        "",
        "Usage:",
        "  tabfold [--config <experiment.toml>] [--out <dir>]",
        "  tabfold --init <experiment.toml>",
        "",
        "Options:",
        "  --config <path>  Experiment config (default: built-in concrete regression)",
        "  --out <dir>      Override the config's output directory",
        "  --init <path>    Write a default config and exit",
        "",
        "Environment:",
        "  RUST_LOG             Log filter (default: info)",
        "  TABFOLD_CONFIG_HOME  Base directory for fallback logs",
    ]
    .join("\n")
}
