//! Score a saved fitted workflow on a dataset.

use std::path::PathBuf;

use serde::Serialize;
use tabfold::artifacts::{ArtifactKind, Envelope, load_artifact, save_artifact};
use tabfold::data::{OutcomeKind, load_dataset, registry};
use tabfold::ml::Target;
use tabfold::ml::metrics::{MetricKind, MetricResult, PerClassMetric, class_report};
use tabfold::workflow::FittedWorkflow;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Clone)]
struct CliOptions {
    model_path: PathBuf,
    source: DataSource,
    metrics: Vec<MetricKind>,
    report: Option<PathBuf>,
}

#[derive(Debug, Clone)]
enum DataSource {
    Named(String),
    Dir(PathBuf),
}

#[derive(Debug, Serialize)]
struct EvalReport {
    workflow_id: String,
    rows: usize,
    metrics: Vec<MetricResult>,
    per_class: Vec<PerClassMetric>,
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };
    tabfold::logging::init_stderr();
    let envelope: Envelope<FittedWorkflow> =
        load_artifact(&options.model_path, ArtifactKind::FittedWorkflow)
            .map_err(|err| err.to_string())?;
    let fitted = envelope.payload;
    let data = match &options.source {
        DataSource::Named(id) => registry::load_named(id, None),
        DataSource::Dir(dir) => load_dataset(dir),
    }
    .map_err(|err| err.to_string())?;

    let (metrics, _) = fitted
        .evaluate(&data, &options.metrics)
        .map_err(|err| err.to_string())?;
    println!("workflow {} on {} rows", envelope.artifact_id, data.n_rows());
    for result in &metrics {
        println!("{}: {:.4}", result.metric, result.value);
    }

    let per_class = if fitted.model.mode() == OutcomeKind::Classification {
        let baked = fitted.recipe.bake(&data).map_err(|err| err.to_string())?;
        let truth = Target::from_dataset(&baked).map_err(|err| err.to_string())?;
        let predictions = fitted.predict(&data).map_err(|err| err.to_string())?;
        let rows = class_report(&truth, &predictions).map_err(|err| err.to_string())?;
        println!("per-class:");
        for row in &rows {
            println!(
                "  {:<16} support={:<6} precision={:.4} recall={:.4} f1={:.4}",
                row.class_id, row.support, row.precision, row.recall, row.f1
            );
        }
        rows
    } else {
        Vec::new()
    };

    if let Some(path) = options.report {
        let report = EvalReport {
            workflow_id: envelope.artifact_id.to_string(),
            rows: data.n_rows(),
            metrics,
            per_class,
        };
        save_artifact(&path, ArtifactKind::TestReport, &report).map_err(|err| err.to_string())?;
        println!("report written to {}", path.display());
    }
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<Option<CliOptions>, String> {
    let mut model_path = None;
    let mut source = None;
    let mut metrics = Vec::new();
    let mut report = None;
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--model" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--model requires a value".to_string())?;
                model_path = Some(PathBuf::from(value));
            }
            "--dataset" => {
                idx += 1;
                let value =
                    args.get(idx).ok_or_else(|| "--dataset requires a value".to_string())?;
                source = Some(DataSource::Named(value.clone()));
            }
            "--data" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--data requires a value".to_string())?;
                source = Some(DataSource::Dir(PathBuf::from(value)));
            }
            "--metrics" => {
                idx += 1;
                let value =
                    args.get(idx).ok_or_else(|| "--metrics requires a value".to_string())?;
                metrics = value
                    .split(',')
                    .map(|name| name.trim().parse::<MetricKind>())
                    .collect::<Result<_, _>>()
                    .map_err(|err| err.to_string())?;
            }
            "--report" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--report requires a value".to_string())?;
                report = Some(PathBuf::from(value));
            }
            unknown => {
                return Err(format!("Unknown argument: {unknown}\n\n{}", help_text()));
            }
        }
        idx += 1;
    }
    let model_path = model_path.ok_or_else(|| "--model is required".to_string())?;
    let source = source.ok_or_else(|| "--dataset or --data is required".to_string())?;
    Ok(Some(CliOptions {
        model_path,
        source,
        metrics,
        report,
    }))
}

fn help_text() -> String {
    [
        "tabfold-model-eval",
        "",
        "Scores a fitted workflow artifact on a dataset.",
        "",
        "Usage:",
        "  tabfold-model-eval --model <workflow.json> (--dataset <id> | --data <dir>) [options]",
        "",
        "Options:",
        "  --model <path>     Fitted workflow artifact (required).",
        "  --dataset <id>     Built-in dataset id.",
        "  --data <dir>       Dataset directory with manifest.json and rows.jsonl.",
        "  --metrics <list>   Comma-separated metric names (default: by outcome mode).",
        "  --report <path>    Also write the scores as a JSON report.",
    ]
    .join("\n")
}
