//! Write a built-in simulated dataset to a dataset directory.

use std::path::PathBuf;

use tabfold::data::{BUILTIN_DATASETS, export_dataset, generate};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Clone)]
struct ExportOptions {
    name: String,
    out_dir: PathBuf,
    rows: Option<usize>,
    seed: u64,
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };
    let rows = match options.rows {
        Some(rows) => rows,
        None => BUILTIN_DATASETS
            .iter()
            .find(|(name, _)| *name == options.name)
            .map(|(_, n)| *n)
            .ok_or_else(|| format!("Unknown dataset: {}", options.name))?,
    };
    let data = generate(&options.name, rows, options.seed).map_err(|err| err.to_string())?;
    export_dataset(&data, &options.out_dir).map_err(|err| err.to_string())?;
    println!(
        "Exported {} ({} rows, {} columns) to {}",
        options.name,
        data.n_rows(),
        data.n_cols(),
        options.out_dir.display()
    );
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<Option<ExportOptions>, String> {
    let mut options = ExportOptions {
        name: String::new(),
        out_dir: PathBuf::new(),
        rows: None,
        seed: tabfold::data::registry::DEFAULT_SIM_SEED,
    };
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--name" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--name requires a value".to_string())?;
                options.name = value.clone();
            }
            "--out" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--out requires a value".to_string())?;
                options.out_dir = PathBuf::from(value);
            }
            "--rows" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--rows requires a value".to_string())?;
                options.rows = Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| format!("Invalid --rows value: {value}"))?,
                );
            }
            "--seed" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--seed requires a value".to_string())?;
                options.seed = value
                    .parse::<u64>()
                    .map_err(|_| format!("Invalid --seed value: {value}"))?;
            }
            unknown => {
                return Err(format!("Unknown argument: {unknown}\n\n{}", help_text()));
            }
        }
        idx += 1;
    }
    if options.name.is_empty() {
        return Err("--name is required".to_string());
    }
    if options.out_dir.as_os_str().is_empty() {
        return Err("--out is required".to_string());
    }
    Ok(Some(options))
}

fn help_text() -> String {
    let names: Vec<&str> = BUILTIN_DATASETS.iter().map(|(name, _)| *name).collect();
    [
        "tabfold-dataset-export".to_string(),
        String::new(),
        "Writes a simulated dataset as manifest.json + rows.jsonl.".to_string(),
        String::new(),
        "Usage:".to_string(),
        "  tabfold-dataset-export --name <id> --out <dir> [--rows <n>] [--seed <u64>]".to_string(),
        String::new(),
        format!("Datasets: {}", names.join(", ")),
    ]
    .join("\n")
}
