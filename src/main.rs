use clap::{Arg, ArgAction, Command};
use dicom_filter::descriptor::ItemDescriptor;
use dicom_filter::stage::{FilterStage, PipelineStage};
use dicom_filter::StageConfig;
use log::LevelFilter;
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("dicom-filter")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Script-based filter stage for DICOM pipelines")
        .long_about(
            "Evaluates a match script against each item's DICOM attributes.\n\
             Matching items pass downstream; the rest are quarantined.",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Stage configuration file path")
                .default_value("/etc/dicom-filter.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Load the configuration and check that the script parses")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("test-item")
                .long("test-item")
                .value_name("FILE")
                .help("Run item descriptor files (YAML) through the stage")
                .num_args(1..)
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging with per-item script results")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        match StageConfig::default().to_file(generate_path) {
            Ok(()) => println!("Default configuration written to: {generate_path}"),
            Err(e) => {
                eprintln!("Error generating configuration: {e:#}");
                process::exit(1);
            }
        }
        return;
    }

    let Some(config_path) = matches.get_one::<String>("config") else {
        eprintln!("No configuration file given");
        process::exit(1);
    };

    let config = match StageConfig::from_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };

    let stage = match FilterStage::from_config(&config) {
        Ok(stage) => Arc::new(stage),
        Err(e) => {
            eprintln!("Error creating stage '{}': {e}", config.name);
            process::exit(1);
        }
    };

    if matches.get_flag("test-config") {
        test_config(&stage);
        return;
    }

    let items: Vec<String> = matches
        .get_many::<String>("test-item")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    if items.is_empty() {
        eprintln!("Nothing to do: pass --test-item FILE... or --test-config");
        process::exit(2);
    }

    if !run_items(stage, items).await {
        process::exit(1);
    }
}

fn test_config(stage: &FilterStage) {
    let script = stage.script().current();
    println!("Stage: {}", stage.name());
    for file in stage.script_files() {
        println!("Script file: {}", file.display());
    }
    println!("Reload policy: {:?}", stage.script().policy());
    println!("Signature: {}", script.signature());
    println!("Loaded at: {}", script.loaded_at().to_rfc3339());
    println!("Expression: {}", script.expr());
    for path in script.expr().attributes() {
        println!("  reads {path} ({})", path.keywords());
    }
    println!("✅ Script parsed successfully");
}

/// Processes every descriptor on the blocking pool, the way a host pipeline
/// would call the stage from several workers. Returns false if any item failed.
async fn run_items(stage: Arc<FilterStage>, paths: Vec<String>) -> bool {
    let handles: Vec<_> = paths
        .into_iter()
        .map(|path| {
            let stage = Arc::clone(&stage);
            let descriptor = path.clone();
            let handle = tokio::task::spawn_blocking(move || -> anyhow::Result<bool> {
                let item = ItemDescriptor::from_file(&descriptor)?.into_item()?;
                Ok(stage.process(item)?.is_some())
            });
            (path, handle)
        })
        .collect();

    let mut ok = true;
    for (path, handle) in handles {
        match handle.await {
            Ok(Ok(true)) => println!("PASS        {path}"),
            Ok(Ok(false)) => println!("QUARANTINE  {path}"),
            Ok(Err(e)) => {
                println!("ERROR       {path}: {e:#}");
                ok = false;
            }
            Err(e) => {
                log::error!("Worker for {path} panicked: {e}");
                ok = false;
            }
        }
    }

    match serde_json::to_string_pretty(&stage.status()) {
        Ok(json) => println!("{json}"),
        Err(e) => log::error!("Failed to serialize stage status: {e}"),
    }
    ok
}
