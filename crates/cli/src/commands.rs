//! Subcommand implementations.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::warn;

use omniconvert_core::catalog;
use omniconvert_core::engine::EngineRegistry;
use omniconvert_core::{
    Config, ConversionRequest, ConversionService, Format, Pathfinder, TaskEvent, TaskStatus,
};

pub async fn convert(
    config: &Config,
    inputs: Vec<PathBuf>,
    target: &str,
    output: Option<PathBuf>,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    if output.is_some() && inputs.len() > 1 {
        bail!("--output can only be used with a single input");
    }

    let service = Arc::new(
        ConversionService::from_config(config).with_subscriber(Arc::new(print_event)),
    );

    let interrupt = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling conversions");
                service.cancel_all().await;
            }
        })
    };

    let mut handles = Vec::with_capacity(inputs.len());
    let mut failed = 0usize;
    for input in &inputs {
        let mut request = ConversionRequest::new(input, target);
        if let Some(path) = &output {
            request = request.with_output_path(path);
        }
        if let Some(dir) = &output_dir {
            request = request.with_output_dir(dir);
        }

        match service.enqueue(request).await {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                eprintln!("{}: {}", input.display(), e);
                failed += 1;
            }
        }
    }

    for handle in handles {
        let task_id = handle.task_id().to_string();
        if handle.wait().await != TaskStatus::Done {
            failed += 1;
        } else if let Some(task) = service.status(&task_id).await {
            println!(
                "{} -> {}",
                task.input_path.display(),
                task.output_path.display()
            );
        }
    }

    service.shutdown().await;
    interrupt.abort();

    if failed > 0 {
        bail!("{} of {} conversions failed", failed, inputs.len());
    }
    Ok(())
}

fn print_event(event: TaskEvent) {
    let short_id: String = event.task_id.chars().take(8).collect();
    println!(
        "[{}] {:>5.1}% {:<9} {}",
        short_id,
        event.fraction * 100.0,
        event.status.as_str(),
        event.message
    );
}

pub fn route(config: &Config, source: &str, target: &str, json: bool) -> Result<()> {
    let pathfinder = Pathfinder::with_bridges(config.routing.bridge_table());
    let plan = pathfinder.find_path(source, target)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&plan).context("Failed to serialize plan")?
        );
        return Ok(());
    }

    println!("{}", plan);
    for (index, step) in plan.steps().iter().enumerate() {
        println!("  {}. {}", index + 1, step);
    }
    Ok(())
}

pub fn targets(config: &Config, source: &str) -> Result<()> {
    let format = Format::from_path(Path::new(source)).unwrap_or_else(|| Format::new(source));
    if !catalog::is_known(&format) {
        bail!("Unknown format: {}", format);
    }

    let pathfinder = Pathfinder::with_bridges(config.routing.bridge_table());
    let mut by_category: BTreeMap<_, Vec<String>> = BTreeMap::new();
    for target in pathfinder.supported_targets(format) {
        if let Some(category) = catalog::category_of(&target) {
            by_category
                .entry(category)
                .or_default()
                .push(target.to_string());
        }
    }

    for (category, formats) in by_category {
        println!("{:<9} {}", category.as_str(), formats.join(", "));
    }
    Ok(())
}

pub async fn check(config: &Config) -> Result<()> {
    let registry = EngineRegistry::with_defaults(&config.engines);
    let mut missing = 0usize;

    for (kind, name, result) in registry.validate_all().await {
        match result {
            Ok(()) => println!("ok       {:<12} {}", kind.as_str(), name),
            Err(e) => {
                missing += 1;
                println!("missing  {:<12} {}: {}", kind.as_str(), name, e);
            }
        }
    }

    if missing > 0 {
        bail!("{} engine(s) unavailable", missing);
    }
    Ok(())
}
