//! Full pipeline execution and planning-only mode — `lathe run` and
//! `lathe plan`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;
use uuid::Uuid;

use lathe::config::LatheToml;
use lathe::export::{AssetExporter, JsonExporter};
use lathe::oracle::{ClaudeOracle, Oracles, PlanningOracle};
use lathe::orchestrator::{Pipeline, PipelineSettings};
use lathe::stage::HeadlessStage;
use lathe::ui::RunPrinter;

use super::super::Cli;

pub async fn execute(
    cli: &Cli,
    project_dir: &Path,
    prompt: &str,
    max_attempts: Option<u32>,
) -> Result<()> {
    let config = LatheToml::load_or_default(project_dir)?;

    let run_id = Uuid::new_v4();
    let run_dir = config.run_dir(project_dir).join("runs").join(run_id.to_string());
    std::fs::create_dir_all(run_dir.join("snapshots"))
        .with_context(|| format!("Failed to create run directory {}", run_dir.display()))?;

    let oracle = Arc::new(ClaudeOracle::new(
        config.oracle.command.as_str(),
        run_dir.join("snapshots"),
    ));
    let stage = HeadlessStage::new(config.stage.fov_degrees, config.pipeline.settle_ms);
    let settings = PipelineSettings {
        max_attempts: max_attempts.unwrap_or(config.pipeline.max_attempts),
    };
    let pipeline = Pipeline::with_run_id(
        run_id,
        Oracles::from_shared(oracle),
        Box::new(stage),
        settings,
    );

    println!(
        "{} run {}: {}",
        style("lathe").cyan().bold(),
        style(run_id).dim(),
        prompt
    );

    // Stream events to the terminal while the run is in flight
    let printer = RunPrinter::new(cli.verbose);
    let mut rx = pipeline.subscribe();
    let printer_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => printer.print_event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
        printer
    });

    let outcome = pipeline.run(prompt).await;
    let printer = printer_task.await.context("Event printer task panicked")?;

    // Persist run artifacts regardless of outcome
    if let Some(plan) = &outcome.plan {
        std::fs::write(run_dir.join("plan.json"), serde_json::to_string_pretty(plan)?)
            .context("Failed to write plan.json")?;
    }
    let events_json = serde_json::to_string_pretty(&outcome.events)?;
    std::fs::write(run_dir.join("events.json"), events_json)
        .context("Failed to write events.json")?;

    match outcome.result {
        Ok(asset) => {
            let scene_path = run_dir.join("scene.json");
            let exporter = JsonExporter;
            exporter.export(&asset.root, &scene_path)?;
            printer.finish(&format!(
                "completed: {} attached, {} skipped",
                asset.attached.len(),
                asset.skipped.len()
            ));
            println!(
                "{} anchor '{}', {} nodes -> {}",
                style("done").green().bold(),
                asset.anchor_id,
                asset.root.node_count(),
                scene_path.display()
            );
            if !asset.skipped.is_empty() {
                println!(
                    "{} skipped parts: {}",
                    style("warning").yellow(),
                    asset.skipped.join(", ")
                );
            }
            Ok(())
        }
        Err(error) => {
            printer.finish("run aborted");
            anyhow::bail!("Pipeline run {} failed: {:#}", run_id, error);
        }
    }
}

pub async fn plan_only(project_dir: &Path, prompt: &str) -> Result<()> {
    let config = LatheToml::load_or_default(project_dir)?;
    let snapshot_dir = config.run_dir(project_dir).join("plan-snapshots");
    let oracle = ClaudeOracle::new(config.oracle.command.as_str(), snapshot_dir);

    let plan = oracle.plan(prompt).await.context("Planning failed")?;

    println!("{}", style("Overview").bold());
    println!("  {}\n", plan.overview);
    println!("{}", style("Components").bold());
    for component in &plan.components {
        let deps = if component.dependencies.is_empty() {
            String::from("-")
        } else {
            component.dependencies.join(", ")
        };
        println!(
            "  {} {} (deps: {})\n      {}",
            style(&component.id).cyan(),
            component.name,
            deps,
            component.description
        );
    }
    Ok(())
}
