//! `lathe status` — summarize the most recent run from its persisted
//! artifacts.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use console::style;

use lathe::config::LatheToml;
use lathe::events::PipelineEvent;
use lathe::events::Severity;

pub fn execute(project_dir: &Path) -> Result<()> {
    let config = LatheToml::load_or_default(project_dir)?;
    let runs_dir = config.run_dir(project_dir).join("runs");

    let Some(latest) = latest_run_dir(&runs_dir)? else {
        println!("No runs yet. Start one with: lathe run \"<prompt>\"");
        return Ok(());
    };

    let run_name = latest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    println!("{} {}", style("run").cyan().bold(), run_name);

    let events_path = latest.join("events.json");
    let events: Vec<PipelineEvent> = match std::fs::read_to_string(&events_path) {
        Ok(content) => serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", events_path.display()))?,
        Err(_) => {
            println!("  (no events recorded)");
            return Ok(());
        }
    };

    if let Some(last) = events.last() {
        println!("  phase: {}", last.phase);
        println!("  events: {}", events.len());
        let warnings = events.iter().filter(|e| e.severity == Severity::Warning).count();
        let errors = events.iter().filter(|e| e.severity == Severity::Error).count();
        println!("  warnings: {}, errors: {}", warnings, errors);
        println!("  last: {}", last.message);
    }

    if latest.join("scene.json").exists() {
        println!("  scene: {}", latest.join("scene.json").display());
    }
    Ok(())
}

/// The run directory with the newest modification time.
fn latest_run_dir(runs_dir: &Path) -> Result<Option<PathBuf>> {
    if !runs_dir.exists() {
        return Ok(None);
    }
    let mut latest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(runs_dir)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if latest.as_ref().is_none_or(|(t, _)| modified > *t) {
            latest = Some((modified, entry.path()));
        }
    }
    Ok(latest.map(|(_, path)| path))
}
