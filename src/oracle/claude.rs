//! Claude CLI-backed oracle client.
//!
//! Every role shells out to the `claude` CLI with a JSON-only system prompt
//! and parses the reply tolerantly (markdown fences and surrounding prose
//! are sliced away). Snapshot evidence is persisted under the run directory
//! and referenced by path in the prompt.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

use super::{
    AssemblyQcOracle, AttachmentOracle, AttachmentRequest, ComponentQcOracle, ConstructionOracle,
    ConstructionRequest, PlanningOracle,
};
use crate::component::QcVerdict;
use crate::plan::{BuildPlan, extract_json_object};
use crate::stage::Snapshot;

const PLANNER_SYSTEM_PROMPT: &str = r#"You are a 3D asset planner. Decompose the requested asset into parts.

You MUST respond with valid JSON only (no markdown, no explanation) matching this schema:
{
  "overview": "Brief strategy for building the whole asset",
  "components": [
    {
      "id": "snake_case_unique_id",
      "name": "Short part name",
      "description": "What this part looks like and how it relates to the others",
      "geometry_type": "primitive hint, e.g. cylinder",
      "material_type": "material hint, e.g. standard",
      "dependencies": ["ids of parts this one attaches onto"]
    }
  ]
}

Rules:
- 2 to 8 components; the structural base part comes first with no dependencies.
- dependencies reference component ids within this plan only.
- Keep descriptions concrete: proportions, colors, placement."#;

const CONSTRUCTION_SYSTEM_PROMPT: &str = r#"You are a 3D part builder. Produce a construction program.

You MUST respond with valid JSON only (no markdown) matching this schema:
{
  "entry": "build_<part>",
  "ops": [
    {"op": "primitive", "id": "n1", "shape": "box|sphere|cylinder|cone|plane|torus", "dims": [..]},
    {"op": "material", "target": "n1", "color": [r, g, b], "roughness": 0.5, "metalness": 0.0, "kind": "standard"},
    {"op": "transform", "target": "n1", "position": [x, y, z], "rotation": [x, y, z], "scale": [x, y, z]},
    {"op": "group", "id": "g1", "children": ["n1"]},
    {"op": "return", "target": "g1"}
  ]
}

Rules:
- The final op MUST be a single return yielding the finished part.
- dims are meters; color channels are 0..1; rotations are radians.
- Build at a sensible real-world scale, centered near the origin."#;

const COMPONENT_QC_SYSTEM_PROMPT: &str = r#"You are a visual QC judge for a single 3D part, shown from 8 standard angles.

You MUST respond with valid JSON only:
{"passed": true, "feedback": "corrective guidance when failing", "score": 0}

Score is 0..100. Fail malformed, misproportioned, or off-description parts and say exactly what to fix."#;

const ATTACHMENT_SYSTEM_PROMPT: &str = r#"You are a 3D assembler. Produce an attachment program that merges a part onto an assembly.

You MUST respond with valid JSON only:
{
  "entry": "attach_<part>",
  "ops": [
    {"op": "transform", "target": "part", "position": [x, y, z], "rotation": [x, y, z], "scale": [x, y, z]},
    {"op": "attach", "child": "part", "parent": "root"}
  ]
}

Rules:
- "root" is the existing assembly, "part" is the piece to place. Only transform and attach ops are allowed.
- parent may name any node id visible in the assembly.
- Place the part so it connects plausibly; no return op."#;

const ASSEMBLY_QC_SYSTEM_PROMPT: &str = r#"You are a visual QC judge for an assembly step, shown from 8 standard angles.

You MUST respond with valid JSON only:
{"passed": true, "feedback": "corrective guidance when failing", "score": 0}

Judge whether the newly attached part sits in a plausible position and scale relative to the rest."#;

/// Oracle backend that spawns the `claude` CLI per request.
pub struct ClaudeOracle {
    claude_cmd: String,
    /// Where snapshot evidence files are written before being referenced
    snapshot_dir: PathBuf,
}

impl ClaudeOracle {
    pub fn new(claude_cmd: impl Into<String>, snapshot_dir: impl Into<PathBuf>) -> Self {
        Self {
            claude_cmd: claude_cmd.into(),
            snapshot_dir: snapshot_dir.into(),
        }
    }

    async fn call(&self, system_prompt: &str, prompt: &str) -> Result<String> {
        let output = Command::new(&self.claude_cmd)
            .args(["--print", "--output-format", "text", "-p", prompt, "--system", system_prompt])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run {} CLI", self.claude_cmd))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Oracle call failed: {}", stderr);
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Write snapshot bytes to disk and return their paths, so prompts can
    /// reference evidence files instead of inlining bytes.
    fn persist_snapshots(&self, label: &str, snapshots: &[Snapshot]) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.snapshot_dir)
            .context("Failed to create snapshot directory")?;
        let mut paths = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            let path = self
                .snapshot_dir
                .join(format!("{}-view{}.bin", label, snapshot.view.index));
            std::fs::write(&path, &snapshot.data)
                .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
            paths.push(path);
        }
        Ok(paths)
    }

    fn snapshot_section(title: &str, paths: &[PathBuf]) -> String {
        let mut section = format!("## {}\n", title);
        for path in paths {
            section.push_str(&format!("- {}\n", path.display()));
        }
        section
    }
}

fn parse_verdict(reply: &str) -> Result<QcVerdict> {
    let cleaned = extract_json_object(reply).unwrap_or(reply);
    serde_json::from_str(cleaned).context("Failed to parse QC verdict as JSON")
}

fn slug(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[async_trait]
impl PlanningOracle for ClaudeOracle {
    async fn plan(&self, prompt: &str) -> Result<BuildPlan> {
        let request = format!(
            "Decompose this 3D asset request into a build plan.\n\n## Request\n{}\n\nRespond with JSON only.",
            prompt
        );
        let reply = self.call(PLANNER_SYSTEM_PROMPT, &request).await?;
        BuildPlan::parse(&reply)
    }
}

#[async_trait]
impl ConstructionOracle for ClaudeOracle {
    async fn generate(&self, request: ConstructionRequest<'_>) -> Result<String> {
        let mut prompt = format!(
            "Build this part as a construction program.\n\n## Part\n**Name:** {}\n**Description:** {}\n",
            request.component_name, request.description
        );
        if !request.geometry_hint.is_empty() {
            prompt.push_str(&format!("**Geometry hint:** {}\n", request.geometry_hint));
        }
        if !request.material_hint.is_empty() {
            prompt.push_str(&format!("**Material hint:** {}\n", request.material_hint));
        }
        if let Some(code) = request.previous_code {
            prompt.push_str(&format!("\n## Previous attempt\n```json\n{}\n```\n", code));
        }
        if let Some(error) = request.error_context {
            prompt.push_str(&format!("\n## What went wrong\n{}\n", error));
        }
        if !request.context_images.is_empty() {
            let paths = self.persist_snapshots(
                &format!("context-{}", slug(request.component_name)),
                request.context_images,
            )?;
            prompt.push_str(&Self::snapshot_section(
                "Style references (already-verified parts)",
                &paths,
            ));
        }
        prompt.push_str("\nRespond with JSON only.");
        self.call(CONSTRUCTION_SYSTEM_PROMPT, &prompt).await
    }
}

#[async_trait]
impl ComponentQcOracle for ClaudeOracle {
    async fn judge(
        &self,
        component_name: &str,
        snapshots: &[Snapshot],
        context_images: &[Snapshot],
    ) -> Result<QcVerdict> {
        let label = slug(component_name);
        let shot_paths = self.persist_snapshots(&format!("qc-{}", label), snapshots)?;
        let mut prompt = format!(
            "Judge the rendered part '{}'.\n\n{}",
            component_name,
            Self::snapshot_section("Snapshots (8 standard angles)", &shot_paths)
        );
        if !context_images.is_empty() {
            let ctx_paths =
                self.persist_snapshots(&format!("qc-ctx-{}", label), context_images)?;
            prompt.push_str(&Self::snapshot_section("Style references", &ctx_paths));
        }
        prompt.push_str("\nRespond with JSON only.");
        let reply = self.call(COMPONENT_QC_SYSTEM_PROMPT, &prompt).await?;
        parse_verdict(&reply)
    }
}

#[async_trait]
impl AttachmentOracle for ClaudeOracle {
    async fn generate_attachment(&self, request: AttachmentRequest<'_>) -> Result<String> {
        let label = slug(request.part_name);
        let assembly_paths =
            self.persist_snapshots(&format!("assembly-{}", label), request.assembly_snapshots)?;
        let part_paths =
            self.persist_snapshots(&format!("part-{}", label), request.part_snapshots)?;
        let mut prompt = format!(
            "Attach this part onto the assembly.\n\n## Asset strategy\n{}\n\n## Part\n**Name:** {}\n**Description:** {}\n\n{}{}",
            request.overview,
            request.part_name,
            request.part_description,
            Self::snapshot_section("Current assembly (8 angles)", &assembly_paths),
            Self::snapshot_section("Part to attach (8 angles)", &part_paths),
        );
        if let Some(error) = request.error_context {
            prompt.push_str(&format!("\n## Previous attempt feedback\n{}\n", error));
        }
        prompt.push_str("\nRespond with JSON only.");
        self.call(ATTACHMENT_SYSTEM_PROMPT, &prompt).await
    }
}

#[async_trait]
impl AssemblyQcOracle for ClaudeOracle {
    async fn judge_assembly(
        &self,
        overview: &str,
        part_name: &str,
        snapshots: &[Snapshot],
    ) -> Result<QcVerdict> {
        let paths =
            self.persist_snapshots(&format!("assembly-qc-{}", slug(part_name)), snapshots)?;
        let prompt = format!(
            "Judge this assembly step.\n\n## Asset strategy\n{}\n\n## Newly attached part\n{}\n\n{}\nRespond with JSON only.",
            overview,
            part_name,
            Self::snapshot_section("Assembly snapshots (8 angles)", &paths)
        );
        let reply = self.call(ASSEMBLY_QC_SYSTEM_PROMPT, &prompt).await?;
        parse_verdict(&reply)
    }
}
