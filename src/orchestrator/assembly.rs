//! Incremental assembly loop: dependency-sequence the verified parts,
//! anchor on the first, and attach the rest under QC with commit/rollback.
//!
//! Attachment logic runs on a clone of the committed anchor, never the
//! anchor itself — a rejected draft is discarded wholesale and the stage is
//! restored to the last committed state. Exhausting the budget for one part
//! skips that part; it is the pipeline's only soft-failure path.

use super::{Pipeline, restage};
use crate::errors::PipelineError;
use crate::oracle::AttachmentRequest;
use crate::phase::PipelinePhase;
use crate::plan::BuildPlan;
use crate::scene::SceneNode;
use crate::sequencer;

/// The final product of a completed run.
#[derive(Debug, Clone)]
pub struct AssembledAsset {
    /// The assembled tree, rooted at the anchor
    pub root: SceneNode,
    pub anchor_id: String,
    /// Component ids committed into the assembly, in attachment order
    pub attached: Vec<String>,
    /// Component ids abandoned after exhausting attachment attempts
    pub skipped: Vec<String>,
}

impl Pipeline {
    /// Fold all verified components into one assembly.
    pub(crate) async fn assemble(&mut self, plan: &BuildPlan) -> Result<AssembledAsset, PipelineError> {
        self.context.set_phase(PipelinePhase::Assembling);

        let sequenced = sequencer::sequence(plan).ok_or_else(|| {
            PipelineError::Critical(anyhow::anyhow!("cannot assemble an empty plan"))
        })?;
        for (component, dependency) in &sequenced.cycle_edges {
            self.context.events.warn(
                PipelinePhase::Assembling,
                format!(
                    "dependency cycle: '{}' -> '{}'; ignoring back-edge",
                    component, dependency
                ),
            );
        }
        self.context.events.info(
            PipelinePhase::Assembling,
            format!(
                "assembly order: [{}], anchor '{}'",
                sequenced.order.join(", "),
                sequenced.anchor_id
            ),
        );

        // Anchor: clone the verified object, recenter, stage, capture
        let mut assembly = self
            .verified_object(&sequenced.anchor_id)?
            .clone();
        assembly.recenter();
        restage(&mut self.stage, &assembly).await?;
        let mut assembly_snapshots = self
            .stage
            .capture_snapshots()
            .await
            .map_err(PipelineError::Critical)?;

        let max_attempts = self.context.settings.max_attempts;
        let mut attached = Vec::new();
        let mut skipped = Vec::new();

        for part_id in sequenced.attachments() {
            let part_plan = plan
                .get(part_id)
                .ok_or_else(|| {
                    PipelineError::Critical(anyhow::anyhow!(
                        "sequenced component '{}' is not in the plan",
                        part_id
                    ))
                })?
                .clone();
            let part_object = self.verified_object(part_id)?.clone();
            let part_snapshots = self.context.artifacts[part_id].images.clone();

            let mut feedback: Option<String> = None;
            let mut committed = false;

            for attempt in 1..=max_attempts {
                self.context.set_phase(PipelinePhase::Assembling);
                self.context.events.info(
                    PipelinePhase::Assembling,
                    format!("attaching '{}' (attempt {}/{})", part_plan.name, attempt, max_attempts),
                );

                // Fresh program every attempt; only the feedback text persists
                let request = AttachmentRequest {
                    overview: &plan.overview,
                    part_name: &part_plan.name,
                    part_description: &part_plan.description,
                    assembly_snapshots: &assembly_snapshots,
                    part_snapshots: &part_snapshots,
                    error_context: feedback.as_deref(),
                };
                let code = self
                    .oracles
                    .attachment
                    .generate_attachment(request)
                    .await
                    .map_err(|e| {
                        PipelineError::Critical(
                            e.context(format!("attachment oracle failed for '{}'", part_plan.name)),
                        )
                    })?;

                // Execute on a draft clone, never the committed anchor
                let mut draft = assembly.clone();
                if let Err(e) = self
                    .sandbox
                    .run_attachment(&code, &mut draft, part_object.clone())
                {
                    let message = e.to_string();
                    self.context.events.warn(
                        PipelinePhase::Assembling,
                        format!("attachment execution failed for '{}': {}", part_plan.name, message),
                    );
                    feedback = Some(message);
                    restage(&mut self.stage, &assembly).await?;
                    continue;
                }

                // Render the draft and let QC judge it
                restage(&mut self.stage, &draft).await?;
                let draft_snapshots = self
                    .stage
                    .capture_snapshots()
                    .await
                    .map_err(PipelineError::Critical)?;

                self.context.set_phase(PipelinePhase::QcAnalysis);
                let verdict = self
                    .oracles
                    .assembly_qc
                    .judge_assembly(&plan.overview, &part_plan.name, &draft_snapshots)
                    .await
                    .map_err(|e| {
                        PipelineError::Critical(
                            e.context(format!("assembly QC oracle failed for '{}'", part_plan.name)),
                        )
                    })?;

                if verdict.passed {
                    commit(&mut assembly, draft);
                    assembly_snapshots = draft_snapshots;
                    attached.push(part_id.clone());
                    committed = true;
                    self.context.events.info(
                        PipelinePhase::QcAnalysis,
                        format!("'{}' committed (score {})", part_plan.name, verdict.score),
                    );
                    break;
                }

                self.context.events.warn(
                    PipelinePhase::QcAnalysis,
                    format!("assembly QC rejected '{}': {}", part_plan.name, verdict.feedback),
                );
                feedback = Some(verdict.feedback);
                restage(&mut self.stage, &assembly).await?;
            }

            if !committed {
                // Soft failure: the part is absent from the final asset
                skipped.push(part_id.clone());
                self.context.events.warn(
                    PipelinePhase::Assembling,
                    format!(
                        "skipping '{}' after {} failed attachment attempts",
                        part_plan.name, max_attempts
                    ),
                );
                restage(&mut self.stage, &assembly).await?;
            }
        }

        Ok(AssembledAsset {
            root: assembly,
            anchor_id: sequenced.anchor_id,
            attached,
            skipped,
        })
    }

    fn verified_object(&self, id: &str) -> Result<&SceneNode, PipelineError> {
        self.context
            .artifacts
            .get(id)
            .and_then(|a| a.object.as_ref())
            .ok_or_else(|| {
                PipelineError::Critical(anyhow::anyhow!(
                    "component '{}' reached assembly without a verified object",
                    id
                ))
            })
    }
}

/// Apply a QC-approved draft to the committed assembly: the anchor adopts
/// the draft's child list and transform.
fn commit(assembly: &mut SceneNode, draft: SceneNode) {
    assembly.children = draft.children;
    assembly.position = draft.position;
    assembly.rotation = draft.rotation;
    assembly.scale = draft.scale;
}
