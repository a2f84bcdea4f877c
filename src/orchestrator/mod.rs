//! Pipeline orchestrator: owns the run state, drives phase transitions, and
//! sequences the verification and assembly loops.
//!
//! One `Pipeline` is one run: `run()` consumes the pipeline, so a second
//! concurrent run over the same state is impossible by construction rather
//! than by convention.

mod assembly;
mod verify;

use std::collections::HashMap;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::component::{ComponentArtifact, ComponentStatus};
use crate::context::ContextAccumulator;
use crate::errors::PipelineError;
use crate::events::{EventLog, PipelineEvent};
use crate::oracle::Oracles;
use crate::phase::{PipelinePhase, is_valid_transition};
use crate::plan::BuildPlan;
use crate::sandbox::Sandbox;
use crate::scene::SceneNode;
use crate::stage::RenderStage;

pub use assembly::AssembledAsset;

/// Tunables for one run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Attempt budget per component and per attachment
    pub max_attempts: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self { max_attempts: 4 }
    }
}

/// All mutable state owned by one run.
pub(crate) struct PipelineContext {
    pub run_id: Uuid,
    pub settings: PipelineSettings,
    pub plan: Option<BuildPlan>,
    pub artifacts: HashMap<String, ComponentArtifact>,
    pub context_images: ContextAccumulator,
    pub events: EventLog,
    pub phase: PipelinePhase,
}

impl PipelineContext {
    fn new(run_id: Uuid, settings: PipelineSettings) -> Self {
        Self {
            run_id,
            settings,
            plan: None,
            artifacts: HashMap::new(),
            context_images: ContextAccumulator::new(),
            events: EventLog::new(),
            phase: PipelinePhase::Idle,
        }
    }

    /// Move to a new phase, logging the transition.
    pub(crate) fn set_phase(&mut self, to: PipelinePhase) {
        if self.phase == to {
            return;
        }
        if !is_valid_transition(&self.phase, &to) {
            tracing::debug!(from = %self.phase, to = %to, "unexpected phase transition");
        }
        self.events.info(to, format!("phase: {} -> {}", self.phase, to));
        self.phase = to;
    }
}

/// The result of a finished run, successful or not. Events and the terminal
/// phase are always available; the assembled asset only on success.
pub struct RunOutcome {
    pub run_id: Uuid,
    pub phase: PipelinePhase,
    pub plan: Option<BuildPlan>,
    pub events: Vec<PipelineEvent>,
    pub result: Result<AssembledAsset, PipelineError>,
}

/// A single-use pipeline run.
pub struct Pipeline {
    pub(crate) context: PipelineContext,
    pub(crate) oracles: Oracles,
    pub(crate) stage: Box<dyn RenderStage>,
    pub(crate) sandbox: Sandbox,
}

impl Pipeline {
    pub fn new(oracles: Oracles, stage: Box<dyn RenderStage>, settings: PipelineSettings) -> Self {
        Self::with_run_id(Uuid::new_v4(), oracles, stage, settings)
    }

    pub fn with_run_id(
        run_id: Uuid,
        oracles: Oracles,
        stage: Box<dyn RenderStage>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            context: PipelineContext::new(run_id, settings),
            oracles,
            stage,
            sandbox: Sandbox::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.context.run_id
    }

    pub fn phase(&self) -> PipelinePhase {
        self.context.phase
    }

    /// Subscribe to the live event stream before starting the run.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.context.events.subscribe()
    }

    /// Execute the full pipeline for a prompt. Consumes the pipeline; the
    /// outcome carries the event history and terminal phase either way.
    pub async fn run(mut self, prompt: &str) -> RunOutcome {
        let result = self.run_inner(prompt).await;

        match &result {
            Ok(asset) => {
                self.context.set_phase(PipelinePhase::Completed);
                self.context.events.info(
                    PipelinePhase::Completed,
                    format!(
                        "assembly complete: {} parts attached, {} skipped",
                        asset.attached.len(),
                        asset.skipped.len()
                    ),
                );
            }
            Err(error) => {
                self.context.set_phase(PipelinePhase::Error);
                self.context
                    .events
                    .error(PipelinePhase::Error, format!("run aborted: {:#}", error));
            }
        }

        RunOutcome {
            run_id: self.context.run_id,
            phase: self.context.phase,
            plan: self.context.plan,
            events: self.context.events.events().to_vec(),
            result,
        }
    }

    async fn run_inner(&mut self, prompt: &str) -> Result<AssembledAsset, PipelineError> {
        self.context.set_phase(PipelinePhase::Planning);
        self.context
            .events
            .info(PipelinePhase::Planning, format!("planning asset for prompt: {}", prompt));

        let plan = self
            .oracles
            .planner
            .plan(prompt)
            .await
            .map_err(|e| PipelineError::Planning(format!("{:#}", e)))?;

        self.context.events.info(
            PipelinePhase::Planning,
            format!("plan accepted: {} components", plan.len()),
        );
        for component in &plan.components {
            self.context
                .artifacts
                .insert(component.id.clone(), ComponentArtifact::new(component.clone()));
        }
        self.context.plan = Some(plan.clone());

        // Verification: every component must pass before assembly starts
        for component in &plan.components {
            self.verify_component(&component.id).await?;
        }

        self.assemble(&plan).await
    }

    /// Verified artifact count, for progress displays.
    pub fn verified_count(&self) -> usize {
        self.context
            .artifacts
            .values()
            .filter(|a| a.status == ComponentStatus::Verified)
            .count()
    }
}

/// Put the committed assembly (and nothing else) on the stage.
pub(crate) async fn restage(
    stage: &mut Box<dyn RenderStage>,
    assembly: &SceneNode,
) -> Result<(), PipelineError> {
    stage.reset().await.map_err(PipelineError::Critical)?;
    stage.add(assembly).await.map_err(PipelineError::Critical)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockOracle;
    use crate::plan::ComponentPlan;
    use crate::stage::HeadlessStage;
    use std::sync::Arc;

    fn single_part_plan() -> BuildPlan {
        BuildPlan {
            overview: "one box".into(),
            components: vec![ComponentPlan {
                id: "base".into(),
                name: "base".into(),
                description: "a box".into(),
                geometry_type: String::new(),
                material_type: String::new(),
                dependencies: vec![],
            }],
        }
    }

    fn pipeline_with(mock: MockOracle) -> Pipeline {
        Pipeline::new(
            Oracles::from_shared(Arc::new(mock)),
            Box::new(HeadlessStage::default()),
            PipelineSettings::default(),
        )
    }

    #[tokio::test]
    async fn fresh_pipeline_is_idle() {
        let pipeline = pipeline_with(MockOracle::new());
        assert_eq!(pipeline.phase(), PipelinePhase::Idle);
        assert_eq!(pipeline.verified_count(), 0);
    }

    #[tokio::test]
    async fn planning_failure_is_fatal() {
        let mock = MockOracle::new().with_plan_error("no oracle today");
        let outcome = pipeline_with(mock).run("a tree").await;

        assert_eq!(outcome.phase, PipelinePhase::Error);
        assert!(matches!(outcome.result, Err(PipelineError::Planning(_))));
        assert!(outcome.plan.is_none());
        // The abort is visible in the event stream
        assert!(
            outcome
                .events
                .iter()
                .any(|e| e.message.contains("run aborted"))
        );
    }

    #[tokio::test]
    async fn single_component_run_completes() {
        let mock = MockOracle::new().with_plan(single_part_plan());
        let outcome = pipeline_with(mock).run("a box").await;

        assert_eq!(outcome.phase, PipelinePhase::Completed);
        let asset = outcome.result.unwrap();
        assert_eq!(asset.attached.len(), 0, "anchor alone, nothing attached");
        assert!(asset.skipped.is_empty());
        assert_eq!(asset.anchor_id, "base");
    }

    #[tokio::test]
    async fn events_are_broadcast_during_run() {
        let mock = MockOracle::new().with_plan(single_part_plan());
        let pipeline = pipeline_with(mock);
        let mut rx = pipeline.subscribe();

        let outcome = pipeline.run("a box").await;
        assert_eq!(outcome.phase, PipelinePhase::Completed);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.phase, PipelinePhase::Planning);
    }
}
