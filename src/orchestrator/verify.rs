//! Per-component verification loop: generate -> execute -> render -> QC,
//! bounded by the attempt budget.

use super::Pipeline;
use crate::component::ComponentStatus;
use crate::errors::PipelineError;
use crate::oracle::ConstructionRequest;
use crate::phase::PipelinePhase;

impl Pipeline {
    /// Drive one component from `Pending` to `Verified`, or abort the run.
    ///
    /// Exhausting the budget without a passing verdict is fatal — there is
    /// no partial acceptance of an unverified component.
    pub(crate) async fn verify_component(&mut self, id: &str) -> Result<(), PipelineError> {
        // Own the artifact for the duration of the loop; reinserted on
        // every exit path.
        let mut artifact = self
            .context
            .artifacts
            .remove(id)
            .ok_or_else(|| PipelineError::Critical(anyhow::anyhow!("unknown component: {}", id)))?;
        let max_attempts = self.context.settings.max_attempts;
        let name = artifact.plan.name.clone();

        while artifact.retry_count < max_attempts {
            let attempt = artifact.retry_count + 1;

            // 1. Generate (or regenerate) construction logic
            if matches!(artifact.status, ComponentStatus::Pending | ComponentStatus::Failed) {
                let phase = if artifact.retry_count == 0 {
                    PipelinePhase::Generating
                } else {
                    PipelinePhase::Fixing
                };
                self.context.set_phase(phase);
                self.context.events.info(
                    phase,
                    format!("generating '{}' (attempt {}/{})", name, attempt, max_attempts),
                );

                let request = ConstructionRequest {
                    component_name: &artifact.plan.name,
                    description: &artifact.plan.description,
                    geometry_hint: &artifact.plan.geometry_type,
                    material_hint: &artifact.plan.material_type,
                    previous_code: artifact.code.as_deref(),
                    error_context: artifact.error_context(),
                    context_images: self.context.context_images.images(),
                };
                let code = match self.oracles.construction.generate(request).await {
                    Ok(code) => code,
                    Err(e) => {
                        self.context.artifacts.insert(id.to_string(), artifact);
                        return Err(PipelineError::Critical(
                            e.context(format!("construction oracle failed for '{}'", name)),
                        ));
                    }
                };
                artifact.code = Some(code);
                artifact.status = ComponentStatus::Generated;
            }

            // 2. Execute in the sandbox on a freshly reset stage
            let code = artifact.code.clone().unwrap_or_default();
            let object = match self.sandbox.run_construction(&code) {
                Ok(object) => object,
                Err(e) => {
                    let message = e.to_string();
                    self.context.events.warn(
                        self.context.phase,
                        format!("execution failed for '{}': {}", name, message),
                    );
                    artifact.record_execution_failure(message);
                    continue;
                }
            };

            if let Err(e) = self.stage.reset().await {
                self.context.artifacts.insert(id.to_string(), artifact);
                return Err(PipelineError::Critical(e));
            }
            if let Err(e) = self.stage.add(&object).await {
                self.context.artifacts.insert(id.to_string(), artifact);
                return Err(PipelineError::Critical(e));
            }

            // 3. Capture the standardized view set
            let snapshots = match self.stage.capture_snapshots().await {
                Ok(snapshots) => snapshots,
                Err(e) => {
                    self.context.artifacts.insert(id.to_string(), artifact);
                    return Err(PipelineError::Critical(e));
                }
            };

            // 4. Submit to QC
            self.context.set_phase(PipelinePhase::QcAnalysis);
            let verdict = match self
                .oracles
                .component_qc
                .judge(&artifact.plan.name, &snapshots, self.context.context_images.images())
                .await
            {
                Ok(verdict) => verdict,
                Err(e) => {
                    self.context.artifacts.insert(id.to_string(), artifact);
                    return Err(PipelineError::Critical(
                        e.context(format!("component QC oracle failed for '{}'", name)),
                    ));
                }
            };

            if verdict.passed {
                self.context.events.info(
                    PipelinePhase::QcAnalysis,
                    format!("'{}' verified (score {})", name, verdict.score),
                );
                if let Some(first) = snapshots.first() {
                    self.context.context_images.push(first.clone());
                }
                artifact.mark_verified(verdict, object, snapshots);
                self.context.artifacts.insert(id.to_string(), artifact);
                return Ok(());
            }

            self.context.events.warn(
                PipelinePhase::QcAnalysis,
                format!("'{}' rejected by QC: {}", name, verdict.feedback),
            );
            artifact.record_qc_failure(verdict);
        }

        let attempts = artifact.retry_count;
        self.context.artifacts.insert(id.to_string(), artifact);
        Err(PipelineError::ComponentRetryExhausted {
            component: name,
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::mock::rejection;
    use crate::oracle::{MockOracle, Oracles};
    use crate::orchestrator::PipelineSettings;
    use crate::plan::{BuildPlan, ComponentPlan};
    use crate::stage::HeadlessStage;
    use std::sync::Arc;

    fn component(id: &str) -> ComponentPlan {
        ComponentPlan {
            id: id.to_string(),
            name: id.to_string(),
            description: "test part".into(),
            geometry_type: String::new(),
            material_type: String::new(),
            dependencies: vec![],
        }
    }

    fn plan_of(ids: &[&str]) -> BuildPlan {
        BuildPlan {
            overview: "test asset".into(),
            components: ids.iter().map(|id| component(id)).collect(),
        }
    }

    async fn run_verification(
        mock: Arc<MockOracle>,
        ids: &[&str],
    ) -> (Pipeline, Result<(), PipelineError>) {
        let plan = plan_of(ids);
        let mut pipeline = Pipeline::new(
            Oracles::from_shared(mock),
            Box::new(HeadlessStage::default()),
            PipelineSettings::default(),
        );
        for c in &plan.components {
            pipeline
                .context
                .artifacts
                .insert(c.id.clone(), crate::component::ComponentArtifact::new(c.clone()));
        }
        pipeline.context.plan = Some(plan.clone());
        let mut result = Ok(());
        for c in &plan.components {
            result = pipeline.verify_component(&c.id).await;
            if result.is_err() {
                break;
            }
        }
        (pipeline, result)
    }

    #[tokio::test]
    async fn passing_component_is_verified_first_attempt() {
        let (pipeline, result) = run_verification(Arc::new(MockOracle::new()), &["a"]).await;
        result.unwrap();
        let artifact = &pipeline.context.artifacts["a"];
        assert_eq!(artifact.status, ComponentStatus::Verified);
        assert_eq!(artifact.retry_count, 0);
        assert_eq!(artifact.images.len(), crate::stage::VIEW_COUNT);
        assert_eq!(pipeline.context.context_images.len(), 1);
    }

    #[tokio::test]
    async fn qc_rejection_retries_with_feedback() {
        let mock = Arc::new(MockOracle::new());
        mock.push_component_verdict("a", rejection("make it rounder"));
        let (pipeline, result) = run_verification(mock.clone(), &["a"]).await;
        result.unwrap();

        let artifact = &pipeline.context.artifacts["a"];
        assert_eq!(artifact.status, ComponentStatus::Verified);
        assert_eq!(artifact.retry_count, 1);
        assert_eq!(artifact.qc_history.len(), 2);

        // The retry request carried the previous code and the QC feedback
        let calls = mock.generate_calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].previous_code.is_none());
        assert!(calls[0].error_context.is_none());
        assert!(calls[1].previous_code.is_some());
        assert_eq!(calls[1].error_context.as_deref(), Some("make it rounder"));
    }

    #[tokio::test]
    async fn four_rejections_abort_the_run() {
        let mock = Arc::new(MockOracle::new());
        for _ in 0..4 {
            mock.push_component_verdict("a", rejection("no"));
        }
        let (pipeline, result) = run_verification(mock, &["a"]).await;

        match result {
            Err(PipelineError::ComponentRetryExhausted { component, attempts }) => {
                assert_eq!(component, "a");
                assert_eq!(attempts, 4);
            }
            other => panic!("expected retry exhaustion, got {:?}", other.map(|_| ())),
        }
        let artifact = &pipeline.context.artifacts["a"];
        assert_eq!(artifact.status, ComponentStatus::Failed);
        assert_eq!(artifact.retry_count, 4);
    }

    #[tokio::test]
    async fn execution_errors_count_against_the_budget() {
        let mock = Arc::new(MockOracle::new());
        mock.push_construction_reply("a", "this is not a program");
        let (pipeline, result) = run_verification(mock.clone(), &["a"]).await;
        result.unwrap();

        let artifact = &pipeline.context.artifacts["a"];
        assert_eq!(artifact.status, ComponentStatus::Verified);
        assert_eq!(artifact.retry_count, 1);
        assert_eq!(artifact.error_logs.len(), 1);

        // Execution error text reached the retry request
        let calls = mock.generate_calls();
        assert!(calls[1].error_context.as_deref().unwrap().contains("JSON"));
    }

    #[tokio::test]
    async fn four_execution_errors_abort_the_run() {
        let mock = Arc::new(MockOracle::new());
        for _ in 0..4 {
            mock.push_construction_reply("a", "garbage");
        }
        let (_, result) = run_verification(mock, &["a"]).await;
        assert!(matches!(
            result,
            Err(PipelineError::ComponentRetryExhausted { attempts: 4, .. })
        ));
    }

    #[tokio::test]
    async fn context_accumulates_across_components_in_order() {
        let mock = Arc::new(MockOracle::new());
        let (pipeline, result) = run_verification(mock.clone(), &["a", "b", "c"]).await;
        result.unwrap();
        assert_eq!(pipeline.context.context_images.len(), 3);

        // Attempt N sees exactly the first-snapshots of the components
        // verified strictly before it, in verification order
        let calls = mock.generate_calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].context_images.len(), 0);
        assert_eq!(calls[1].context_images.len(), 1);
        assert_eq!(calls[2].context_images.len(), 2);
        let expected_first = pipeline.context.artifacts["a"].images[0].clone();
        assert_eq!(calls[1].context_images[0], expected_first);
        assert_eq!(calls[2].context_images[0], expected_first);
        assert_eq!(
            calls[2].context_images[1],
            pipeline.context.artifacts["b"].images[0]
        );
    }
}
