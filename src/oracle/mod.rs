//! Oracle contracts — the generative and QC collaborators the pipeline
//! depends on.
//!
//! All backends implement these traits: the production `claude` CLI client
//! and the scriptable mock used by tests.

pub mod claude;
pub mod mock;

use anyhow::Result;
use async_trait::async_trait;

use crate::component::QcVerdict;
use crate::plan::BuildPlan;
use crate::stage::Snapshot;

pub use claude::ClaudeOracle;
pub use mock::MockOracle;

/// Inputs for one construction-logic generation request.
#[derive(Debug)]
pub struct ConstructionRequest<'a> {
    pub component_name: &'a str,
    pub description: &'a str,
    pub geometry_hint: &'a str,
    pub material_hint: &'a str,
    /// The previous attempt's code, carried forward on retries
    pub previous_code: Option<&'a str>,
    /// Most recent execution error or QC feedback
    pub error_context: Option<&'a str>,
    /// Reference images of already-verified components
    pub context_images: &'a [Snapshot],
}

/// Inputs for one attachment-logic generation request.
///
/// Deliberately carries no previous code: each attachment attempt is
/// regenerated fresh and only the textual feedback persists.
#[derive(Debug)]
pub struct AttachmentRequest<'a> {
    pub overview: &'a str,
    pub part_name: &'a str,
    pub part_description: &'a str,
    pub assembly_snapshots: &'a [Snapshot],
    pub part_snapshots: &'a [Snapshot],
    pub error_context: Option<&'a str>,
}

/// Decomposes a prompt into a build plan. Failure is fatal to the run.
#[async_trait]
pub trait PlanningOracle: Send + Sync {
    async fn plan(&self, prompt: &str) -> Result<BuildPlan>;
}

/// Generates construction logic for one component.
#[async_trait]
pub trait ConstructionOracle: Send + Sync {
    async fn generate(&self, request: ConstructionRequest<'_>) -> Result<String>;
}

/// Judges a rendered component from its snapshot set.
#[async_trait]
pub trait ComponentQcOracle: Send + Sync {
    async fn judge(
        &self,
        component_name: &str,
        snapshots: &[Snapshot],
        context_images: &[Snapshot],
    ) -> Result<QcVerdict>;
}

/// Generates attachment logic for merging a part into the assembly.
#[async_trait]
pub trait AttachmentOracle: Send + Sync {
    async fn generate_attachment(&self, request: AttachmentRequest<'_>) -> Result<String>;
}

/// Judges a draft assembly from its snapshot set.
#[async_trait]
pub trait AssemblyQcOracle: Send + Sync {
    async fn judge_assembly(
        &self,
        overview: &str,
        part_name: &str,
        snapshots: &[Snapshot],
    ) -> Result<QcVerdict>;
}

/// The full collaborator set a pipeline run needs.
pub struct Oracles {
    pub planner: Box<dyn PlanningOracle>,
    pub construction: Box<dyn ConstructionOracle>,
    pub component_qc: Box<dyn ComponentQcOracle>,
    pub attachment: Box<dyn AttachmentOracle>,
    pub assembly_qc: Box<dyn AssemblyQcOracle>,
}

impl Oracles {
    /// Wire every role to one shared backend.
    pub fn from_shared<T>(backend: std::sync::Arc<T>) -> Self
    where
        T: PlanningOracle
            + ConstructionOracle
            + ComponentQcOracle
            + AttachmentOracle
            + AssemblyQcOracle
            + 'static,
    {
        Self {
            planner: Box::new(SharedBackend(backend.clone())),
            construction: Box::new(SharedBackend(backend.clone())),
            component_qc: Box::new(SharedBackend(backend.clone())),
            attachment: Box::new(SharedBackend(backend.clone())),
            assembly_qc: Box::new(SharedBackend(backend)),
        }
    }
}

/// Adapter so one backend instance can serve every oracle role.
struct SharedBackend<T>(std::sync::Arc<T>);

#[async_trait]
impl<T: PlanningOracle> PlanningOracle for SharedBackend<T> {
    async fn plan(&self, prompt: &str) -> Result<BuildPlan> {
        self.0.plan(prompt).await
    }
}

#[async_trait]
impl<T: ConstructionOracle> ConstructionOracle for SharedBackend<T> {
    async fn generate(&self, request: ConstructionRequest<'_>) -> Result<String> {
        self.0.generate(request).await
    }
}

#[async_trait]
impl<T: ComponentQcOracle> ComponentQcOracle for SharedBackend<T> {
    async fn judge(
        &self,
        component_name: &str,
        snapshots: &[Snapshot],
        context_images: &[Snapshot],
    ) -> Result<QcVerdict> {
        self.0.judge(component_name, snapshots, context_images).await
    }
}

#[async_trait]
impl<T: AttachmentOracle> AttachmentOracle for SharedBackend<T> {
    async fn generate_attachment(&self, request: AttachmentRequest<'_>) -> Result<String> {
        self.0.generate_attachment(request).await
    }
}

#[async_trait]
impl<T: AssemblyQcOracle> AssemblyQcOracle for SharedBackend<T> {
    async fn judge_assembly(
        &self,
        overview: &str,
        part_name: &str,
        snapshots: &[Snapshot],
    ) -> Result<QcVerdict> {
        self.0.judge_assembly(overview, part_name, snapshots).await
    }
}
