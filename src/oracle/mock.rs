//! Scriptable mock oracle (for tests, no API or CLI needed).
//!
//! Every role has a reply queue; when a queue is empty the mock falls back
//! to a permissive default (valid program, passing verdict), so tests only
//! script the interesting part of a scenario. Requests are recorded for
//! assertions about what the pipeline actually sent.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use super::{
    AssemblyQcOracle, AttachmentOracle, AttachmentRequest, ComponentQcOracle, ConstructionOracle,
    ConstructionRequest, PlanningOracle,
};
use crate::component::QcVerdict;
use crate::plan::BuildPlan;
use crate::stage::Snapshot;

/// A recorded construction request, kept for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedGenerate {
    pub component_name: String,
    pub previous_code: Option<String>,
    pub error_context: Option<String>,
    pub context_images: Vec<Snapshot>,
}

#[derive(Default)]
struct MockState {
    plan_reply: Option<BuildPlan>,
    plan_error: Option<String>,
    construction_replies: HashMap<String, VecDeque<String>>,
    component_verdicts: HashMap<String, VecDeque<QcVerdict>>,
    attachment_replies: HashMap<String, VecDeque<String>>,
    assembly_verdicts: HashMap<String, VecDeque<QcVerdict>>,
    generate_calls: Vec<RecordedGenerate>,
    attachment_calls: Vec<String>,
}

/// One backend serving all five oracle roles.
#[derive(Default)]
pub struct MockOracle {
    state: Mutex<MockState>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plan(self, plan: BuildPlan) -> Self {
        self.state.lock().unwrap().plan_reply = Some(plan);
        self
    }

    /// Make `plan()` fail with the given message.
    pub fn with_plan_error(self, message: &str) -> Self {
        self.state.lock().unwrap().plan_error = Some(message.to_string());
        self
    }

    /// Queue a construction reply for a component (by name).
    pub fn push_construction_reply(&self, component_name: &str, code: &str) {
        self.state
            .lock()
            .unwrap()
            .construction_replies
            .entry(component_name.to_string())
            .or_default()
            .push_back(code.to_string());
    }

    /// Queue a component QC verdict (by component name).
    pub fn push_component_verdict(&self, component_name: &str, verdict: QcVerdict) {
        self.state
            .lock()
            .unwrap()
            .component_verdicts
            .entry(component_name.to_string())
            .or_default()
            .push_back(verdict);
    }

    /// Queue an attachment reply for a part (by name).
    pub fn push_attachment_reply(&self, part_name: &str, code: &str) {
        self.state
            .lock()
            .unwrap()
            .attachment_replies
            .entry(part_name.to_string())
            .or_default()
            .push_back(code.to_string());
    }

    /// Queue an assembly QC verdict (by part name).
    pub fn push_assembly_verdict(&self, part_name: &str, verdict: QcVerdict) {
        self.state
            .lock()
            .unwrap()
            .assembly_verdicts
            .entry(part_name.to_string())
            .or_default()
            .push_back(verdict);
    }

    /// Every construction request seen so far, in call order.
    pub fn generate_calls(&self) -> Vec<RecordedGenerate> {
        self.state.lock().unwrap().generate_calls.clone()
    }

    /// Part names of every attachment request seen so far, in call order.
    pub fn attachment_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().attachment_calls.clone()
    }

    /// A minimal valid construction program producing one box named after
    /// the component.
    pub fn default_program(component_name: &str) -> String {
        let id = component_name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect::<String>();
        format!(
            r#"{{"entry": "build_{id}", "ops": [
                {{"op": "primitive", "id": "{id}", "shape": "box", "dims": [1.0, 1.0, 1.0]}},
                {{"op": "return", "target": "{id}"}}
            ]}}"#
        )
    }

    /// A minimal valid attachment program.
    pub fn default_attachment() -> String {
        r#"{"entry": "attach", "ops": [{"op": "attach", "child": "part", "parent": "root"}]}"#
            .to_string()
    }

    fn pass() -> QcVerdict {
        QcVerdict { passed: true, feedback: String::new(), score: 90 }
    }
}

/// Convenience for building rejection verdicts in tests.
pub fn rejection(feedback: &str) -> QcVerdict {
    QcVerdict { passed: false, feedback: feedback.to_string(), score: 20 }
}

#[async_trait]
impl PlanningOracle for MockOracle {
    async fn plan(&self, _prompt: &str) -> Result<BuildPlan> {
        let state = self.state.lock().unwrap();
        if let Some(message) = &state.plan_error {
            anyhow::bail!("{}", message.clone());
        }
        state
            .plan_reply
            .clone()
            .ok_or_else(|| anyhow::anyhow!("MockOracle has no scripted plan"))
    }
}

#[async_trait]
impl ConstructionOracle for MockOracle {
    async fn generate(&self, request: ConstructionRequest<'_>) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.generate_calls.push(RecordedGenerate {
            component_name: request.component_name.to_string(),
            previous_code: request.previous_code.map(str::to_string),
            error_context: request.error_context.map(str::to_string),
            context_images: request.context_images.to_vec(),
        });
        let reply = state
            .construction_replies
            .get_mut(request.component_name)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Self::default_program(request.component_name));
        Ok(reply)
    }
}

#[async_trait]
impl ComponentQcOracle for MockOracle {
    async fn judge(
        &self,
        component_name: &str,
        _snapshots: &[Snapshot],
        _context_images: &[Snapshot],
    ) -> Result<QcVerdict> {
        let mut state = self.state.lock().unwrap();
        Ok(state
            .component_verdicts
            .get_mut(component_name)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(Self::pass))
    }
}

#[async_trait]
impl AttachmentOracle for MockOracle {
    async fn generate_attachment(&self, request: AttachmentRequest<'_>) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.attachment_calls.push(request.part_name.to_string());
        let reply = state
            .attachment_replies
            .get_mut(request.part_name)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(Self::default_attachment);
        Ok(reply)
    }
}

#[async_trait]
impl AssemblyQcOracle for MockOracle {
    async fn judge_assembly(
        &self,
        _overview: &str,
        part_name: &str,
        _snapshots: &[Snapshot],
    ) -> Result<QcVerdict> {
        let mut state = self.state.lock().unwrap();
        Ok(state
            .assembly_verdicts
            .get_mut(part_name)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(Self::pass))
    }
}
