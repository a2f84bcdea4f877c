//! Per-component lifecycle records.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::plan::ComponentPlan;
use crate::scene::SceneNode;
use crate::stage::Snapshot;

/// Lifecycle state of a component artifact. Transitions are driven
/// exclusively by the verification loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    /// Created when the plan is accepted; no generation attempted yet
    #[default]
    Pending,
    /// Construction logic received from the oracle, not yet verified
    Generated,
    /// Passed QC; logically frozen apart from `images` reads by assembly
    Verified,
    /// Last attempt failed (execution or QC); eligible for retry
    Failed,
}

impl ComponentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Generated => "generated",
            Self::Verified => "verified",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for ComponentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "generated" => Ok(Self::Generated),
            "verified" => Ok(Self::Verified),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid component status: {}", s)),
        }
    }
}

/// Verdict from a QC oracle. The core only branches on `passed`; `score`
/// is an informational quality signal and `feedback` is threaded into the
/// next generation request when the verdict is negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QcVerdict {
    pub passed: bool,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub score: u8,
}

/// Mutable per-component record owned by the pipeline context.
#[derive(Debug, Clone)]
pub struct ComponentArtifact {
    pub plan: ComponentPlan,
    /// Latest construction logic text (sanitized form is derived, not stored)
    pub code: Option<String>,
    pub status: ComponentStatus,
    pub retry_count: u32,
    /// Most recent verdict first
    pub qc_history: Vec<QcVerdict>,
    pub error_logs: Vec<String>,
    /// The verified snapshot set; empty until `Verified`
    pub images: Vec<Snapshot>,
    /// The verified constructed object; `None` until `Verified`
    pub object: Option<SceneNode>,
}

impl ComponentArtifact {
    pub fn new(plan: ComponentPlan) -> Self {
        Self {
            plan,
            code: None,
            status: ComponentStatus::Pending,
            retry_count: 0,
            qc_history: Vec::new(),
            error_logs: Vec::new(),
            images: Vec::new(),
            object: None,
        }
    }

    /// The error context to hand the construction oracle for the next
    /// attempt. Execution errors take precedence over QC feedback when both
    /// exist, because a program that did not run has nothing QC-worthy.
    pub fn error_context(&self) -> Option<&str> {
        if let Some(last_error) = self.error_logs.last() {
            return Some(last_error.as_str());
        }
        self.qc_history
            .first()
            .filter(|v| !v.passed && !v.feedback.is_empty())
            .map(|v| v.feedback.as_str())
    }

    /// Record a failed execution attempt.
    pub fn record_execution_failure(&mut self, message: String) {
        self.error_logs.push(message);
        self.status = ComponentStatus::Failed;
        self.retry_count += 1;
    }

    /// Record a QC rejection.
    pub fn record_qc_failure(&mut self, verdict: QcVerdict) {
        // Clear any stale execution error so the QC feedback is what the
        // next generation attempt sees.
        self.error_logs.clear();
        self.qc_history.insert(0, verdict);
        self.status = ComponentStatus::Failed;
        self.retry_count += 1;
    }

    /// Record a passing verdict with the verified object and snapshot set.
    pub fn mark_verified(&mut self, verdict: QcVerdict, object: SceneNode, images: Vec<Snapshot>) {
        self.qc_history.insert(0, verdict);
        self.images = images;
        self.object = Some(object);
        self.status = ComponentStatus::Verified;
    }
}
