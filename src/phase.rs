//! Pipeline phase machine.
//!
//! Exactly one phase is active at a time; it is the only externally
//! observable progress signal besides the event stream. `Completed` and
//! `Error` are terminal — a finished pipeline is never re-entered.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The externally observable state of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    /// No run in flight
    #[default]
    Idle,
    /// Waiting on the planning oracle to decompose the prompt
    Planning,
    /// Generating construction logic for a component (first attempt)
    Generating,
    /// Waiting on a QC oracle verdict
    QcAnalysis,
    /// Regenerating after a failed attempt
    Fixing,
    /// Attaching verified parts into the assembly
    Assembling,
    /// Terminal: the assembled asset is ready
    Completed,
    /// Terminal: a fatal error aborted the run
    Error,
}

impl PipelinePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Planning => "planning",
            Self::Generating => "generating",
            Self::QcAnalysis => "qc_analysis",
            Self::Fixing => "fixing",
            Self::Assembling => "assembling",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Check if the phase is terminal (no further transitions allowed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelinePhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "planning" => Ok(Self::Planning),
            "generating" => Ok(Self::Generating),
            "qc_analysis" => Ok(Self::QcAnalysis),
            "fixing" => Ok(Self::Fixing),
            "assembling" => Ok(Self::Assembling),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid phase: {}", s)),
        }
    }
}

/// Validate that a phase transition is legal.
///
/// The generate/QC/fix triangle is free-form (the verification and assembly
/// loops bounce between them), but terminal phases admit no exit and `Error`
/// is reachable from any non-terminal phase.
pub fn is_valid_transition(from: &PipelinePhase, to: &PipelinePhase) -> bool {
    use PipelinePhase::*;

    if from.is_terminal() {
        return false;
    }
    if *to == Error {
        return true;
    }
    matches!(
        (from, to),
        (Idle, Planning)
            | (Planning, Generating)
            | (Generating, QcAnalysis)
            | (Generating, Fixing)
            | (QcAnalysis, Fixing)
            | (QcAnalysis, Generating)
            | (QcAnalysis, Assembling)
            | (Fixing, QcAnalysis)
            | (Assembling, QcAnalysis)
            | (QcAnalysis, Completed)
            | (Assembling, Completed)
    )
}
