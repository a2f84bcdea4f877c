//! Typed error hierarchy for the lathe pipeline.
//!
//! Two top-level enums cover the two failure classes:
//! - `PipelineError` — fatal failures that terminate a run
//! - `ExecError` — recoverable sandbox failures, counted against the
//!   current attempt budget and never allowed to escape their loop iteration

use thiserror::Error;

/// Fatal errors. Any of these aborts the run and leaves the pipeline in the
/// `Error` phase; recovery requires a fresh run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Planning failed: {0}")]
    Planning(String),

    #[error("Component '{component}' exhausted {attempts} attempts without passing QC")]
    ComponentRetryExhausted { component: String, attempts: u32 },

    #[error(transparent)]
    Critical(#[from] anyhow::Error),
}

/// Errors from executing a generated program in the sandbox.
///
/// Every variant is recoverable: the caller records it, increments its retry
/// counter, and either retries or gives up according to its own budget. The
/// sandbox itself never retries.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Program is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Op {index} references unknown node '{target}'")]
    UnknownTarget { index: usize, target: String },

    #[error("Op {index} redefines node id '{id}'")]
    DuplicateId { index: usize, id: String },

    #[error("Op {index}: unknown shape '{shape}'")]
    UnknownShape { index: usize, shape: String },

    #[error("Construction program must end with exactly one return op")]
    MissingReturn,

    #[error("Return op must be the final op (found at index {0})")]
    EarlyReturn(usize),

    #[error("Op {index} is not permitted in this program kind: {op}")]
    ForbiddenOp { index: usize, op: String },

    #[error("Op {index}: {message}")]
    Invalid { index: usize, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_error_exhausted_carries_component_and_attempts() {
        let err = PipelineError::ComponentRetryExhausted {
            component: "trunk".into(),
            attempts: 4,
        };
        match &err {
            PipelineError::ComponentRetryExhausted { component, attempts } => {
                assert_eq!(component, "trunk");
                assert_eq!(*attempts, 4);
            }
            _ => panic!("Expected ComponentRetryExhausted"),
        }
        assert!(err.to_string().contains("trunk"));
        assert!(err.to_string().contains('4'));
    }

    #[test]
    fn pipeline_error_converts_from_anyhow() {
        let inner = anyhow::anyhow!("stage went away");
        let err: PipelineError = inner.into();
        assert!(matches!(err, PipelineError::Critical(_)));
        assert!(err.to_string().contains("stage went away"));
    }

    #[test]
    fn exec_error_from_serde_json() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();
        let err: ExecError = parse_err.into();
        assert!(matches!(err, ExecError::Parse(_)));
    }

    #[test]
    fn exec_error_messages_name_the_offending_op() {
        let err = ExecError::UnknownTarget {
            index: 3,
            target: "wheel".into(),
        };
        assert!(err.to_string().contains('3'));
        assert!(err.to_string().contains("wheel"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&PipelineError::Planning("x".into()));
        assert_std_error(&ExecError::MissingReturn);
    }
}
