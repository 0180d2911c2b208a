//! Pluggable reporting for values that cannot be merged.
//!
//! Problems never abort a merge: the offending value is dropped and the rest
//! of the document is applied.

use std::fmt;

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemKind {
    /// The document names a property the settings type does not have.
    UnknownProperty,
    /// The value has the wrong shape for the target (e.g. text for a number).
    TypeMismatch,
    /// The value has the right shape but is not acceptable (e.g. an unknown enum variant).
    MalformedValue,
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProblemKind::UnknownProperty => "Unknown property",
            ProblemKind::TypeMismatch => "Type mismatch",
            ProblemKind::MalformedValue => "Malformed value",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeProblem {
    pub kind: ProblemKind,
    /// Dotted path of the offending value within the document.
    pub path: String,
    pub value: Value,
    pub detail: String,
}

impl fmt::Display for MergeProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} with value {}: {}",
            self.kind, self.path, self.value, self.detail
        )
    }
}

pub trait ProblemHandler: Send + Sync {
    fn handle(&self, problem: &MergeProblem);
}

/// Default handler: logs each problem at error level and moves on.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingProblemHandler;

impl ProblemHandler for LoggingProblemHandler {
    fn handle(&self, problem: &MergeProblem) {
        log::error!("{}", problem);
    }
}

impl<F> ProblemHandler for F
where
    F: Fn(&MergeProblem) + Send + Sync,
{
    fn handle(&self, problem: &MergeProblem) {
        self(problem)
    }
}
