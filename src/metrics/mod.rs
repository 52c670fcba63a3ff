use serde::Serialize;
use std::fmt;

pub mod recorder;
pub mod summary;

pub use recorder::RunMetrics;
pub use summary::{RunSnapshot, RunSummary};

/// Terminal failure for one store. A store either yields a report or exactly
/// one of these; nothing is silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub store: String,
    pub kind: FailureKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    /// All collection attempts exhausted.
    Collection,
    /// The target had no marketplace routing id; never attempted.
    MissingRouting,
    /// The sink rejected the report with a status code.
    Submission { status: u16 },
    /// The sink call itself errored out.
    SubmissionError,
}

impl Failure {
    pub fn collection(store: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            kind: FailureKind::Collection,
        }
    }

    pub fn missing_routing(store: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            kind: FailureKind::MissingRouting,
        }
    }

    pub fn submission(store: impl Into<String>, status: u16) -> Self {
        Self {
            store: store.into(),
            kind: FailureKind::Submission { status },
        }
    }

    pub fn submission_error(store: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            kind: FailureKind::SubmissionError,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FailureKind::Collection => write!(f, "{} (Fail)", self.store),
            FailureKind::MissingRouting => write!(f, "{} (Missing MKID)", self.store),
            FailureKind::Submission { status } => {
                write!(f, "{} (HTTP Submit Fail {})", self.store, status)
            }
            FailureKind::SubmissionError => write!(f, "{} (Submit Exception)", self.store),
        }
    }
}
