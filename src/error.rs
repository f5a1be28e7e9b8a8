use std::fmt;

use thiserror::Error;

/// Which store a connection failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Source,
    Analytics,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Source => write!(f, "source store"),
            StoreKind::Analytics => write!(f, "analytics store"),
        }
    }
}

/// Steps whose failure aborts a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    SyncEvents,
    RefreshDimension,
    RecomputeMetrics,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::SyncEvents => write!(f, "ad event sync"),
            Step::RefreshDimension => write!(f, "campaign dimension refresh"),
            Step::RecomputeMetrics => write!(f, "metrics recomputation"),
        }
    }
}

/// Failures that abort a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to connect to {store}")]
    Connect {
        store: StoreKind,
        #[source]
        source: anyhow::Error,
    },

    #[error("{step} failed")]
    Step {
        step: Step,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    pub fn step(step: Step) -> impl FnOnce(anyhow::Error) -> PipelineError {
        move |source| PipelineError::Step { step, source }
    }

    pub fn connect(store: StoreKind) -> impl FnOnce(anyhow::Error) -> PipelineError {
        move |source| PipelineError::Connect { store, source }
    }
}
