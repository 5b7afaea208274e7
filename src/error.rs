use thiserror::Error;

#[derive(Error, Debug)]
pub enum StatementError {
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Duplicate structure node id: {0}")]
    DuplicateNode(String),

    #[error("Label '{label}' is used by both '{first}' and '{second}'")]
    DuplicateLabel {
        label: String,
        first: String,
        second: String,
    },

    #[error("Node '{node}' references unknown parent '{parent}'")]
    UnknownParent { node: String, parent: String },

    #[error("Node '{node}' cannot be nested under '{parent}': {reason}")]
    InvalidParent {
        node: String,
        parent: String,
        reason: String,
    },

    #[error("Totalizer '{totalizer}' depends on '{dependency}', which is not in the structure")]
    MissingDependency {
        totalizer: String,
        dependency: String,
    },

    #[error("Totalizer '{totalizer}' depends on '{dependency}', which is not declared before it")]
    ForwardDependency {
        totalizer: String,
        dependency: String,
    },

    #[error("Node '{0}' declares dependencies but is not a totalizer")]
    DependenciesOnNonTotalizer(String),

    #[error("Totalizer '{0}' has no dependency list and positional inference is disabled")]
    MissingTotalizerScope(String),

    #[error("Totalizer '{totalizer}' on {period} ({series}): expected {expected}, got {actual}")]
    TotalizerMismatch {
        totalizer: String,
        period: String,
        series: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid report settings: {0}")]
    InvalidSettings(String),

    #[error("Worker pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StatementError>;
