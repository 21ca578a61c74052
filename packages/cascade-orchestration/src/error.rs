use thiserror::Error;

pub type Result<T> = std::result::Result<T, CascadeError>;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Structural error: {0}")]
    Structural(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Split reference not found: {0}")]
    ReferenceNotFound(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Fit execution failed: {0}")]
    FitExecutionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CascadeError {
    pub fn config<E: std::fmt::Display>(e: E) -> Self {
        Self::Config(e.to_string())
    }

    pub fn structural<E: std::fmt::Display>(e: E) -> Self {
        Self::Structural(e.to_string())
    }
}
