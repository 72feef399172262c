use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("capacity of {limit} reached")]
    Capacity { limit: usize },
    #[error("domain invariant violated: {message}")]
    Invariant { message: String },
}

impl DomainError {
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }
}
