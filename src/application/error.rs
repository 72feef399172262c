use std::{borrow::Cow, error::Error as StdError};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::{import::ImportError, render::RenderError, repos::RepoError},
    domain::{error::DomainError, types::ArticleId},
    infra::error::InfraError,
};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: Cow<'static, str>,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: impl Into<Cow<'static, str>>,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message: public_message.into(),
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: impl Into<Cow<'static, str>>,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message: public_message.into(),
            report,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

/// Unique constraint on article titles.
pub const TITLE_CONSTRAINT: &str = "articles_title_key";

/// Failure of a write operation, delivered through the operation's private
/// reply channel.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("article {0} not found")]
    NotFound(ArticleId),
    #[error("article {article_id} already holds the maximum of {limit} comments")]
    Capacity { article_id: ArticleId, limit: usize },
    #[error("store call failed")]
    Persistence(#[source] RepoError),
    #[error("store and content model disagree: {0}")]
    Consistency(String),
    #[error("write queue is full")]
    Overloaded,
    #[error("update coordinator is not running")]
    Unavailable,
}

impl WriteError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            WriteError::Validation(_) => StatusCode::BAD_REQUEST,
            WriteError::NotFound(_) => StatusCode::NOT_FOUND,
            WriteError::Capacity { .. } | WriteError::Persistence(RepoError::Duplicate { .. }) => {
                StatusCode::CONFLICT
            }
            WriteError::Overloaded | WriteError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            WriteError::Persistence(_) | WriteError::Consistency(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn presentation_message(&self) -> Cow<'static, str> {
        match self {
            WriteError::Validation(_) => "Required fields are missing".into(),
            WriteError::NotFound(_) => "Article not found".into(),
            WriteError::Capacity { .. } => "This article is not accepting more comments".into(),
            WriteError::Persistence(RepoError::Duplicate { constraint })
                if constraint == TITLE_CONSTRAINT =>
            {
                "An article with this title already exists".into()
            }
            WriteError::Persistence(RepoError::Duplicate { constraint }) => {
                format!("Conflicts with an existing record ({constraint})").into()
            }
            WriteError::Persistence(err) => format!("Your change could not be saved: {err}").into(),
            WriteError::Consistency(_) => "Unexpected error occurred".into(),
            WriteError::Overloaded => "Too many pending changes, try again shortly".into(),
            WriteError::Unavailable => "Service temporarily unavailable".into(),
        }
    }

    /// Short machine-readable kind, used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            WriteError::Validation(_) => "validation",
            WriteError::NotFound(_) => "not_found",
            WriteError::Capacity { .. } => "capacity",
            WriteError::Persistence(_) => "persistence",
            WriteError::Consistency(_) => "consistency",
            WriteError::Overloaded => "overloaded",
            WriteError::Unavailable => "unavailable",
        }
    }
}

impl From<WriteError> for HttpError {
    fn from(error: WriteError) -> Self {
        HttpError::from_error(
            "application::error::WriteError",
            error.status_code(),
            error.presentation_message(),
            &error,
        )
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("startup render failed: {0}")]
    Render(#[from] RenderError),
    #[error("article import failed: {0}")]
    Import(#[from] ImportError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
