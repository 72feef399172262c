//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{Article, Comment};
use crate::domain::types::ArticleId;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateArticleParams {
    pub title: String,
    pub body: String,
    pub created_at: OffsetDateTime,
}

/// Partial article update; `None` fields are left untouched.
#[derive(Debug, Clone)]
pub struct UpdateArticleParams {
    pub id: ArticleId,
    pub updated_at: OffsetDateTime,
    pub title: Option<String>,
    pub body: Option<String>,
}

/// Durable source of truth for articles and comments.
///
/// The update coordinator is the only runtime caller, so implementations
/// never see concurrent writes from the serving process.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Insert a new article and return the id the store assigned to it.
    async fn create_article(&self, params: CreateArticleParams) -> Result<ArticleId, RepoError>;

    /// Apply a partial update and return the number of affected rows.
    async fn update_article(&self, params: UpdateArticleParams) -> Result<u64, RepoError>;

    async fn insert_comment(&self, comment: &Comment) -> Result<(), RepoError>;

    /// Every article, newest first, each with its comments newest first.
    async fn load_all_articles_with_comments(&self) -> Result<Vec<Article>, RepoError>;

    async fn find_article_id_by_title(&self, title: &str)
    -> Result<Option<ArticleId>, RepoError>;

    async fn health_check(&self) -> Result<(), RepoError>;
}
