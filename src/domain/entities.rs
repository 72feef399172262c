//! Domain entities mirrored from persistent storage.

use time::OffsetDateTime;

use crate::domain::{
    error::DomainError,
    types::{ArticleId, MAX_COMMENTS_PER_ARTICLE},
};

#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub id: ArticleId,
    pub title: String,
    /// Trusted HTML supplied by the administrator.
    pub body: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    /// Newest first.
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub article_id: ArticleId,
    pub commenter_name: String,
    pub commenter_email: String,
    pub text: String,
    pub created_at: OffsetDateTime,
    pub commenter_ip: String,
}

impl Article {
    pub fn comment_count(&self) -> usize {
        self.comments.len()
    }

    pub fn accepts_comments(&self) -> bool {
        self.comments.len() < MAX_COMMENTS_PER_ARTICLE
    }

    /// Prepend a comment, keeping the list newest first.
    pub fn push_comment(&mut self, comment: Comment) -> Result<(), DomainError> {
        if !self.accepts_comments() {
            return Err(DomainError::Capacity {
                limit: MAX_COMMENTS_PER_ARTICLE,
            });
        }
        if comment.article_id != self.id {
            return Err(DomainError::invariant(format!(
                "comment for article {} pushed onto article {}",
                comment.article_id, self.id
            )));
        }
        self.comments.insert(0, comment);
        Ok(())
    }

    /// Apply the supplied fields of a partial update.
    pub fn apply_update(
        &mut self,
        title: Option<&str>,
        body: Option<&str>,
        updated_at: OffsetDateTime,
    ) {
        if let Some(title) = title {
            self.title = title.to_string();
        }
        if let Some(body) = body {
            self.body = body.to_string();
        }
        self.updated_at = updated_at;
    }
}
