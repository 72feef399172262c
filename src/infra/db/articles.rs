use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{ArticleStore, CreateArticleParams, RepoError, UpdateArticleParams},
    domain::{
        entities::{Article, Comment},
        types::ArticleId,
    },
};

use super::{PostgresStore, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ArticleRow {
    id: i64,
    title: String,
    body: String,
    creation_time: OffsetDateTime,
    update_time: OffsetDateTime,
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    article_id: i64,
    commenter_name: String,
    commenter_email: String,
    text: String,
    creation_time: OffsetDateTime,
    commenter_ip: String,
}

impl From<ArticleRow> for Article {
    fn from(row: ArticleRow) -> Self {
        Self {
            id: ArticleId(row.id),
            title: row.title,
            body: row.body,
            created_at: row.creation_time,
            updated_at: row.update_time,
            comments: Vec::new(),
        }
    }
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Self {
            article_id: ArticleId(row.article_id),
            commenter_name: row.commenter_name,
            commenter_email: row.commenter_email,
            text: row.text,
            created_at: row.creation_time,
            commenter_ip: row.commenter_ip,
        }
    }
}

#[async_trait]
impl ArticleStore for PostgresStore {
    async fn create_article(&self, params: CreateArticleParams) -> Result<ArticleId, RepoError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO articles (title, body, creation_time, update_time)
            VALUES ($1, $2, $3, $3)
            RETURNING id
            "#,
        )
        .bind(&params.title)
        .bind(&params.body)
        .bind(params.created_at)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(ArticleId(id))
    }

    async fn update_article(&self, params: UpdateArticleParams) -> Result<u64, RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE articles
            SET title = COALESCE($2, title),
                body = COALESCE($3, body),
                update_time = $4
            WHERE id = $1
            "#,
        )
        .bind(params.id.get())
        .bind(params.title.as_deref())
        .bind(params.body.as_deref())
        .bind(params.updated_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn insert_comment(&self, comment: &Comment) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO comments
                (article_id, commenter_name, commenter_email, text, creation_time, commenter_ip)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(comment.article_id.get())
        .bind(&comment.commenter_name)
        .bind(&comment.commenter_email)
        .bind(&comment.text)
        .bind(comment.created_at)
        .bind(&comment.commenter_ip)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn load_all_articles_with_comments(&self) -> Result<Vec<Article>, RepoError> {
        let article_rows = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT id, title, body, creation_time, update_time
            FROM articles
            ORDER BY creation_time DESC, id DESC
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let comment_rows = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT article_id, commenter_name, commenter_email, text, creation_time, commenter_ip
            FROM comments
            ORDER BY article_id, creation_time DESC
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let mut comments: HashMap<ArticleId, Vec<Comment>> = HashMap::new();
        for row in comment_rows {
            let comment = Comment::from(row);
            comments.entry(comment.article_id).or_default().push(comment);
        }

        Ok(article_rows
            .into_iter()
            .map(|row| {
                let mut article = Article::from(row);
                article.comments = comments.remove(&article.id).unwrap_or_default();
                article
            })
            .collect())
    }

    async fn find_article_id_by_title(
        &self,
        title: &str,
    ) -> Result<Option<ArticleId>, RepoError> {
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM articles WHERE title = $1")
            .bind(title)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(id.map(ArticleId))
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        self.ping().await.map_err(map_sqlx_error)
    }
}
