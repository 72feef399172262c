//! Offline article import from a file on disk.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::{
    application::{
        clock::Clock,
        repos::{ArticleStore, CreateArticleParams, RepoError, UpdateArticleParams},
    },
    domain::types::ArticleId,
};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot derive an article title from `{0}`")]
    InvalidFileName(PathBuf),
    #[error("`{0}` is empty")]
    EmptyBody(PathBuf),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Created(ArticleId),
    Updated(ArticleId),
    /// An article with the same title exists and overwriting was not requested.
    Skipped(ArticleId),
}

/// Import `path` as an article titled after the file stem. An existing
/// article with that title is updated only when `overwrite` is set.
pub async fn import_article(
    store: &dyn ArticleStore,
    clock: &dyn Clock,
    path: &Path,
    overwrite: bool,
) -> Result<ImportOutcome, ImportError> {
    let title = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::trim)
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| ImportError::InvalidFileName(path.to_path_buf()))?
        .to_string();

    let body = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ImportError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    if body.trim().is_empty() {
        return Err(ImportError::EmptyBody(path.to_path_buf()));
    }

    let now = clock.now();
    match store.find_article_id_by_title(&title).await? {
        Some(id) if overwrite => {
            let affected = store
                .update_article(UpdateArticleParams {
                    id,
                    updated_at: now,
                    title: None,
                    body: Some(body),
                })
                .await?;
            if affected == 0 {
                return Err(ImportError::Repo(RepoError::NotFound));
            }
            info!(target: "lectern::import", %title, article_id = %id, "article updated");
            Ok(ImportOutcome::Updated(id))
        }
        Some(id) => Ok(ImportOutcome::Skipped(id)),
        None => {
            let id = store
                .create_article(CreateArticleParams {
                    title: title.clone(),
                    body,
                    created_at: now,
                })
                .await?;
            info!(target: "lectern::import", %title, article_id = %id, "article imported");
            Ok(ImportOutcome::Created(id))
        }
    }
}
