//! In-memory content model: every article keyed by id plus the
//! creation-time ordering used to render the index.

use std::collections::HashMap;

use time::OffsetDateTime;

use crate::domain::{entities::Article, error::DomainError, types::ArticleId};

#[derive(Debug, Clone, Default)]
pub struct ContentModel {
    articles: HashMap<ArticleId, Article>,
    /// Article ids ordered by `created_at` descending.
    order: Vec<ArticleId>,
}

impl ContentModel {
    /// Build a model from loaded articles. The input order is not trusted;
    /// the result is always newest first, with ties broken by the higher id.
    pub fn from_articles(articles: Vec<Article>) -> Result<Self, DomainError> {
        let mut model = Self {
            articles: HashMap::with_capacity(articles.len()),
            order: Vec::with_capacity(articles.len()),
        };

        for article in articles {
            let id = article.id;
            if model.articles.insert(id, article).is_some() {
                return Err(DomainError::invariant(format!(
                    "article id {id} loaded more than once"
                )));
            }
            model.order.push(id);
        }

        let articles = &model.articles;
        model.order.sort_by(|a, b| {
            let (left, right) = (&articles[a], &articles[b]);
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| b.cmp(a))
        });

        Ok(model)
    }

    /// Prepend a freshly created article. Its creation time must not be
    /// older than the current head, so the index order stays newest first.
    pub fn insert_newest(&mut self, article: Article) -> Result<(), DomainError> {
        let id = article.id;
        if self.articles.contains_key(&id) {
            return Err(DomainError::invariant(format!(
                "article id {id} already present in model"
            )));
        }
        if let Some(newest) = self.newest_created_at() {
            if article.created_at < newest {
                return Err(DomainError::invariant(format!(
                    "article {id} created at {} is older than the newest article ({newest})",
                    article.created_at
                )));
            }
        }

        self.order.insert(0, id);
        self.articles.insert(id, article);
        Ok(())
    }

    /// Creation time of the article at position 0.
    pub fn newest_created_at(&self) -> Option<OffsetDateTime> {
        self.order
            .first()
            .and_then(|id| self.articles.get(id))
            .map(|article| article.created_at)
    }

    pub fn get(&self, id: ArticleId) -> Option<&Article> {
        self.articles.get(&id)
    }

    pub fn get_mut(&mut self, id: ArticleId) -> Option<&mut Article> {
        self.articles.get_mut(&id)
    }

    /// Articles ordered newest first.
    pub fn newest_first(&self) -> impl Iterator<Item = &Article> + '_ {
        self.order.iter().map(|id| &self.articles[id])
    }

    pub fn ids_newest_first(&self) -> &[ArticleId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
