//! View rendering: a pure function from the content model and a view
//! selector to HTML bytes.

use askama::Template;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;

use crate::{
    cache::{ContentCache, Snapshot, View},
    domain::{
        content::ContentModel,
        entities::{Article, Comment},
        types::{ArticleId, HUMAN_DATE_FORMAT},
    },
    presentation::views::{
        ArticleCard, ArticleDetailContext, ArticleTemplate, BlogIndexContext, BlogTemplate,
        BrandView, CommentView, LayoutContext,
    },
};

const INDEX_HREF: &str = "/blog";
const AVATAR_BASE_URL: &str = "https://www.gravatar.com/avatar/";

/// Stands in for an article whose first render failed, so the index never
/// links to a missing page. The next successful render replaces it.
pub const PENDING_ARTICLE_PAGE: &str = "<!doctype html>
<html lang=\"en\">
<head>
  <meta charset=\"utf-8\">
  <title>Article unavailable</title>
</head>
<body>
  <p>This article is not available yet. Please check back shortly.</p>
</body>
</html>
";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template rendering failed: {0}")]
    Template(#[from] askama::Error),
    #[error("date formatting failed: {0}")]
    Format(#[from] time::error::Format),
    #[error("article {0} is not in the content model")]
    MissingArticle(ArticleId),
    #[error("renderer failure: {0}")]
    Other(String),
}

/// Deterministic renderer: identical model and view always produce
/// identical bytes.
pub trait ViewRenderer: Send + Sync {
    fn render(&self, model: &ContentModel, view: View) -> Result<Bytes, RenderError>;
}

/// Askama-backed renderer used in production.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    site_title: String,
}

impl TemplateRenderer {
    pub fn new(site_title: impl Into<String>) -> Self {
        Self {
            site_title: site_title.into(),
        }
    }

    fn brand(&self) -> BrandView {
        BrandView {
            title: self.site_title.clone(),
            href: INDEX_HREF.to_string(),
        }
    }

    fn render_index(&self, model: &ContentModel) -> Result<String, RenderError> {
        let articles = model
            .newest_first()
            .map(article_card)
            .collect::<Result<Vec<_>, _>>()?;
        let content = BlogIndexContext {
            has_articles: !articles.is_empty(),
            articles,
        };
        let view = LayoutContext::new(self.brand(), self.site_title.clone(), content);
        Ok(BlogTemplate { view }.render()?)
    }

    fn render_article(&self, model: &ContentModel, id: ArticleId) -> Result<String, RenderError> {
        let article = model.get(id).ok_or(RenderError::MissingArticle(id))?;
        let content = article_detail(article)?;
        let page_title = format!("{} | {}", article.title, self.site_title);
        let view = LayoutContext::new(self.brand(), page_title, content);
        Ok(ArticleTemplate { view }.render()?)
    }
}

impl ViewRenderer for TemplateRenderer {
    fn render(&self, model: &ContentModel, view: View) -> Result<Bytes, RenderError> {
        let html = match view {
            View::BlogIndex => self.render_index(model)?,
            View::Article(id) => self.render_article(model, id)?,
        };
        Ok(Bytes::from(html))
    }
}

/// Render every view once and assemble the initial cache. Any failure here
/// is fatal to startup.
pub fn render_all(
    renderer: &dyn ViewRenderer,
    model: &ContentModel,
    version: u64,
) -> Result<ContentCache, RenderError> {
    let index = Snapshot::new(version, renderer.render(model, View::BlogIndex)?);
    let articles = model
        .ids_newest_first()
        .iter()
        .map(|&id| {
            renderer
                .render(model, View::Article(id))
                .map(|body| (id, Snapshot::new(version, body)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ContentCache::from_snapshots(index, articles))
}

fn human_date(value: OffsetDateTime) -> Result<String, RenderError> {
    Ok(value.format(HUMAN_DATE_FORMAT)?)
}

fn was_updated(article: &Article) -> bool {
    article.updated_at.date() != article.created_at.date()
}

fn article_card(article: &Article) -> Result<ArticleCard, RenderError> {
    Ok(ArticleCard {
        id: article.id.get(),
        title: article.title.clone(),
        published: human_date(article.created_at)?,
        updated: human_date(article.updated_at)?,
        was_updated: was_updated(article),
        comment_count: article.comment_count(),
    })
}

fn article_detail(article: &Article) -> Result<ArticleDetailContext, RenderError> {
    let comments = article
        .comments
        .iter()
        .map(comment_view)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ArticleDetailContext {
        id: article.id.get(),
        title: article.title.clone(),
        published: human_date(article.created_at)?,
        updated: human_date(article.updated_at)?,
        was_updated: was_updated(article),
        body_html: article.body.clone(),
        comment_count: comments.len(),
        comments,
        accepts_comments: article.accepts_comments(),
    })
}

fn comment_view(comment: &Comment) -> Result<CommentView, RenderError> {
    Ok(CommentView {
        name: comment.commenter_name.clone(),
        posted: human_date(comment.created_at)?,
        text: comment.text.clone(),
        avatar_url: avatar_url(&comment.commenter_email),
    })
}

/// Gravatar-style avatar URL keyed by the SHA-256 of the normalized email.
pub fn avatar_url(email: &str) -> String {
    let normalized = email.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    format!("{AVATAR_BASE_URL}{}?d=identicon&s=48", hex::encode(digest.as_slice()))
}
