//! Logical view identifiers.

use std::fmt;

use crate::domain::types::ArticleId;

/// One renderable page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    BlogIndex,
    Article(ArticleId),
}

impl View {
    pub fn as_label(&self) -> &'static str {
        match self {
            View::BlogIndex => "blog_index",
            View::Article(_) => "article",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::BlogIndex => f.write_str("blog-index"),
            View::Article(id) => write!(f, "article/{id}"),
        }
    }
}
