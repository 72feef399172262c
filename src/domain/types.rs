//! Shared domain identifiers and constants.

use std::{fmt, str::FromStr};

use serde::Serialize;
use time::{format_description::FormatItem, macros::format_description};

/// Maximum number of comments an article may hold. Additions are rejected
/// once an article's list has reached this length.
pub const MAX_COMMENTS_PER_ARTICLE: usize = 512;

pub const HUMAN_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[month repr:short] [day padding:none], [year]");

/// Store-assigned article identifier. Never reassigned once handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct ArticleId(pub i64);

impl ArticleId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ArticleId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(ArticleId)
    }
}
