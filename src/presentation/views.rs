use askama::Template;

#[derive(Clone)]
pub struct BrandView {
    pub title: String,
    pub href: String,
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub brand: BrandView,
    pub page_title: String,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(brand: BrandView, page_title: String, content: T) -> Self {
        Self {
            brand,
            page_title,
            content,
        }
    }
}

#[derive(Clone)]
pub struct ArticleCard {
    pub id: i64,
    pub title: String,
    pub published: String,
    pub updated: String,
    pub was_updated: bool,
    pub comment_count: usize,
}

pub struct BlogIndexContext {
    pub articles: Vec<ArticleCard>,
    pub has_articles: bool,
}

#[derive(Template)]
#[template(path = "blog.html")]
pub struct BlogTemplate {
    pub view: LayoutContext<BlogIndexContext>,
}

#[derive(Clone)]
pub struct CommentView {
    pub name: String,
    pub posted: String,
    pub text: String,
    pub avatar_url: String,
}

pub struct ArticleDetailContext {
    pub id: i64,
    pub title: String,
    pub published: String,
    pub updated: String,
    pub was_updated: bool,
    pub body_html: String,
    pub comments: Vec<CommentView>,
    pub comment_count: usize,
    pub accepts_comments: bool,
}

#[derive(Template)]
#[template(path = "article.html")]
pub struct ArticleTemplate {
    pub view: LayoutContext<ArticleDetailContext>,
}
