//! Shared fixtures for integration tests: an in-memory article store, a
//! stepping clock, and a renderer that can be told to fail.

#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use time::{Duration, OffsetDateTime, macros::datetime};
use tokio::{
    sync::{Notify, Semaphore},
    task::JoinHandle,
};

use lectern::{
    application::{
        clock::Clock,
        coordinator::{CoordinatorHandle, UpdateCoordinator},
        error::TITLE_CONSTRAINT,
        render::{RenderError, TemplateRenderer, ViewRenderer, render_all},
        repos::{ArticleStore, CreateArticleParams, RepoError, UpdateArticleParams},
    },
    cache::{ContentCache, View},
    domain::{
        content::ContentModel,
        entities::{Article, Comment},
        types::ArticleId,
    },
};

pub const SITE_TITLE: &str = "Test Blog";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreCalls {
    pub create: usize,
    pub update: usize,
    pub comment: usize,
}

/// Article store backed by a vector, with call counters, failure injection
/// and an optional gate that holds writes until released.
#[derive(Default)]
pub struct MemoryStore {
    articles: Mutex<Vec<Article>>,
    next_id: Mutex<i64>,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    comment_calls: AtomicUsize,
    fail: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
    entered: Notify,
}

impl MemoryStore {
    pub fn with_articles(articles: Vec<Article>) -> Self {
        let next_id = articles.iter().map(|a| a.id.get()).max().unwrap_or(0) + 1;
        Self {
            articles: Mutex::new(articles),
            next_id: Mutex::new(next_id),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> StoreCalls {
        StoreCalls {
            create: self.create_calls.load(Ordering::SeqCst),
            update: self.update_calls.load(Ordering::SeqCst),
            comment: self.comment_calls.load(Ordering::SeqCst),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Hold every following write until permits are added to the returned
    /// semaphore.
    pub fn gate_writes(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Resolves once a write has reached the gate.
    pub async fn write_entered(&self) {
        self.entered.notified().await;
    }

    pub fn stored(&self, id: ArticleId) -> Option<Article> {
        self.articles
            .lock()
            .unwrap()
            .iter()
            .find(|article| article.id == id)
            .cloned()
    }

    async fn pass_gate(&self) {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            self.entered.notify_one();
            let _permit = gate.acquire().await.unwrap();
        }
    }

    fn check_failure(&self) -> Result<(), RepoError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(RepoError::Persistence("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn create_article(&self, params: CreateArticleParams) -> Result<ArticleId, RepoError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;
        self.check_failure()?;

        let mut articles = self.articles.lock().unwrap();
        if articles.iter().any(|a| a.title == params.title) {
            return Err(duplicate_title());
        }
        let mut next_id = self.next_id.lock().unwrap();
        let id = ArticleId(*next_id);
        *next_id += 1;
        articles.push(Article {
            id,
            title: params.title,
            body: params.body,
            created_at: params.created_at,
            updated_at: params.created_at,
            comments: Vec::new(),
        });
        Ok(id)
    }

    async fn update_article(&self, params: UpdateArticleParams) -> Result<u64, RepoError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;
        self.check_failure()?;

        let mut articles = self.articles.lock().unwrap();
        if let Some(title) = params.title.as_ref() {
            if articles.iter().any(|a| a.id != params.id && &a.title == title) {
                return Err(duplicate_title());
            }
        }
        let Some(article) = articles.iter_mut().find(|a| a.id == params.id) else {
            return Ok(0);
        };
        if let Some(title) = params.title {
            article.title = title;
        }
        if let Some(body) = params.body {
            article.body = body;
        }
        article.updated_at = params.updated_at;
        Ok(1)
    }

    async fn insert_comment(&self, comment: &Comment) -> Result<(), RepoError> {
        self.comment_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;
        self.check_failure()?;

        let mut articles = self.articles.lock().unwrap();
        let article = articles
            .iter_mut()
            .find(|a| a.id == comment.article_id)
            .ok_or_else(|| RepoError::InvalidInput {
                message: "comments_article_id_fkey".to_string(),
            })?;
        article.comments.insert(0, comment.clone());
        Ok(())
    }

    async fn load_all_articles_with_comments(&self) -> Result<Vec<Article>, RepoError> {
        self.check_failure()?;
        let mut articles = self.articles.lock().unwrap().clone();
        articles.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(articles)
    }

    async fn find_article_id_by_title(
        &self,
        title: &str,
    ) -> Result<Option<ArticleId>, RepoError> {
        self.check_failure()?;
        Ok(self
            .articles
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.title == title)
            .map(|a| a.id))
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        self.check_failure()
    }
}

fn duplicate_title() -> RepoError {
    RepoError::Duplicate {
        constraint: TITLE_CONSTRAINT.to_string(),
    }
}

/// Clock that advances one minute on every reading.
pub struct SteppingClock {
    next: Mutex<OffsetDateTime>,
}

impl SteppingClock {
    pub fn starting_at(start: OffsetDateTime) -> Self {
        Self {
            next: Mutex::new(start),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> OffsetDateTime {
        let mut next = self.next.lock().unwrap();
        let now = *next;
        *next = now + Duration::minutes(1);
        now
    }
}

/// Template renderer that fails every render while `fail` is set, or only
/// article views while `fail_articles` is set.
pub struct SwitchableRenderer {
    inner: TemplateRenderer,
    fail: AtomicBool,
    fail_articles: AtomicBool,
}

impl SwitchableRenderer {
    pub fn new() -> Self {
        Self {
            inner: TemplateRenderer::new(SITE_TITLE),
            fail: AtomicBool::new(false),
            fail_articles: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_failing_articles(&self, fail: bool) {
        self.fail_articles.store(fail, Ordering::SeqCst);
    }
}

impl ViewRenderer for SwitchableRenderer {
    fn render(&self, model: &ContentModel, view: View) -> Result<Bytes, RenderError> {
        let article_view = matches!(view, View::Article(_));
        if self.fail.load(Ordering::SeqCst)
            || (article_view && self.fail_articles.load(Ordering::SeqCst))
        {
            return Err(RenderError::Other(format!("{view} render disabled")));
        }
        self.inner.render(model, view)
    }
}

pub fn article(id: i64, title: &str, created_at: OffsetDateTime) -> Article {
    Article {
        id: ArticleId(id),
        title: title.to_string(),
        body: format!("<p>{title} body</p>"),
        created_at,
        updated_at: created_at,
        comments: Vec::new(),
    }
}

pub fn comment(article_id: i64, name: &str, created_at: OffsetDateTime) -> Comment {
    Comment {
        article_id: ArticleId(article_id),
        commenter_name: name.to_string(),
        commenter_email: format!("{name}@example.com"),
        text: format!("comment by {name}"),
        created_at,
        commenter_ip: "127.0.0.1".to_string(),
    }
}

/// One article created on Jan 1.
pub fn single_article() -> Vec<Article> {
    vec![article(1, "A", datetime!(2024-01-01 09:00 UTC))]
}

/// A running coordinator wired to in-memory collaborators.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub renderer: Arc<SwitchableRenderer>,
    pub cache: Arc<ContentCache>,
    pub handle: CoordinatorHandle,
    pub task: JoinHandle<()>,
}

impl Harness {
    pub fn start(articles: Vec<Article>) -> Self {
        Self::start_with(articles.clone(), articles, 16)
    }

    /// `stored` seeds the store; `loaded` seeds the content model. They differ
    /// only in tests that need the two to disagree.
    pub fn start_with(stored: Vec<Article>, loaded: Vec<Article>, queue_capacity: usize) -> Self {
        let store = Arc::new(MemoryStore::with_articles(stored));
        let renderer = Arc::new(SwitchableRenderer::new());
        let model = ContentModel::from_articles(loaded).expect("valid model");
        let cache = Arc::new(render_all(renderer.as_ref(), &model, 0).expect("startup render"));
        let clock = Arc::new(SteppingClock::starting_at(datetime!(2024-03-05 12:00 UTC)));

        let coordinator = UpdateCoordinator::new(
            model,
            store.clone(),
            renderer.clone(),
            cache.clone(),
            clock,
            0,
        );
        let (handle, task) = coordinator.spawn(queue_capacity);

        Self {
            store,
            renderer,
            cache,
            handle,
            task,
        }
    }

    pub fn read_text(&self, view: View) -> Option<String> {
        self.cache
            .read(view)
            .map(|snapshot| String::from_utf8(snapshot.body().to_vec()).expect("utf-8 page"))
    }

    pub fn read_version(&self, view: View) -> Option<u64> {
        self.cache.read(view).map(|snapshot| snapshot.version())
    }
}
