//! Single-writer update coordinator.
//!
//! Every mutation of the content model goes through one queue and is applied
//! by one task, in arrival order: persist first, then mutate the in-memory
//! model, then re-render the affected views and swap them into the cache.
//! Callers wait on a private oneshot channel for exactly their own result.
//! Readers never talk to the coordinator; they only read the cache.

use std::{sync::Arc, time::Instant};

use metrics::{counter, histogram};
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    application::{
        clock::Clock,
        error::WriteError,
        render::{PENDING_ARTICLE_PAGE, ViewRenderer},
        repos::{ArticleStore, CreateArticleParams, UpdateArticleParams},
    },
    cache::{ContentCache, Snapshot, View},
    domain::{
        content::ContentModel,
        entities::{Article, Comment},
        types::{ArticleId, MAX_COMMENTS_PER_ARTICLE},
    },
};

const TARGET: &str = "lectern::coordinator";

/// Comment submission as received from a reader.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub article_id: ArticleId,
    pub name: String,
    pub email: String,
    pub text: String,
    pub commenter_ip: String,
}

/// The closed set of write operations.
#[derive(Debug, Clone)]
pub enum WriteOp {
    CreateArticle {
        title: String,
        body: String,
    },
    UpdateArticle {
        id: ArticleId,
        title: Option<String>,
        body: Option<String>,
    },
    AddComment(NewComment),
}

impl WriteOp {
    pub fn label(&self) -> &'static str {
        match self {
            WriteOp::CreateArticle { .. } => "create_article",
            WriteOp::UpdateArticle { .. } => "update_article",
            WriteOp::AddComment(_) => "add_comment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created(ArticleId),
    Updated(ArticleId),
    Commented {
        article_id: ArticleId,
        comment_count: usize,
    },
}

impl WriteOutcome {
    pub fn article_id(&self) -> ArticleId {
        match *self {
            WriteOutcome::Created(id) | WriteOutcome::Updated(id) => id,
            WriteOutcome::Commented { article_id, .. } => article_id,
        }
    }
}

/// A view whose re-render failed; the cache kept its previous snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderWarning {
    pub view: View,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct WriteReceipt {
    /// Ordinal of this write; every snapshot it produced carries it.
    pub version: u64,
    pub outcome: WriteOutcome,
    pub warnings: Vec<RenderWarning>,
}

type Reply = oneshot::Sender<Result<WriteReceipt, WriteError>>;

struct Envelope {
    op: WriteOp,
    reply: Reply,
}

/// Cloneable submission side of the coordinator queue.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Envelope>,
}

impl CoordinatorHandle {
    /// Queue `op` and wait for its result. A full queue is reported as
    /// [`WriteError::Overloaded`] right away instead of blocking.
    pub async fn submit(&self, op: WriteOp) -> Result<WriteReceipt, WriteError> {
        let label = op.label();
        let (reply, response) = oneshot::channel();

        match self.tx.try_send(Envelope { op, reply }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                counter!("lectern_write_queue_rejected_total", "op" => label).increment(1);
                warn!(target: TARGET, op = label, "write queue full, rejecting operation");
                return Err(WriteError::Overloaded);
            }
            Err(TrySendError::Closed(_)) => return Err(WriteError::Unavailable),
        }

        response.await.map_err(|_| WriteError::Unavailable)?
    }

    pub async fn create_article(
        &self,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<WriteReceipt, WriteError> {
        self.submit(WriteOp::CreateArticle {
            title: title.into(),
            body: body.into(),
        })
        .await
    }

    pub async fn update_article(
        &self,
        id: ArticleId,
        title: Option<String>,
        body: Option<String>,
    ) -> Result<WriteReceipt, WriteError> {
        self.submit(WriteOp::UpdateArticle { id, title, body }).await
    }

    pub async fn add_comment(&self, comment: NewComment) -> Result<WriteReceipt, WriteError> {
        self.submit(WriteOp::AddComment(comment)).await
    }
}

/// Sole owner of the content model.
pub struct UpdateCoordinator {
    model: ContentModel,
    store: Arc<dyn ArticleStore>,
    renderer: Arc<dyn ViewRenderer>,
    cache: Arc<ContentCache>,
    clock: Arc<dyn Clock>,
    version: u64,
}

impl UpdateCoordinator {
    /// `version` is the ordinal the cache was rendered at; the next write
    /// gets `version + 1`.
    pub fn new(
        model: ContentModel,
        store: Arc<dyn ArticleStore>,
        renderer: Arc<dyn ViewRenderer>,
        cache: Arc<ContentCache>,
        clock: Arc<dyn Clock>,
        version: u64,
    ) -> Self {
        Self {
            model,
            store,
            renderer,
            cache,
            clock,
            version,
        }
    }

    /// Start the coordinator task with a queue holding at most
    /// `queue_capacity` pending operations. The task ends once every handle
    /// has been dropped and the queue has drained.
    pub fn spawn(self, queue_capacity: usize) -> (CoordinatorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let task = tokio::spawn(self.run(rx));
        (CoordinatorHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Envelope>) {
        info!(
            target: TARGET,
            articles = self.model.len(),
            version = self.version,
            "update coordinator started"
        );

        while let Some(Envelope { op, reply }) = rx.recv().await {
            let label = op.label();
            let result = self.apply(op).await;

            let outcome = match &result {
                Ok(_) => "ok",
                Err(err) => err.kind(),
            };
            counter!("lectern_write_ops_total", "op" => label, "outcome" => outcome).increment(1);

            if reply.send(result).is_err() {
                debug!(target: TARGET, op = label, "caller stopped waiting for reply");
            }
        }

        info!(target: TARGET, version = self.version, "update coordinator stopped");
    }

    async fn apply(&mut self, op: WriteOp) -> Result<WriteReceipt, WriteError> {
        match op {
            WriteOp::CreateArticle { title, body } => self.create_article(title, body).await,
            WriteOp::UpdateArticle { id, title, body } => {
                self.update_article(id, title, body).await
            }
            WriteOp::AddComment(comment) => self.add_comment(comment).await,
        }
    }

    async fn create_article(
        &mut self,
        title: String,
        body: String,
    ) -> Result<WriteReceipt, WriteError> {
        let title = title.trim().to_string();
        if title.is_empty() || body.trim().is_empty() {
            debug!(target: TARGET, "create_article rejected: empty title or body");
            return Err(WriteError::validation("title and body are required"));
        }

        // Never older than the current head, whatever the clock says.
        let now = self.clock.now();
        let created_at = self
            .model
            .newest_created_at()
            .map_or(now, |newest| newest.max(now));
        if created_at != now {
            warn!(
                target: TARGET,
                clock = %now,
                newest = %created_at,
                "clock reads earlier than the newest article; using its creation time"
            );
        }

        let id = self
            .store
            .create_article(CreateArticleParams {
                title: title.clone(),
                body: body.clone(),
                created_at,
            })
            .await
            .map_err(|err| self.persistence_failed("create_article", err))?;
        let version = self.commit();

        let article = Article {
            id,
            title,
            body,
            created_at,
            updated_at: created_at,
            comments: Vec::new(),
        };
        if let Err(err) = self.model.insert_newest(article) {
            return Err(self.inconsistent("create_article", id, err.to_string()));
        }

        let warnings = self.refresh(&[View::BlogIndex, View::Article(id)]);
        if !self.cache.contains(View::Article(id)) {
            self.cache
                .insert_article(id, Snapshot::new(version, PENDING_ARTICLE_PAGE));
        }
        info!(target: TARGET, article_id = %id, version, "article created");

        Ok(WriteReceipt {
            version,
            outcome: WriteOutcome::Created(id),
            warnings,
        })
    }

    async fn update_article(
        &mut self,
        id: ArticleId,
        title: Option<String>,
        body: Option<String>,
    ) -> Result<WriteReceipt, WriteError> {
        let title = title
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let body = body.filter(|value| !value.trim().is_empty());
        if title.is_none() && body.is_none() {
            debug!(target: TARGET, article_id = %id, "update_article rejected: nothing to update");
            return Err(WriteError::validation("title or body must be supplied"));
        }

        let now = self.clock.now();
        let affected = self
            .store
            .update_article(UpdateArticleParams {
                id,
                updated_at: now,
                title: title.clone(),
                body: body.clone(),
            })
            .await
            .map_err(|err| self.persistence_failed("update_article", err))?;

        if affected == 0 {
            debug!(target: TARGET, article_id = %id, "update_article matched no rows");
            return Err(WriteError::NotFound(id));
        }
        if affected > 1 {
            error!(
                target: TARGET,
                article_id = %id,
                affected,
                "update_article touched more than one row"
            );
        }
        let version = self.commit();

        let Some(article) = self.model.get_mut(id) else {
            return Err(self.inconsistent(
                "update_article",
                id,
                "article persisted but absent from content model".to_string(),
            ));
        };
        article.apply_update(title.as_deref(), body.as_deref(), now);

        let warnings = self.refresh(&[View::BlogIndex, View::Article(id)]);
        info!(target: TARGET, article_id = %id, version, "article updated");

        Ok(WriteReceipt {
            version,
            outcome: WriteOutcome::Updated(id),
            warnings,
        })
    }

    async fn add_comment(&mut self, comment: NewComment) -> Result<WriteReceipt, WriteError> {
        let NewComment {
            article_id,
            name,
            email,
            text,
            commenter_ip,
        } = comment;

        let name = name.trim().to_string();
        let text = text.trim().to_string();
        if name.is_empty() || text.is_empty() {
            debug!(target: TARGET, %article_id, "add_comment rejected: empty name or text");
            return Err(WriteError::validation("name and comment text are required"));
        }

        let Some(article) = self.model.get(article_id) else {
            debug!(target: TARGET, %article_id, "add_comment for unknown article");
            return Err(WriteError::NotFound(article_id));
        };
        if !article.accepts_comments() {
            debug!(target: TARGET, %article_id, "add_comment rejected: comment cap reached");
            return Err(WriteError::Capacity {
                article_id,
                limit: MAX_COMMENTS_PER_ARTICLE,
            });
        }

        let comment = Comment {
            article_id,
            commenter_name: name,
            commenter_email: email.trim().to_string(),
            text,
            created_at: self.clock.now(),
            commenter_ip,
        };
        self.store
            .insert_comment(&comment)
            .await
            .map_err(|err| self.persistence_failed("add_comment", err))?;
        let version = self.commit();

        let pushed = match self.model.get_mut(article_id) {
            Some(article) => article
                .push_comment(comment)
                .map(|()| article.comment_count())
                .map_err(|err| err.to_string()),
            None => Err("article vanished from content model".to_string()),
        };
        let comment_count = match pushed {
            Ok(count) => count,
            Err(message) => return Err(self.inconsistent("add_comment", article_id, message)),
        };

        // Comment activity never touches the index.
        let warnings = self.refresh(&[View::Article(article_id)]);
        info!(target: TARGET, %article_id, comment_count, version, "comment added");

        Ok(WriteReceipt {
            version,
            outcome: WriteOutcome::Commented {
                article_id,
                comment_count,
            },
            warnings,
        })
    }

    fn commit(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// Re-render `views` and swap them into the cache. A view that fails to
    /// render keeps its previous snapshot and is reported as a warning.
    fn refresh(&self, views: &[View]) -> Vec<RenderWarning> {
        let mut warnings = Vec::new();

        for &view in views {
            let started = Instant::now();
            let rendered = self.renderer.render(&self.model, view);
            histogram!("lectern_render_ms", "view" => view.as_label())
                .record(started.elapsed().as_secs_f64() * 1_000.0);

            match rendered {
                Ok(body) => {
                    let snapshot = Snapshot::new(self.version, body);
                    match view {
                        View::Article(id) if !self.cache.contains(view) => {
                            self.cache.insert_article(id, snapshot);
                        }
                        _ => {
                            self.cache.replace(view, snapshot);
                        }
                    }
                }
                Err(err) => {
                    error!(
                        target: TARGET,
                        view = %view,
                        version = self.version,
                        error = %err,
                        "re-render failed; previous snapshot stays in service"
                    );
                    warnings.push(RenderWarning {
                        view,
                        message: err.to_string(),
                    });
                }
            }
        }

        warnings
    }

    fn persistence_failed(
        &self,
        op: &'static str,
        err: crate::application::repos::RepoError,
    ) -> WriteError {
        warn!(target: TARGET, op, error = %err, "store call failed");
        WriteError::Persistence(err)
    }

    fn inconsistent(&self, op: &'static str, id: ArticleId, message: String) -> WriteError {
        error!(
            target: TARGET,
            op,
            article_id = %id,
            version = self.version,
            detail = %message,
            "store and content model disagree"
        );
        WriteError::Consistency(message)
    }
}
