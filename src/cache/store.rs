//! Snapshot holders for the blog index and every article page.

use std::sync::{Arc, RwLock};

use bytes::Bytes;
use dashmap::DashMap;
use metrics::counter;
use tracing::warn;

use crate::domain::types::ArticleId;

use super::keys::View;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

/// Immutable rendered output for one view, tagged with the ordinal of the
/// write that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    version: u64,
    body: Bytes,
}

impl Snapshot {
    pub fn new(version: u64, body: impl Into<Bytes>) -> Self {
        Self {
            version,
            body: body.into(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }
}

type Holder = Arc<RwLock<Snapshot>>;

/// One guarded snapshot per view.
///
/// Reads never block each other. Only the update coordinator mutates the
/// cache (`replace`, `insert_article` are crate-private), and it renders
/// before it takes any write guard.
pub struct ContentCache {
    index: RwLock<Snapshot>,
    articles: DashMap<ArticleId, Holder>,
}

impl ContentCache {
    /// Build the cache from a complete startup render pass.
    pub fn from_snapshots(
        index: Snapshot,
        articles: impl IntoIterator<Item = (ArticleId, Snapshot)>,
    ) -> Self {
        let map = DashMap::new();
        for (id, snapshot) in articles {
            map.insert(id, Arc::new(RwLock::new(snapshot)));
        }
        Self {
            index: RwLock::new(index),
            articles: map,
        }
    }

    /// Most recently committed snapshot for `view`, or `None` for an article
    /// that has no entry.
    pub fn read(&self, view: View) -> Option<Snapshot> {
        let snapshot = match view {
            View::BlogIndex => rw_read(&self.index, SOURCE, "read.index").clone(),
            View::Article(id) => {
                let holder = self.holder(id)?;
                let guard = rw_read(&holder, SOURCE, "read.article");
                guard.clone()
            }
        };
        counter!("lectern_snapshot_reads_total", "view" => view.as_label()).increment(1);
        Some(snapshot)
    }

    pub fn contains(&self, view: View) -> bool {
        match view {
            View::BlogIndex => true,
            View::Article(id) => self.articles.contains_key(&id),
        }
    }

    pub fn article_count(&self) -> usize {
        self.articles.len()
    }

    /// Swap the stored snapshot for `view`. A snapshot older than the one
    /// already stored is discarded so versions never go backwards. Returns
    /// whether the swap happened.
    pub(crate) fn replace(&self, view: View, snapshot: Snapshot) -> bool {
        match view {
            View::BlogIndex => swap_newer(&self.index, snapshot, "replace.index"),
            View::Article(id) => match self.holder(id) {
                Some(holder) => swap_newer(&holder, snapshot, "replace.article"),
                None => {
                    warn!(
                        target: "lectern::cache",
                        article_id = %id,
                        "replace requested for article without a cache entry"
                    );
                    false
                }
            },
        }
    }

    /// Create the entry for a newly created article. An existing entry is
    /// replaced under the same version rule as [`ContentCache::replace`].
    pub(crate) fn insert_article(&self, id: ArticleId, snapshot: Snapshot) {
        use dashmap::mapref::entry::Entry;

        match self.articles.entry(id) {
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(RwLock::new(snapshot)));
            }
            Entry::Occupied(occupied) => {
                let holder = Arc::clone(occupied.get());
                drop(occupied);
                swap_newer(&holder, snapshot, "insert_article.existing");
            }
        }
    }

    fn holder(&self, id: ArticleId) -> Option<Holder> {
        self.articles.get(&id).map(|entry| Arc::clone(entry.value()))
    }
}

fn swap_newer(lock: &RwLock<Snapshot>, snapshot: Snapshot, op: &'static str) -> bool {
    let mut guard = rw_write(lock, SOURCE, op);
    if snapshot.version < guard.version {
        return false;
    }
    *guard = snapshot;
    true
}
