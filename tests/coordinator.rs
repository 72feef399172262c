//! Behaviour of the update coordinator against in-memory collaborators.

mod common;

use std::{sync::Arc, thread};

use time::macros::datetime;

use lectern::{
    application::{
        coordinator::{NewComment, WriteOutcome},
        error::WriteError,
        render::{PENDING_ARTICLE_PAGE, TemplateRenderer, ViewRenderer},
    },
    cache::View,
    domain::{content::ContentModel, types::ArticleId},
};

use common::{Harness, StoreCalls, article, comment, single_article};

fn new_comment(article_id: i64, name: &str, text: &str) -> NewComment {
    NewComment {
        article_id: ArticleId(article_id),
        name: name.to_string(),
        email: "reader@example.com".to_string(),
        text: text.to_string(),
        commenter_ip: "10.0.0.1".to_string(),
    }
}

#[tokio::test]
async fn create_article_goes_first_and_index_lists_it_before_older_ones() {
    let harness = Harness::start(single_article());

    let receipt = harness
        .handle
        .create_article("B", "x")
        .await
        .expect("create succeeds");

    assert_eq!(receipt.outcome, WriteOutcome::Created(ArticleId(2)));
    assert_eq!(receipt.version, 1);
    assert!(receipt.warnings.is_empty());

    let stored = harness.store.stored(ArticleId(2)).expect("persisted");
    assert_eq!(stored.title, "B");
    assert!(stored.created_at > datetime!(2024-01-01 09:00 UTC));

    let index = harness.read_text(View::BlogIndex).expect("index");
    let b = index.find(">B</a>").expect("B listed");
    let a = index.find(">A</a>").expect("A listed");
    assert!(b < a, "newest article must be listed first");

    let page = harness
        .read_text(View::Article(ArticleId(2)))
        .expect("new article is servable");
    assert!(page.contains(r#"<h1 class="article-title">B</h1>"#));
    assert_eq!(harness.read_version(View::Article(ArticleId(2))), Some(1));
}

#[tokio::test]
async fn created_article_view_matches_fresh_render_of_store_contents() {
    let harness = Harness::start(single_article());
    harness
        .handle
        .create_article("B", "<p>hello</p>")
        .await
        .expect("create succeeds");

    // Rebuilding from the store must give the same pages as the live cache.
    let reloaded = {
        use lectern::application::repos::ArticleStore;
        harness
            .store
            .load_all_articles_with_comments()
            .await
            .expect("load")
    };
    let model = ContentModel::from_articles(reloaded).expect("model");
    assert_eq!(model.ids_newest_first(), &[ArticleId(2), ArticleId(1)]);

    let renderer = TemplateRenderer::new(common::SITE_TITLE);
    let fresh = renderer.render(&model, View::BlogIndex).expect("render");
    let cached = harness.cache.read(View::BlogIndex).expect("index");
    assert_eq!(cached.body(), &fresh);
}

#[tokio::test]
async fn create_article_rejects_blank_fields_without_store_calls() {
    let harness = Harness::start(single_article());

    for (title, body) in [("", "x"), ("T", ""), ("   ", "x"), ("T", " \n ")] {
        let err = harness
            .handle
            .create_article(title, body)
            .await
            .expect_err("blank field");
        assert!(matches!(err, WriteError::Validation(_)), "{err:?}");
    }

    assert_eq!(harness.store.calls(), StoreCalls::default());
}

#[tokio::test]
async fn update_with_both_fields_empty_makes_no_store_calls() {
    let harness = Harness::start(single_article());

    let err = harness
        .handle
        .update_article(ArticleId(1), Some(String::new()), Some(String::new()))
        .await
        .expect_err("nothing to update");
    assert!(matches!(err, WriteError::Validation(_)));

    let err = harness
        .handle
        .update_article(ArticleId(1), None, None)
        .await
        .expect_err("nothing to update");
    assert!(matches!(err, WriteError::Validation(_)));

    assert_eq!(harness.store.calls(), StoreCalls::default());
}

#[tokio::test]
async fn update_changes_only_supplied_fields_and_refreshes_views() {
    let harness = Harness::start(single_article());
    let index_before = harness.read_text(View::BlogIndex).expect("index");

    let receipt = harness
        .handle
        .update_article(ArticleId(1), Some("A, revised".to_string()), None)
        .await
        .expect("update succeeds");
    assert_eq!(receipt.outcome, WriteOutcome::Updated(ArticleId(1)));

    let stored = harness.store.stored(ArticleId(1)).expect("stored");
    assert_eq!(stored.title, "A, revised");
    assert_eq!(stored.body, "<p>A body</p>");

    let page = harness.read_text(View::Article(ArticleId(1))).expect("page");
    assert!(page.contains("A, revised"));
    assert!(page.contains("<p>A body</p>"));
    assert!(page.contains("updated Mar 5, 2024"));

    let index_after = harness.read_text(View::BlogIndex).expect("index");
    assert_ne!(index_before, index_after);
    assert!(index_after.contains("A, revised"));
}

#[tokio::test]
async fn update_of_unknown_article_is_not_found() {
    let harness = Harness::start(single_article());

    let err = harness
        .handle
        .update_article(ArticleId(99), None, Some("<p>new</p>".to_string()))
        .await
        .expect_err("unknown id");
    assert!(matches!(err, WriteError::NotFound(ArticleId(99))));
    assert_eq!(harness.store.calls().update, 1);
}

#[tokio::test]
async fn store_and_model_disagreement_is_a_consistency_error_and_coordinator_survives() {
    let stored = vec![
        article(1, "A", datetime!(2024-01-01 09:00 UTC)),
        article(7, "Ghost", datetime!(2024-01-02 09:00 UTC)),
    ];
    let harness = Harness::start_with(stored, single_article(), 16);

    let err = harness
        .handle
        .update_article(ArticleId(7), Some("Boo".to_string()), None)
        .await
        .expect_err("model lacks article 7");
    assert!(matches!(err, WriteError::Consistency(_)), "{err:?}");

    // The failed write still consumed an ordinal because the store accepted it.
    let receipt = harness
        .handle
        .create_article("B", "x")
        .await
        .expect("coordinator keeps working");
    assert_eq!(receipt.version, 2);
    assert!(harness.read_text(View::BlogIndex).is_some());
}

#[tokio::test]
async fn comment_is_prepended_and_index_bytes_stay_untouched() {
    let harness = Harness::start(single_article());
    let index_before = harness.cache.read(View::BlogIndex).expect("index");

    let receipt = harness
        .handle
        .add_comment(new_comment(1, "n", "t"))
        .await
        .expect("comment accepted");
    assert_eq!(
        receipt.outcome,
        WriteOutcome::Commented {
            article_id: ArticleId(1),
            comment_count: 1,
        }
    );

    let page = harness.read_text(View::Article(ArticleId(1))).expect("page");
    assert!(page.contains("1 comments"));
    assert!(page.contains(r#"<strong class="comment-name">n</strong>"#));
    assert!(page.contains(r#"<p class="comment-text">t</p>"#));
    assert!(!page.contains("reader@example.com"));

    let index_after = harness.cache.read(View::BlogIndex).expect("index");
    assert_eq!(index_before.body(), index_after.body());
    assert_eq!(index_after.version(), 0);
}

#[tokio::test]
async fn newer_comments_render_above_older_ones() {
    let harness = Harness::start(single_article());
    harness
        .handle
        .add_comment(new_comment(1, "first", "one"))
        .await
        .expect("first");
    harness
        .handle
        .add_comment(new_comment(1, "second", "two"))
        .await
        .expect("second");

    let page = harness.read_text(View::Article(ArticleId(1))).expect("page");
    let second = page.find(">second<").expect("second listed");
    let first = page.find(">first<").expect("first listed");
    assert!(second < first);

    let stored = harness.store.stored(ArticleId(1)).expect("stored");
    assert_eq!(stored.comments[0].commenter_name, "second");
}

#[tokio::test]
async fn comment_fields_are_trimmed_and_blank_ones_rejected() {
    let harness = Harness::start(single_article());

    for (name, text) in [("", "t"), ("n", ""), ("  ", "t"), ("n", "\t")] {
        let err = harness
            .handle
            .add_comment(new_comment(1, name, text))
            .await
            .expect_err("blank field");
        assert!(matches!(err, WriteError::Validation(_)));
    }
    assert_eq!(harness.store.calls().comment, 0);

    harness
        .handle
        .add_comment(new_comment(1, "  padded  ", "  text  "))
        .await
        .expect("accepted");
    let stored = harness.store.stored(ArticleId(1)).expect("stored");
    assert_eq!(stored.comments[0].commenter_name, "padded");
    assert_eq!(stored.comments[0].text, "text");
    assert_eq!(stored.comments[0].commenter_ip, "10.0.0.1");
}

#[tokio::test]
async fn comment_on_unknown_article_is_not_found_without_store_calls() {
    let harness = Harness::start(single_article());

    let err = harness
        .handle
        .add_comment(new_comment(42, "n", "t"))
        .await
        .expect_err("unknown article");
    assert!(matches!(err, WriteError::NotFound(ArticleId(42))));
    assert_eq!(harness.store.calls().comment, 0);
}

#[tokio::test]
async fn comment_cap_rejects_at_512_without_persisting() {
    let mut full = article(1, "A", datetime!(2024-01-01 09:00 UTC));
    full.comments = (0..512)
        .map(|n| comment(1, &format!("c{n}"), datetime!(2024-01-02 00:00 UTC)))
        .collect();
    let harness = Harness::start(vec![full]);

    let page = harness.read_text(View::Article(ArticleId(1))).expect("page");
    assert!(page.contains("Comments are closed"));

    let err = harness
        .handle
        .add_comment(new_comment(1, "n", "t"))
        .await
        .expect_err("cap reached");
    assert!(matches!(
        err,
        WriteError::Capacity {
            article_id: ArticleId(1),
            limit: 512
        }
    ));
    assert_eq!(harness.store.calls().comment, 0);
}

#[tokio::test]
async fn comment_511_is_the_last_one_accepted() {
    let mut almost = article(1, "A", datetime!(2024-01-01 09:00 UTC));
    almost.comments = (0..511)
        .map(|n| comment(1, &format!("c{n}"), datetime!(2024-01-02 00:00 UTC)))
        .collect();
    let harness = Harness::start(vec![almost]);

    let receipt = harness
        .handle
        .add_comment(new_comment(1, "last", "t"))
        .await
        .expect("512th comment accepted");
    assert!(matches!(
        receipt.outcome,
        WriteOutcome::Commented {
            comment_count: 512,
            ..
        }
    ));

    let err = harness
        .handle
        .add_comment(new_comment(1, "over", "t"))
        .await
        .expect_err("513th rejected");
    assert!(matches!(err, WriteError::Capacity { .. }));
    assert_eq!(harness.store.calls().comment, 1);
}

#[tokio::test]
async fn persistence_failure_leaves_model_and_cache_untouched() {
    let harness = Harness::start(single_article());
    let index_before = harness.cache.read(View::BlogIndex).expect("index");
    harness.store.set_failing(true);

    let err = harness
        .handle
        .create_article("B", "x")
        .await
        .expect_err("store down");
    assert!(matches!(err, WriteError::Persistence(_)));

    let err = harness
        .handle
        .add_comment(new_comment(1, "n", "t"))
        .await
        .expect_err("store down");
    assert!(matches!(err, WriteError::Persistence(_)));

    assert!(harness.cache.read(View::Article(ArticleId(2))).is_none());
    let index_after = harness.cache.read(View::BlogIndex).expect("index");
    assert_eq!(index_before.body(), index_after.body());

    harness.store.set_failing(false);
    let receipt = harness
        .handle
        .add_comment(new_comment(1, "n", "t"))
        .await
        .expect("store back");
    // Rejected writes never consumed an ordinal.
    assert_eq!(receipt.version, 1);
    assert!(matches!(
        receipt.outcome,
        WriteOutcome::Commented {
            comment_count: 1,
            ..
        }
    ));
}

#[tokio::test]
async fn render_failure_keeps_previous_snapshot_and_reports_warning() {
    let harness = Harness::start(single_article());
    let page_before = harness.cache.read(View::Article(ArticleId(1))).expect("page");
    harness.renderer.set_failing(true);

    let receipt = harness
        .handle
        .add_comment(new_comment(1, "n", "t"))
        .await
        .expect("write itself succeeds");
    assert_eq!(receipt.warnings.len(), 1);
    assert_eq!(receipt.warnings[0].view, View::Article(ArticleId(1)));

    let page_during = harness.cache.read(View::Article(ArticleId(1))).expect("page");
    assert_eq!(page_before.body(), page_during.body());
    assert_eq!(page_during.version(), 0);
    assert_eq!(harness.store.stored(ArticleId(1)).expect("stored").comments.len(), 1);

    // The next successful render catches up with everything committed so far.
    harness.renderer.set_failing(false);
    let receipt = harness
        .handle
        .add_comment(new_comment(1, "m", "u"))
        .await
        .expect("second comment");
    assert!(receipt.warnings.is_empty());
    let page = harness.read_text(View::Article(ArticleId(1))).expect("page");
    assert!(page.contains("2 comments"));
}

#[tokio::test]
async fn created_article_keeps_an_entry_when_its_page_fails_to_render() {
    let harness = Harness::start(single_article());
    harness.renderer.set_failing_articles(true);

    let receipt = harness
        .handle
        .create_article("B", "x")
        .await
        .expect("persisted");
    let views: Vec<View> = receipt.warnings.iter().map(|w| w.view).collect();
    assert_eq!(views, [View::Article(ArticleId(2))]);

    // The index links to the new article, and the link resolves.
    let index = harness.read_text(View::BlogIndex).expect("index");
    assert!(index.contains(r#"href="/blog/2""#));
    assert_eq!(harness.read_version(View::BlogIndex), Some(1));
    assert_eq!(
        harness.read_text(View::Article(ArticleId(2))).as_deref(),
        Some(PENDING_ARTICLE_PAGE)
    );
    assert_eq!(harness.read_version(View::Article(ArticleId(2))), Some(1));

    harness.renderer.set_failing_articles(false);
    harness
        .handle
        .add_comment(new_comment(2, "n", "t"))
        .await
        .expect("comment on the new article");
    let page = harness
        .read_text(View::Article(ArticleId(2)))
        .expect("rendered page");
    assert!(page.contains(r#"<h1 class="article-title">B</h1>"#));
    assert_eq!(harness.read_version(View::Article(ArticleId(2))), Some(2));
}

#[tokio::test]
async fn created_article_with_no_render_at_all_is_still_servable() {
    let harness = Harness::start(single_article());
    let index_before = harness.cache.read(View::BlogIndex).expect("index");
    harness.renderer.set_failing(true);

    let receipt = harness
        .handle
        .create_article("B", "x")
        .await
        .expect("persisted");
    assert_eq!(receipt.warnings.len(), 2);
    assert_eq!(
        harness.cache.read(View::BlogIndex).expect("index").body(),
        index_before.body()
    );
    assert!(harness.cache.read(View::Article(ArticleId(2))).is_some());
}

#[tokio::test]
async fn create_goes_first_even_when_clock_lags_newest_article() {
    let newer_than_clock = vec![article(1, "A", datetime!(2025-01-01 09:00 UTC))];
    let harness = Harness::start(newer_than_clock);

    let receipt = harness
        .handle
        .create_article("B", "x")
        .await
        .expect("create succeeds");
    assert_eq!(receipt.outcome, WriteOutcome::Created(ArticleId(2)));

    let stored = harness.store.stored(ArticleId(2)).expect("persisted");
    assert_eq!(stored.created_at, datetime!(2025-01-01 09:00 UTC));

    let index = harness.read_text(View::BlogIndex).expect("index");
    let b = index.find(">B</a>").expect("B listed");
    let a = index.find(">A</a>").expect("A listed");
    assert!(b < a, "new article must be at position 0 of the index");

    // A later create still goes in front of both.
    harness
        .handle
        .create_article("C", "y")
        .await
        .expect("second create");
    let index = harness.read_text(View::BlogIndex).expect("index");
    assert!(index.find(">C</a>").expect("C listed") < index.find(">B</a>").expect("B listed"));
}

#[tokio::test]
async fn full_queue_rejects_with_overloaded() {
    let harness = Harness::start_with(single_article(), single_article(), 1);
    let gate = harness.store.gate_writes();

    // First write is taken off the queue and parks inside the store.
    let first = tokio::spawn({
        let handle = harness.handle.clone();
        async move { handle.create_article("B", "x").await }
    });
    harness.store.write_entered().await;

    // Second write occupies the single queue slot.
    let mut second = Box::pin(harness.handle.create_article("C", "y"));
    assert!(futures::poll!(second.as_mut()).is_pending());

    let err = harness
        .handle
        .create_article("D", "z")
        .await
        .expect_err("queue is full");
    assert!(matches!(err, WriteError::Overloaded));

    gate.add_permits(8);
    let first = first.await.expect("join").expect("first write");
    let second = second.await.expect("second write");
    assert_eq!(first.version, 1);
    assert_eq!(second.version, 2);
    assert_eq!(harness.store.calls().create, 2);
}

#[tokio::test]
async fn writes_apply_in_submission_order() {
    let harness = Harness::start(single_article());

    let receipts = futures::future::join_all(
        (0..10).map(|n| harness.handle.add_comment(new_comment(1, &format!("c{n}"), "t"))),
    )
    .await;

    let versions: Vec<u64> = receipts
        .into_iter()
        .map(|r| r.expect("comment").version)
        .collect();
    assert_eq!(versions, (1..=10).collect::<Vec<_>>());

    let stored = harness.store.stored(ArticleId(1)).expect("stored");
    let names: Vec<&str> = stored
        .comments
        .iter()
        .map(|c| c.commenter_name.as_str())
        .collect();
    let expected: Vec<String> = (0..10).rev().map(|n| format!("c{n}")).collect();
    assert_eq!(names, expected);
}

#[tokio::test]
async fn coordinator_stops_after_last_handle_drops() {
    let Harness { handle, task, .. } = Harness::start(single_article());
    handle
        .create_article("B", "x")
        .await
        .expect("create succeeds");

    drop(handle);
    tokio::time::timeout(std::time::Duration::from_secs(5), task)
        .await
        .expect("coordinator exits")
        .expect("no panic");
}

#[tokio::test]
async fn closed_coordinator_reports_unavailable() {
    let harness = Harness::start(single_article());
    let handle = harness.handle.clone();
    harness.task.abort();
    let _ = harness.task.await;

    let err = handle
        .create_article("B", "x")
        .await
        .expect_err("coordinator gone");
    assert!(matches!(err, WriteError::Unavailable));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_readers_only_see_complete_pages() {
    let harness = Arc::new(Harness::start(single_article()));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let cache = harness.cache.clone();
            thread::spawn(move || {
                let mut last_version = 0;
                for _ in 0..2_000 {
                    let snapshot = cache.read(View::Article(ArticleId(1))).expect("page");
                    let text = std::str::from_utf8(snapshot.body()).expect("utf-8");
                    assert!(text.trim_end().ends_with("</html>"), "torn page");
                    assert!(snapshot.version() >= last_version, "version went backwards");
                    last_version = snapshot.version();
                }
            })
        })
        .collect();

    for n in 0..50 {
        harness
            .handle
            .add_comment(new_comment(1, &format!("c{n}"), "t"))
            .await
            .expect("comment");
    }

    for reader in readers {
        reader.join().expect("reader");
    }
}
