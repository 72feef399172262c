use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use axum::{
    Form, Router,
    body::Body,
    extract::{ConnectInfo, FromRequestParts, Path, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE, LOCATION},
        request::Parts,
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;

use crate::{
    application::{
        coordinator::{CoordinatorHandle, NewComment},
        error::HttpError,
        repos::ArticleStore,
    },
    cache::{ContentCache, Snapshot, View},
    domain::types::ArticleId,
};

use super::{
    bad_request,
    middleware::{log_responses, set_request_context},
    store_health_response,
};

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

#[derive(Clone)]
pub struct PublicState {
    pub cache: Arc<ContentCache>,
    pub coordinator: CoordinatorHandle,
    pub store: Arc<dyn ArticleStore>,
}

pub fn build_router(state: PublicState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/blog", get(blog_index))
        .route("/blog/{id}", get(article_detail))
        .route("/blog/comment", post(submit_comment))
        .route("/_health", get(health))
        .fallback(fallback)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn root() -> Response {
    found("/blog".to_string())
}

async fn blog_index(State(state): State<PublicState>) -> Response {
    match state.cache.read(View::BlogIndex) {
        Some(snapshot) => snapshot_response(snapshot),
        None => article_not_found("blog index missing from cache".to_string()),
    }
}

async fn article_detail(State(state): State<PublicState>, Path(raw_id): Path<String>) -> Response {
    let Ok(id) = raw_id.parse::<ArticleId>() else {
        return article_not_found(format!("`{raw_id}` is not an article id"));
    };

    match state.cache.read(View::Article(id)) {
        Some(snapshot) => snapshot_response(snapshot),
        None => article_not_found(format!("article {id} has no cache entry")),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommentForm {
    #[serde(rename = "article-id")]
    article_id: String,
    name: String,
    email: String,
    text: String,
}

async fn submit_comment(
    State(state): State<PublicState>,
    RemoteIp(commenter_ip): RemoteIp,
    Form(form): Form<CommentForm>,
) -> Response {
    let article_id = match form.article_id.parse::<ArticleId>() {
        Ok(id) => id,
        Err(err) => {
            return bad_request(
                "infra::http::public::submit_comment",
                "Invalid article id",
                format!("`{}`: {err}", form.article_id),
            )
            .into_response();
        }
    };

    let comment = NewComment {
        article_id,
        name: form.name,
        email: form.email,
        text: form.text,
        commenter_ip,
    };

    match state.coordinator.add_comment(comment).await {
        Ok(_) => found(format!("/blog/{article_id}")),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn health(State(state): State<PublicState>) -> Response {
    store_health_response(state.store.health_check().await)
}

async fn fallback() -> Response {
    HttpError::new(
        "infra::http::public::fallback",
        StatusCode::NOT_FOUND,
        "Not found",
        "no route matched",
    )
    .into_response()
}

fn snapshot_response(snapshot: Snapshot) -> Response {
    let mut response = Response::new(Body::from(snapshot.into_body()));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(HTML_CONTENT_TYPE));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

fn found(location: String) -> Response {
    (StatusCode::FOUND, [(LOCATION, location)]).into_response()
}

fn article_not_found(detail: String) -> Response {
    HttpError::new(
        "infra::http::public::article_detail",
        StatusCode::NOT_FOUND,
        "Article not found",
        detail,
    )
    .into_response()
}

/// Textual remote address of the connection, or `unknown` when the server
/// was started without connect info.
struct RemoteIp(String);

impl<S> FromRequestParts<S> for RemoteIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(Self(ip))
    }
}
