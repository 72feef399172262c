use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    application::{
        auth::AdminAuthorizer,
        coordinator::{CoordinatorHandle, WriteReceipt},
        error::HttpError,
    },
    domain::types::ArticleId,
};

use super::{
    bad_request,
    middleware::{log_responses, set_request_context},
};

const SOURCE: &str = "infra::http::admin::write_article";

#[derive(Clone)]
pub struct AdminState {
    pub coordinator: CoordinatorHandle,
    pub authorizer: Arc<dyn AdminAuthorizer>,
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/articles", post(write_article))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ArticleForm {
    id: String,
    title: String,
    body: String,
    secret: String,
}

#[derive(Debug, Serialize)]
struct WarningView {
    view: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct ArticleWriteResponse {
    id: ArticleId,
    version: u64,
    warnings: Vec<WarningView>,
}

impl From<WriteReceipt> for ArticleWriteResponse {
    fn from(receipt: WriteReceipt) -> Self {
        Self {
            id: receipt.outcome.article_id(),
            version: receipt.version,
            warnings: receipt
                .warnings
                .into_iter()
                .map(|warning| WarningView {
                    view: warning.view.to_string(),
                    message: warning.message,
                })
                .collect(),
        }
    }
}

/// Negative ids create an article; any other id updates the existing one.
async fn write_article(State(state): State<AdminState>, Form(form): Form<ArticleForm>) -> Response {
    if let Err(err) = state.authorizer.authorize(Some(form.secret.as_str())) {
        return HttpError::from_error(SOURCE, StatusCode::UNAUTHORIZED, "Unauthorized", &err)
            .into_response();
    }

    let id = match form.id.trim().parse::<i64>() {
        Ok(id) => id,
        Err(err) => {
            return bad_request(SOURCE, "Invalid article id", format!("`{}`: {err}", form.id))
                .into_response();
        }
    };

    let result = if id < 0 {
        state.coordinator.create_article(form.title, form.body).await
    } else {
        state
            .coordinator
            .update_article(ArticleId(id), supplied(form.title), supplied(form.body))
            .await
    };

    match result {
        Ok(receipt) => {
            info!(
                target: "lectern::http::admin",
                article_id = %receipt.outcome.article_id(),
                version = receipt.version,
                warnings = receipt.warnings.len(),
                "article write applied"
            );
            Json(ArticleWriteResponse::from(receipt)).into_response()
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

fn supplied(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}
