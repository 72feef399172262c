//! HTTP dispatch: public snapshot reads and comment posts on one listener,
//! administrative article writes on another.

mod admin;
mod middleware;
mod public;

pub use admin::{AdminState, build_admin_router};
pub use public::{PublicState, build_router};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::application::error::{ErrorReport, HttpError};
use crate::application::repos::RepoError;

fn store_health_response(result: Result<(), RepoError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::store_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

fn bad_request(source: &'static str, public_message: &'static str, detail: String) -> HttpError {
    HttpError::new(source, StatusCode::BAD_REQUEST, public_message, detail)
}
