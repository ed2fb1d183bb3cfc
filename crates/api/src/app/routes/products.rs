use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/bulk-delete", post(bulk_delete))
}

/// Queue removal of every product. Requires `?confirm=true`.
pub async fn bulk_delete(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::BulkDeleteQuery>,
) -> axum::response::Response {
    if !query.confirm {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "confirmation_required",
            "Confirmation required. Append ?confirm=true to proceed.",
        );
    }

    match services.jobs.submit_bulk_delete().await {
        Ok(task_id) => (
            StatusCode::ACCEPTED,
            Json(dto::ApiResponse::new(
                "Bulk delete started",
                dto::TaskAccepted { task_id },
            )),
        )
            .into_response(),
        Err(e) => errors::submission_error_to_response(e),
    }
}
