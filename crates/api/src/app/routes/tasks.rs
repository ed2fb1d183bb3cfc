use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use catalog_infra::jobs::{store::clamp_page, JobFilter, JobStatus};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_tasks))
        .route("/:task_id", get(get_task))
}

/// Query parameters:
/// - `status`: `pending`, `processing` (or `in_progress`), `completed`, `failed`
/// - `page`: 1-based page number (default: 1)
/// - `limit`: items per page (default: 20, max: 100)
pub async fn list_tasks(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::TaskListQuery>,
) -> axum::response::Response {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some("in_progress") => Some(JobStatus::Processing),
        Some(raw) => match JobStatus::parse(raw) {
            Some(s) => Some(s),
            None => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_status",
                    "status must be one of: pending, processing, completed, failed",
                );
            }
        },
    };

    let (page, limit) = clamp_page(query.page.unwrap_or(1), query.limit.unwrap_or(20));
    let filter = JobFilter { status, kind: None };

    match services.jobs.list(filter, page, limit).await {
        Ok((jobs, total)) => Json(dto::ApiResponse::new(
            "Tasks retrieved successfully",
            dto::Paginated {
                total,
                page,
                limit,
                data: jobs.into_iter().map(dto::TaskDto::from).collect(),
            },
        ))
        .into_response(),
        Err(e) => errors::checkpoint_error_to_response(e),
    }
}

pub async fn get_task(
    Extension(services): Extension<Arc<AppServices>>,
    Path(task_id): Path<String>,
) -> axum::response::Response {
    let task_id = match errors::parse_task_id(&task_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.jobs.status(task_id).await {
        Ok(view) => Json(dto::ApiResponse::new(
            "Task status retrieved successfully",
            dto::TaskStatusDto::from(view),
        ))
        .into_response(),
        Err(e) => errors::checkpoint_error_to_response(e),
    }
}
