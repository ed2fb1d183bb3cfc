use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use catalog_core::JobId;
use catalog_infra::jobs::{CheckpointError, SubmissionError};

pub fn submission_error_to_response(err: SubmissionError) -> axum::response::Response {
    match err {
        SubmissionError::NotCsv => {
            json_error(StatusCode::BAD_REQUEST, "invalid_file_type", "only .csv files are accepted")
        }
        SubmissionError::InvalidFile(e) => json_error(StatusCode::BAD_REQUEST, "invalid_csv", e.to_string()),
        SubmissionError::Storage(e) => {
            tracing::error!(error = %e, "failed to store upload");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", "failed to store upload")
        }
        SubmissionError::Checkpoint(e) => checkpoint_error_to_response(e),
        SubmissionError::Queue(e) => json_error(StatusCode::SERVICE_UNAVAILABLE, "queue_closed", e.to_string()),
    }
}

pub fn checkpoint_error_to_response(err: CheckpointError) -> axum::response::Response {
    match err {
        CheckpointError::NotFound(id) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("task {id} not found"))
        }
        CheckpointError::AlreadyExists(id) => {
            json_error(StatusCode::CONFLICT, "conflict", format!("task {id} already exists"))
        }
        CheckpointError::Storage(msg) => {
            tracing::error!(error = %msg, "checkpoint store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn parse_task_id(s: &str) -> Result<JobId, axum::response::Response> {
    s.parse::<JobId>().map_err(|_| {
        json_error(StatusCode::BAD_REQUEST, "invalid_task_id", "task_id must be a UUID")
    })
}
