use std::sync::Arc;

use axum::{
    extract::{Extension, Multipart, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(upload_csv))
        .route("/status/:task_id", get(upload_status))
}

/// Accept a multipart `file` field and queue it for ingestion.
///
/// The body is streamed to disk; a bad header is rejected as soon as its
/// line has arrived.
pub async fn upload_csv(
    Extension(services): Extension<Arc<AppServices>>,
    mut multipart: Multipart,
) -> axum::response::Response {
    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return errors::json_error(e.status(), "invalid_multipart", e.body_text()),
        };
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let mut upload = match services.jobs.begin_upload(&filename).await {
            Ok(upload) => upload,
            Err(e) => return errors::submission_error_to_response(e),
        };
        loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    if let Err(e) = upload.write(&chunk).await {
                        return errors::submission_error_to_response(e);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(job_id = %upload.job_id(), error = %e, "upload interrupted");
                    return errors::json_error(e.status(), "invalid_multipart", e.body_text());
                }
            }
        }

        return match upload.finish().await {
            Ok(task_id) => (StatusCode::ACCEPTED, Json(dto::TaskAccepted { task_id })).into_response(),
            Err(e) => errors::submission_error_to_response(e),
        };
    }

    errors::json_error(
        StatusCode::BAD_REQUEST,
        "missing_file",
        "multipart field 'file' is required",
    )
}

pub async fn upload_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(task_id): Path<String>,
) -> axum::response::Response {
    let task_id = match errors::parse_task_id(&task_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.jobs.status(task_id).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => errors::checkpoint_error_to_response(e),
    }
}
