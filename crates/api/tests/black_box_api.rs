use std::sync::Arc;

use catalog_api::app::services::build_in_memory_services;
use catalog_infra::jobs::JobExecutorHandle;
use catalog_infra::PipelineConfig;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::Value;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
    upload_dir: tempfile::TempDir,
    _executor: JobExecutorHandle,
}

impl TestServer {
    async fn spawn() -> Self {
        let upload_dir = tempfile::tempdir().expect("failed to create upload dir");
        let pipeline = PipelineConfig {
            chunk_size: 2,
            delete_chunk_size: 2,
            workers: 2,
            upload_dir: upload_dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let (services, executor) =
            build_in_memory_services(&pipeline).await.expect("failed to build services");

        // Same router as prod, bound to an ephemeral port.
        let app = catalog_api::app::build_app(Arc::new(services), 10 * 1024 * 1024);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            handle,
            upload_dir,
            _executor: executor,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn upload(client: &reqwest::Client, base_url: &str, name: &str, body: &str) -> reqwest::Response {
    let form = Form::new().part(
        "file",
        Part::bytes(body.as_bytes().to_vec()).file_name(name.to_string()),
    );
    client
        .post(format!("{}/api/upload", base_url))
        .multipart(form)
        .send()
        .await
        .unwrap()
}

async fn status_eventually(
    client: &reqwest::Client,
    base_url: &str,
    task_id: &str,
    expected: &str,
) -> Value {
    // Jobs run on background workers; poll briefly until the status settles.
    for _ in 0..100 {
        let res = client
            .get(format!("{}/api/upload/status/{}", base_url, task_id))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        if body["status"] == expected {
            return body;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    panic!("task {task_id} did not reach '{expected}' within timeout");
}

#[tokio::test]
async fn health_reports_ok() {
    let srv = TestServer::spawn().await;

    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"], "memory");
}

#[tokio::test]
async fn csv_upload_runs_to_completion() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let csv = "name,sku,description\nWidget,W-1,first\nGadget,G-1,second\nWidget v2,w-1,updated\n";
    let res = upload(&client, &srv.base_url, "products.csv", csv).await;
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let accepted: Value = res.json().await.unwrap();
    let task_id = accepted["task_id"].as_str().unwrap().to_string();

    let body = status_eventually(&client, &srv.base_url, &task_id, "completed").await;
    assert_eq!(body["task_id"], task_id.as_str());
    assert_eq!(body["processed_records"], 3);
    assert_eq!(body["total_records"], 3);
    assert_eq!(body["progress_percentage"], 100.0);

    // The accepted file is kept under the upload directory.
    let stored: Vec<_> = std::fs::read_dir(srv.upload_dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(stored, vec![format!("{task_id}_products.csv")]);

    let res = client
        .get(format!("{}/api/tasks/{}", srv.base_url, task_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Task status retrieved successfully");
    assert_eq!(body["results"]["status"], "completed");
    assert_eq!(body["results"]["progress"], 100.0);
}

#[tokio::test]
async fn non_csv_upload_is_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = upload(&client, &srv.base_url, "products.txt", "name,sku,description\n").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_file_type");
}

#[tokio::test]
async fn upload_missing_required_columns_is_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = upload(&client, &srv.base_url, "products.csv", "name,price\nWidget,3\n").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_csv");
    assert!(body["message"].as_str().unwrap().contains("sku"));

    // The rejected body was not kept and nothing was queued.
    assert_eq!(std::fs::read_dir(srv.upload_dir.path()).unwrap().count(), 0);
    let res = client
        .get(format!("{}/api/tasks", srv.base_url))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["results"]["total"], 0);
}

#[tokio::test]
async fn upload_without_file_field_is_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let form = Form::new().text("note", "no file here");
    let res = client
        .post(format!("{}/api/upload", srv.base_url))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "missing_file");
}

#[tokio::test]
async fn unknown_and_malformed_task_ids() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let unknown = catalog_core::JobId::new();
    let res = client
        .get(format!("{}/api/upload/status/{}", srv.base_url, unknown))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(format!("{}/api/tasks/{}", srv.base_url, unknown))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(format!("{}/api/tasks/not-a-uuid", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_task_id");
}

#[tokio::test]
async fn bulk_delete_requires_confirmation() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/products/bulk-delete", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "confirmation_required");

    let res = client
        .post(format!("{}/api/products/bulk-delete?confirm=false", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bulk_delete_on_empty_catalog_completes() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/products/bulk-delete?confirm=true", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Bulk delete started");
    let task_id = body["results"]["task_id"].as_str().unwrap().to_string();

    let body = status_eventually(&client, &srv.base_url, &task_id, "completed").await;
    assert_eq!(body["processed_records"], 0);
    assert_eq!(body["total_records"], 0);
    assert_eq!(body["progress_percentage"], 0.0);
}

#[tokio::test]
async fn bulk_delete_removes_uploaded_products() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let csv = "name,sku,description\nA,a-1,x\nB,b-1,x\nC,c-1,x\nD,d-1,x\nE,e-1,x\n";
    let res = upload(&client, &srv.base_url, "five.csv", csv).await;
    let accepted: Value = res.json().await.unwrap();
    let upload_id = accepted["task_id"].as_str().unwrap().to_string();
    status_eventually(&client, &srv.base_url, &upload_id, "completed").await;

    let res = client
        .post(format!("{}/api/products/bulk-delete?confirm=true", srv.base_url))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    let delete_id = body["results"]["task_id"].as_str().unwrap().to_string();

    let body = status_eventually(&client, &srv.base_url, &delete_id, "completed").await;
    assert_eq!(body["processed_records"], 5);
    assert_eq!(body["total_records"], 5);
}

#[tokio::test]
async fn task_list_is_paginated_and_filterable() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let mut ids = Vec::new();
    for i in 0..3 {
        let res = upload(
            &client,
            &srv.base_url,
            &format!("batch{i}.csv"),
            "name,sku,description\nA,a-1,x\n",
        )
        .await;
        let accepted: Value = res.json().await.unwrap();
        ids.push(accepted["task_id"].as_str().unwrap().to_string());
    }
    for id in &ids {
        status_eventually(&client, &srv.base_url, id, "completed").await;
    }

    let res = client
        .get(format!("{}/api/tasks?page=1&limit=2", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Tasks retrieved successfully");
    assert_eq!(body["results"]["total"], 3);
    assert_eq!(body["results"]["page"], 1);
    assert_eq!(body["results"]["limit"], 2);
    let data = body["results"]["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["task_type"], "product_ingestion");

    let res = client
        .get(format!("{}/api/tasks?status=completed&page=2&limit=2", srv.base_url))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["results"]["data"].as_array().unwrap().len(), 1);

    let res = client
        .get(format!("{}/api/tasks?status=failed", srv.base_url))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["results"]["total"], 0);

    let res = client
        .get(format!("{}/api/tasks?status=bogus", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_event_types_are_listed_with_samples() {
    let srv = TestServer::spawn().await;

    let res = reqwest::get(format!("{}/api/webhooks/event-types", srv.base_url))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    let types = body["event_types"].as_array().unwrap();
    assert_eq!(types.len(), 2);
    assert_eq!(types[0]["event_type"], "product_upload_complete");
    assert_eq!(types[0]["sample_payload"]["data"]["total_products"], 500000);
    assert_eq!(types[1]["sample_payload"]["data"]["deleted_count"], 1000000);
}

#[tokio::test]
async fn startup_resumes_jobs_left_unfinished() {
    use catalog_api::app::services::{start, Stores};
    use catalog_core::JobId;
    use catalog_infra::jobs::{CheckpointStore, JobKind, JobStatus};
    use catalog_infra::webhooks::HttpWebhookTransport;

    let upload_dir = tempfile::tempdir().unwrap();
    let pipeline = PipelineConfig {
        chunk_size: 2,
        delete_chunk_size: 2,
        workers: 1,
        upload_dir: upload_dir.path().to_path_buf(),
        ..PipelineConfig::default()
    };

    // State as a stopped process left it: one ingest interrupted after its
    // first row, one delete never picked up.
    let stores = Stores::in_memory();
    let ingest = JobId::new();
    std::fs::write(
        upload_dir.path().join(format!("{ingest}_left.csv")),
        "name,sku,description\nA,a-1,x\nB,b-1,x\nC,c-1,x\n",
    )
    .unwrap();
    stores
        .checkpoints
        .create(ingest, JobKind::Ingest, Some("left.csv".into()))
        .await
        .unwrap();
    stores.checkpoints.mark_processing(ingest, 3, 1).await.unwrap();
    let delete = JobId::new();
    stores.checkpoints.create(delete, JobKind::BulkDelete, None).await.unwrap();

    let transport = Arc::new(HttpWebhookTransport::new(pipeline.webhook_timeout).unwrap());
    let (_services, executor) = start(&pipeline, stores.clone(), transport, "memory")
        .await
        .expect("failed to start services");

    for id in [ingest, delete] {
        let mut status = JobStatus::Pending;
        for _ in 0..200 {
            status = stores.checkpoints.get(id).await.unwrap().status;
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(status, JobStatus::Completed, "job {id} was not resumed");
    }
    let job = stores.checkpoints.get(ingest).await.unwrap();
    assert_eq!((job.processed_count, job.total_count), (3, 3));
    executor.shutdown().await;
}
