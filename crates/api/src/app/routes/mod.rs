use axum::{routing::get, Router};

pub mod products;
pub mod system;
pub mod tasks;
pub mod upload;
pub mod webhooks;

/// Router for every `/api` endpoint.
pub fn router() -> Router {
    Router::new()
        .nest("/upload", upload::router())
        .nest("/tasks", tasks::router())
        .nest("/products", products::router())
        .route("/webhooks/event-types", get(webhooks::event_types))
}
