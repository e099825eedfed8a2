use axum::response::Html;
use axum::Json;
use serde_json::{json, Value};

/// GET / — the homepage with the chat widget and contact form.
pub async fn index() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}

/// GET /api/health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
