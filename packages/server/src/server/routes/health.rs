//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use super::AppState;

pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let database = match sqlx::query("SELECT 1").execute(&state.deps.db_pool).await {
        Ok(_) => "up",
        Err(_) => "down",
    };

    Json(json!({
        "status": if database == "up" { "ok" } else { "degraded" },
        "database": database,
        "pool": {
            "connections": state.deps.db_pool.size(),
            "idle": state.deps.db_pool.num_idle(),
        },
    }))
}
