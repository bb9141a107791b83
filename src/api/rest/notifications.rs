use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::event::Notification;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/:id/notifications", get(list_notifications))
        .route(
            "/users/:id/notifications/:notification_id/read",
            patch(mark_read),
        )
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Json<Vec<Notification>> {
    Json(state.notifier.list_for_user(id))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path((id, notification_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Notification>, AppError> {
    let notification = state.notifier.mark_read(id, notification_id)?;
    Ok(Json(notification))
}
