use axum::{Extension, Json, extract::State};
use tracing::{debug, warn};

use orbit_types::api::{NotificationResponse, StatusMessage};
use orbit_types::events::GatewayEvent;

use crate::convert;
use crate::error::ApiResult;
use crate::middleware::AuthUser;
use crate::state::{AppState, blocking};

/// List my notifications, newest first, then mark them all read.
/// The response still shows which ones were unread.
pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<NotificationResponse>>> {
    let rows = blocking(&state, move |db| {
        let me = auth.id.to_string();
        let rows = db.list_notifications(&me)?;
        db.mark_notifications_read(&me)?;
        Ok(rows)
    })
    .await?;

    Ok(Json(rows.into_iter().map(convert::notification).collect()))
}

pub async fn delete_all(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<StatusMessage>> {
    let deleted = blocking(&state, move |db| Ok(db.delete_notifications(&auth.id.to_string())?)).await?;
    debug!("Deleted {} notifications", deleted);

    Ok(Json(StatusMessage::new("Notifications deleted successfully")))
}

/// Push a freshly created notification to its recipient's sockets.
/// Failures are logged; the write that created it already succeeded.
pub(crate) async fn push_notification(state: &AppState, notification_id: String) {
    let row = match blocking(state, move |db| Ok(db.get_notification(&notification_id)?)).await {
        Ok(Some(row)) => row,
        Ok(None) => return,
        Err(e) => {
            warn!("Failed to load notification for push: {}", e);
            return;
        }
    };

    let notification = convert::notification(row);
    state
        .dispatcher
        .send_to_user(notification.to, GatewayEvent::Notification(notification))
        .await;
}
