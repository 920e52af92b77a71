pub mod auth;
pub mod cases;
pub mod files;
pub mod health;
pub mod messages;

use rusqlite::Connection;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::open_database;

/// Open a request-scoped database connection.
pub(crate) fn connect(ctx: &ApiContext) -> Result<Connection, ApiError> {
    Ok(open_database(&ctx.db_path)?)
}

/// Fire notifications off-request. Delivery never gates the response.
pub(crate) fn dispatch_notifications(
    ctx: &ApiContext,
    notifications: Vec<crate::notify::Notification>,
) {
    if notifications.is_empty() {
        return;
    }
    let notifier = ctx.notifier.clone();
    tokio::spawn(async move {
        notifier.dispatch(notifications).await;
    });
}
