use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{MessageType, UserRole};

/// One timeline message — chat text or a system/report marker.
/// Immutable once created; there is no edit or delete path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseMessage {
    pub id: Uuid,
    pub case_id: Uuid,
    pub sender_id: Uuid,
    pub sender_role: UserRole,
    pub content: String,
    pub message_type: MessageType,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}
