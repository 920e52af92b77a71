use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::UserRole;

/// A registered user — either a submitting GP or a reviewing specialist.
/// Profile data is pushed in by the identity collaborator; we never manage
/// credentials here, only role and contact/specialty metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub role: UserRole,
    pub full_name: String,
    pub email: String,
    pub specialty: Option<String>,
    pub clinic_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The authenticated caller of an operation, resolved by the auth
/// middleware. Domain operations take this explicitly instead of reading
/// ambient request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: UserRole,
}

impl Actor {
    pub fn gp(id: Uuid) -> Self {
        Self { id, role: UserRole::Gp }
    }

    pub fn specialist(id: Uuid) -> Self {
        Self { id, role: UserRole::Specialist }
    }
}
