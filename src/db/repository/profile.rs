use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::UserRole;
use crate::models::Profile;

pub fn insert_profile(conn: &Connection, profile: &Profile) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO profiles (id, role, full_name, email, specialty, clinic_name, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            profile.id.to_string(),
            profile.role.as_str(),
            profile.full_name,
            profile.email,
            profile.specialty,
            profile.clinic_name,
            profile.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_profile(conn: &Connection, id: &Uuid) -> Result<Option<Profile>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, role, full_name, email, specialty, clinic_name, created_at
         FROM profiles WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id.to_string()], profile_row);
    match result {
        Ok(row) => Ok(Some(profile_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Specialists whose declared specialty covers the requested one.
/// "Covers" is a case-insensitive containment match — a profile listing
/// "Internal Medicine, Cardiology" matches a case requesting "cardiology".
pub fn list_specialists_matching(
    conn: &Connection,
    specialty_requested: &str,
) -> Result<Vec<Profile>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, role, full_name, email, specialty, clinic_name, created_at
         FROM profiles
         WHERE role = 'specialist'
           AND specialty IS NOT NULL
           AND instr(lower(specialty), lower(?1)) > 0",
    )?;

    let rows = stmt.query_map(params![specialty_requested], profile_row)?;
    rows.collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(profile_from_row)
        .collect()
}

// Internal row type for Profile mapping
struct ProfileRow {
    id: String,
    role: String,
    full_name: String,
    email: String,
    specialty: Option<String>,
    clinic_name: Option<String>,
    created_at: DateTime<Utc>,
}

fn profile_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        id: row.get(0)?,
        role: row.get(1)?,
        full_name: row.get(2)?,
        email: row.get(3)?,
        specialty: row.get(4)?,
        clinic_name: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn profile_from_row(row: ProfileRow) -> Result<Profile, DatabaseError> {
    Ok(Profile {
        id: Uuid::parse_str(&row.id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        role: UserRole::from_str(&row.role)?,
        full_name: row.full_name,
        email: row.email,
        specialty: row.specialty,
        clinic_name: row.clinic_name,
        created_at: row.created_at,
    })
}
