use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::{MessageType, UserRole};
use crate::models::CaseMessage;

pub fn insert_case_message(conn: &Connection, msg: &CaseMessage) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO case_messages (id, case_id, sender_id, sender_role, content,
             message_type, is_internal, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            msg.id.to_string(),
            msg.case_id.to_string(),
            msg.sender_id.to_string(),
            msg.sender_role.as_str(),
            msg.content,
            msg.message_type.as_str(),
            msg.is_internal as i32,
            msg.created_at,
        ],
    )?;
    Ok(())
}

/// All non-internal messages for a case, oldest first. Timeline input.
pub fn list_case_messages(
    conn: &Connection,
    case_id: &Uuid,
) -> Result<Vec<CaseMessage>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, case_id, sender_id, sender_role, content, message_type,
                is_internal, created_at
         FROM case_messages
         WHERE case_id = ?1 AND is_internal = 0
         ORDER BY created_at ASC",
    )?;
    let rows = stmt.query_map(params![case_id.to_string()], message_row)?;
    rows.collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(message_from_row)
        .collect()
}

// Internal row type for CaseMessage mapping
struct MessageRow {
    id: String,
    case_id: String,
    sender_id: String,
    sender_role: String,
    content: String,
    message_type: String,
    is_internal: i32,
    created_at: DateTime<Utc>,
}

fn message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get("id")?,
        case_id: row.get("case_id")?,
        sender_id: row.get("sender_id")?,
        sender_role: row.get("sender_role")?,
        content: row.get("content")?,
        message_type: row.get("message_type")?,
        is_internal: row.get("is_internal")?,
        created_at: row.get("created_at")?,
    })
}

fn message_from_row(row: MessageRow) -> Result<CaseMessage, DatabaseError> {
    let parse_id = |s: &str| {
        Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
    };
    Ok(CaseMessage {
        id: parse_id(&row.id)?,
        case_id: parse_id(&row.case_id)?,
        sender_id: parse_id(&row.sender_id)?,
        sender_role: UserRole::from_str(&row.sender_role)?,
        content: row.content,
        message_type: MessageType::from_str(&row.message_type)?,
        is_internal: row.is_internal != 0,
        created_at: row.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::db::repository::case::insert_case;
    use crate::db::repository::case::tests::{draft_case, seed_profile};

    #[test]
    fn messages_ordered_and_internal_hidden() {
        let conn = open_memory_database().unwrap();
        let gp = seed_profile(&conn, UserRole::Gp, None);
        let case = draft_case(gp);
        insert_case(&conn, &case).unwrap();

        let base = Utc::now();
        for (offset, content, internal) in
            [(2, "second", false), (0, "first", false), (1, "hidden", true)]
        {
            insert_case_message(
                &conn,
                &CaseMessage {
                    id: Uuid::new_v4(),
                    case_id: case.id,
                    sender_id: gp,
                    sender_role: UserRole::Gp,
                    content: content.into(),
                    message_type: MessageType::Text,
                    is_internal: internal,
                    created_at: base + chrono::Duration::seconds(offset),
                },
            )
            .unwrap();
        }

        let messages = list_case_messages(&conn, &case.id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "first");
        assert_eq!(messages[1].content, "second");
    }
}
