use rusqlite::params;
use uuid::Uuid;

use huddle_shared::{DeliveryStatus, Envelope, MessageContent, MessageKind, RoomId, UserId};

use crate::database::{conversion_error, ts_from_sql, ts_to_sql, Database};
use crate::error::{not_found, Result};
use crate::models::{ChatMessage, MessageStatusRecord};

const MESSAGE_COLUMNS: &str = "id, room_id, sender_id, kind, content, file_url, file_name,
     file_size, file_type, thumbnail_url, duration, status, created_at, updated_at";

impl Database {
    pub fn create_message(&self, message: &ChatMessage) -> Result<()> {
        let mut flat = Envelope::new(message.kind());
        message.content.apply_to(&mut flat);

        self.conn().execute(
            "INSERT INTO messages (id, room_id, sender_id, kind, content, file_url, file_name,
                                   file_size, file_type, thumbnail_url, duration, status,
                                   created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                message.id.to_string(),
                message.room_id.as_str(),
                message.sender_id.as_str(),
                message.kind().as_str(),
                flat.content,
                flat.file_url,
                flat.file_name,
                flat.file_size,
                flat.file_type,
                flat.thumbnail_url,
                flat.duration,
                message.status.as_str(),
                ts_to_sql(&message.created_at),
                ts_to_sql(&message.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_message(&self, id: Uuid) -> Result<ChatMessage> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(not_found)
    }

    /// One page of a room's messages, newest first.
    pub fn get_room_messages(
        &self,
        room_id: &RoomId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChatMessage>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE room_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2 OFFSET ?3"
        ))?;

        let rows = stmt.query_map(params![room_id.as_str(), limit, offset], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Insert or overwrite the status of a message for one user.
    pub fn update_message_status(&self, record: &MessageStatusRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO message_statuses (id, message_id, user_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (message_id, user_id)
             DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at",
            params![
                record.id.to_string(),
                record.message_id.to_string(),
                record.user_id.as_str(),
                record.status.as_str(),
                ts_to_sql(&record.created_at),
                ts_to_sql(&record.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_message_status(
        &self,
        message_id: Uuid,
        user: &UserId,
    ) -> Result<MessageStatusRecord> {
        self.conn()
            .query_row(
                "SELECT id, message_id, user_id, status, created_at, updated_at
                 FROM message_statuses
                 WHERE message_id = ?1 AND user_id = ?2",
                params![message_id.to_string(), user.as_str()],
                row_to_status,
            )
            .map_err(not_found)
    }
}

fn parse_uuid(col: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| conversion_error(col, e))
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    let id_str: String = row.get(0)?;
    let kind_str: String = row.get(3)?;
    let status_str: String = row.get(11)?;
    let created_str: String = row.get(12)?;
    let updated_str: String = row.get(13)?;

    let kind: MessageKind = kind_str.parse().map_err(|e| conversion_error(3, e))?;

    let mut flat = Envelope::new(kind);
    flat.content = row.get(4)?;
    flat.file_url = row.get(5)?;
    flat.file_name = row.get(6)?;
    flat.file_size = row.get(7)?;
    flat.file_type = row.get(8)?;
    flat.thumbnail_url = row.get(9)?;
    flat.duration = row.get(10)?;
    let content = MessageContent::from_envelope(&flat).map_err(|e| conversion_error(3, e))?;

    Ok(ChatMessage {
        id: parse_uuid(0, &id_str)?,
        room_id: RoomId(row.get(1)?),
        sender_id: UserId(row.get(2)?),
        content,
        status: status_str.parse().map_err(|e| conversion_error(11, e))?,
        created_at: ts_from_sql(12, &created_str)?,
        updated_at: ts_from_sql(13, &updated_str)?,
    })
}

fn row_to_status(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageStatusRecord> {
    let id_str: String = row.get(0)?;
    let message_id_str: String = row.get(1)?;
    let status_str: String = row.get(3)?;
    let created_str: String = row.get(4)?;
    let updated_str: String = row.get(5)?;

    let status: DeliveryStatus = status_str.parse().map_err(|e| conversion_error(3, e))?;

    Ok(MessageStatusRecord {
        id: parse_uuid(0, &id_str)?,
        message_id: parse_uuid(1, &message_id_str)?,
        user_id: UserId(row.get(2)?),
        status,
        created_at: ts_from_sql(4, &created_str)?,
        updated_at: ts_from_sql(5, &updated_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::models::Room;

    fn setup() -> (Database, Room) {
        let db = Database::open_in_memory().unwrap();
        let room = Room::group("team", vec![UserId::from("u1"), UserId::from("u2")]);
        db.create_room(&room).unwrap();
        (db, room)
    }

    #[test]
    fn history_is_newest_first_and_paged() {
        let (db, room) = setup();
        for i in 0..5 {
            let msg = ChatMessage::new(
                room.id.clone(),
                UserId::from("u1"),
                MessageContent::text(format!("m{i}")),
            );
            db.create_message(&msg).unwrap();
        }

        let page = db.get_room_messages(&room.id, 2, 0).unwrap();
        let bodies: Vec<_> = page.iter().map(|m| m.content.summary()).collect();
        assert_eq!(bodies, vec!["m4", "m3"]);

        let rest = db.get_room_messages(&room.id, 10, 2).unwrap();
        assert_eq!(rest.len(), 3);
        assert_eq!(rest[2].content.summary(), "m0");
    }

    #[test]
    fn file_message_round_trip() {
        let (db, room) = setup();
        let msg = ChatMessage::new(
            room.id.clone(),
            UserId::from("u2"),
            MessageContent::File {
                url: "https://cdn/report.pdf".into(),
                name: "report.pdf".into(),
                size: 1024,
                file_type: "application/pdf".into(),
            },
        );
        db.create_message(&msg).unwrap();

        let loaded = db.get_message(msg.id).unwrap();
        assert_eq!(loaded.content, msg.content);
        assert_eq!(loaded.sender_id, UserId::from("u2"));
        assert_eq!(loaded.status, DeliveryStatus::Sent);
    }

    #[test]
    fn missing_message_is_not_found() {
        let (db, _) = setup();
        assert!(matches!(
            db.get_message(Uuid::new_v4()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn status_upsert_keeps_one_record() {
        let (db, room) = setup();
        let msg = ChatMessage::new(room.id.clone(), UserId::from("u1"), MessageContent::text("hi"));
        db.create_message(&msg).unwrap();

        let reader = UserId::from("u2");
        db.update_message_status(&MessageStatusRecord::new(
            msg.id,
            reader.clone(),
            DeliveryStatus::Delivered,
        ))
        .unwrap();
        db.update_message_status(&MessageStatusRecord::new(
            msg.id,
            reader.clone(),
            DeliveryStatus::Read,
        ))
        .unwrap();

        let status = db.get_message_status(msg.id, &reader).unwrap();
        assert_eq!(status.status, DeliveryStatus::Read);

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM message_statuses", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
