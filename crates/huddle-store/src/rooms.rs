//! CRUD operations for [`Room`] records and their membership.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use huddle_shared::{RoomId, RoomKind, UserId};

use crate::database::{conversion_error, ts_from_sql, ts_to_sql, Database};
use crate::error::{not_found, Result, StoreError};
use crate::models::Room;

const ROOM_COLUMNS: &str = "id, kind, name, description, avatar_url, last_message, is_archived,
     is_muted, unread_counts, pinned_messages, created_at, updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new room together with its initial members.
    pub fn create_room(&self, room: &Room) -> Result<()> {
        let tx = self.conn().unchecked_transaction()?;
        tx.execute(
            "INSERT INTO rooms (id, kind, name, description, avatar_url, last_message,
                                is_archived, is_muted, unread_counts, pinned_messages,
                                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                room.id.as_str(),
                room.kind.as_str(),
                room.name,
                room.description,
                room.avatar_url,
                room.last_message
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                room.is_archived,
                room.is_muted,
                serde_json::to_string(&room.unread)?,
                serde_json::to_string(&room.pinned)?,
                ts_to_sql(&room.created_at),
                ts_to_sql(&room.updated_at),
            ],
        )?;
        let joined_at = ts_to_sql(&room.created_at);
        for member in &room.members {
            tx.execute(
                "INSERT OR IGNORE INTO room_users (room_id, user_id, joined_at)
                 VALUES (?1, ?2, ?3)",
                params![room.id.as_str(), member.as_str(), joined_at],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single room with its members.
    pub fn get_room(&self, id: &RoomId) -> Result<Room> {
        let mut room = self
            .conn()
            .query_row(
                &format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = ?1"),
                params![id.as_str()],
                row_to_room,
            )
            .map_err(not_found)?;
        room.members = self.get_room_users(id)?;
        Ok(room)
    }

    /// Rooms the user is a member of, most recently updated first.
    pub fn list_user_rooms(&self, user: &UserId) -> Result<Vec<Room>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {ROOM_COLUMNS}
             FROM rooms
             WHERE id IN (SELECT room_id FROM room_users WHERE user_id = ?1)
             ORDER BY updated_at DESC"
        ))?;

        let rows = stmt.query_map(params![user.as_str()], row_to_room)?;

        let mut rooms = Vec::new();
        for row in rows {
            let mut room = row?;
            room.members = self.get_room_users(&room.id)?;
            rooms.push(room);
        }
        Ok(rooms)
    }

    /// Member ids of a room in join order.
    pub fn get_room_users(&self, room_id: &RoomId) -> Result<Vec<UserId>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id FROM room_users
             WHERE room_id = ?1
             ORDER BY joined_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![room_id.as_str()], |row| {
            row.get::<_, String>(0).map(UserId)
        })?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    pub fn room_exists(&self, id: &RoomId) -> Result<bool> {
        Ok(self
            .conn()
            .query_row(
                "SELECT 1 FROM rooms WHERE id = ?1",
                params![id.as_str()],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Persist the room's own columns. Membership is changed through
    /// [`Database::add_user_to_room`] / [`Database::remove_user_from_room`].
    pub fn update_room(&self, room: &Room) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE rooms
             SET name = ?2, description = ?3, avatar_url = ?4, last_message = ?5,
                 is_archived = ?6, is_muted = ?7, unread_counts = ?8,
                 pinned_messages = ?9, updated_at = ?10
             WHERE id = ?1",
            params![
                room.id.as_str(),
                room.name,
                room.description,
                room.avatar_url,
                room.last_message
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                room.is_archived,
                room.is_muted,
                serde_json::to_string(&room.unread)?,
                serde_json::to_string(&room.pinned)?,
                ts_to_sql(&room.updated_at),
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Returns `false` if the user was already a member.
    pub fn add_user_to_room(&self, room_id: &RoomId, user: &UserId) -> Result<bool> {
        if !self.room_exists(room_id)? {
            return Err(StoreError::NotFound);
        }
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO room_users (room_id, user_id, joined_at)
             VALUES (?1, ?2, ?3)",
            params![room_id.as_str(), user.as_str(), ts_to_sql(&Utc::now())],
        )?;
        Ok(affected > 0)
    }

    /// Returns `false` if the user was not a member.
    pub fn remove_user_from_room(&self, room_id: &RoomId, user: &UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM room_users WHERE room_id = ?1 AND user_id = ?2",
            params![room_id.as_str(), user.as_str()],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a room, its membership and its messages. Returns `true` if a
    /// row was deleted.
    pub fn delete_room(&self, id: &RoomId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM rooms WHERE id = ?1", params![id.as_str()])?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Room`] with an empty member list.
fn row_to_room(row: &rusqlite::Row<'_>) -> rusqlite::Result<Room> {
    let id: String = row.get(0)?;
    let kind_str: String = row.get(1)?;
    let last_message: Option<String> = row.get(5)?;
    let unread_json: String = row.get(8)?;
    let pinned_json: String = row.get(9)?;
    let created_str: String = row.get(10)?;
    let updated_str: String = row.get(11)?;

    let kind: RoomKind = kind_str.parse().map_err(|e| conversion_error(1, e))?;
    let last_message = last_message
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| conversion_error(5, e))?;
    let unread = serde_json::from_str(&unread_json).map_err(|e| conversion_error(8, e))?;
    let pinned = serde_json::from_str(&pinned_json).map_err(|e| conversion_error(9, e))?;

    Ok(Room {
        id: RoomId(id),
        kind,
        name: row.get(2)?,
        description: row.get(3)?,
        avatar_url: row.get(4)?,
        members: Vec::new(),
        last_message,
        is_archived: row.get(6)?,
        is_muted: row.get(7)?,
        unread,
        pinned,
        created_at: ts_from_sql(10, &created_str)?,
        updated_at: ts_from_sql(11, &updated_str)?,
    })
}

#[cfg(test)]
mod tests {
    use huddle_shared::{Envelope, MessageKind};

    use super::*;
    use crate::error::OptionalExt;

    fn user(id: &str) -> UserId {
        UserId::from(id)
    }

    #[test]
    fn create_and_get_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let mut room = Room::group("team", vec![user("u1"), user("u2")]);
        room.description = "planning".into();
        room.unread.insert(user("u2"), 3);
        db.create_room(&room).unwrap();

        let loaded = db.get_room(&room.id).unwrap();
        assert_eq!(loaded.name, "team");
        assert_eq!(loaded.description, "planning");
        assert_eq!(loaded.members, vec![user("u1"), user("u2")]);
        assert_eq!(loaded.unread_for(&user("u2")), 3);
        assert_eq!(loaded.kind, RoomKind::Group);
    }

    #[test]
    fn missing_room_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let missing = db.get_room(&RoomId::from("nope"));
        assert!(matches!(missing, Err(StoreError::NotFound)));
        assert!(db.get_room(&RoomId::from("nope")).optional().unwrap().is_none());
    }

    #[test]
    fn update_persists_flags_pins_and_last_message() {
        let db = Database::open_in_memory().unwrap();
        let mut room = Room::direct(&user("a"), &user("b"));
        db.create_room(&room).unwrap();

        let pinned = uuid::Uuid::new_v4();
        room.is_archived = true;
        room.is_muted = true;
        room.pin(pinned);
        room.last_message = Some(Envelope::new(MessageKind::Text).with_content("hi"));
        room.touch();
        db.update_room(&room).unwrap();

        let loaded = db.get_room(&room.id).unwrap();
        assert!(loaded.is_archived);
        assert!(loaded.is_muted);
        assert_eq!(loaded.pinned, vec![pinned]);
        assert_eq!(
            loaded.last_message.and_then(|m| m.content).as_deref(),
            Some("hi")
        );
    }

    #[test]
    fn update_unknown_room_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let room = Room::group("ghost", vec![user("u1")]);
        assert!(matches!(db.update_room(&room), Err(StoreError::NotFound)));
    }

    #[test]
    fn membership_changes_are_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let room = Room::group("team", vec![user("u1")]);
        db.create_room(&room).unwrap();

        assert!(db.add_user_to_room(&room.id, &user("u2")).unwrap());
        assert!(!db.add_user_to_room(&room.id, &user("u2")).unwrap());
        assert_eq!(db.get_room_users(&room.id).unwrap().len(), 2);

        assert!(db.remove_user_from_room(&room.id, &user("u2")).unwrap());
        assert!(!db.remove_user_from_room(&room.id, &user("u2")).unwrap());
        assert!(matches!(
            db.add_user_to_room(&RoomId::from("nope"), &user("u2")),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn list_user_rooms_filters_by_membership() {
        let db = Database::open_in_memory().unwrap();
        db.create_room(&Room::group("a", vec![user("u1"), user("u2")]))
            .unwrap();
        db.create_room(&Room::group("b", vec![user("u2")])).unwrap();
        db.create_room(&Room::direct(&user("u1"), &user("u3")))
            .unwrap();

        assert_eq!(db.list_user_rooms(&user("u1")).unwrap().len(), 2);
        assert_eq!(db.list_user_rooms(&user("u2")).unwrap().len(), 2);
        assert!(db.list_user_rooms(&user("u4")).unwrap().is_empty());
    }

    #[test]
    fn delete_room_cascades_membership() {
        let db = Database::open_in_memory().unwrap();
        let room = Room::group("team", vec![user("u1")]);
        db.create_room(&room).unwrap();

        assert!(db.delete_room(&room.id).unwrap());
        assert!(!db.delete_room(&room.id).unwrap());
        assert!(db.get_room_users(&room.id).unwrap().is_empty());
    }
}
