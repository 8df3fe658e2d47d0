//! CRUD operations for [`Notification`] records.

use chrono::Utc;
use rusqlite::params;
use uuid::Uuid;

use huddle_shared::{NotificationKind, UserId};

use crate::database::{conversion_error, ts_from_sql, ts_to_sql, Database};
use crate::error::{not_found, Result, StoreError};
use crate::models::Notification;

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, kind, title, content, data, is_read, created_at, updated_at";

impl Database {
    pub fn create_notification(&self, notification: &Notification) -> Result<()> {
        self.conn().execute(
            "INSERT INTO notifications (id, user_id, kind, title, content, data, is_read,
                                        created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                notification.id.to_string(),
                notification.user_id.as_str(),
                notification.kind.as_str(),
                notification.title,
                notification.content,
                notification
                    .data
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                notification.is_read,
                ts_to_sql(&notification.created_at),
                ts_to_sql(&notification.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_notification(&self, id: Uuid) -> Result<Notification> {
        self.conn()
            .query_row(
                &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1"),
                params![id.to_string()],
                row_to_notification,
            )
            .map_err(not_found)
    }

    /// A user's notifications, newest first.
    pub fn list_user_notifications(
        &self,
        user: &UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Notification>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {NOTIFICATION_COLUMNS}
             FROM notifications
             WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2 OFFSET ?3"
        ))?;

        let rows = stmt.query_map(params![user.as_str(), limit, offset], row_to_notification)?;

        let mut notifications = Vec::new();
        for row in rows {
            notifications.push(row?);
        }
        Ok(notifications)
    }

    pub fn mark_notification_as_read(&self, id: Uuid) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE notifications SET is_read = 1, updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), ts_to_sql(&Utc::now())],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn count_unread_notifications(&self, user: &UserId) -> Result<u32> {
        let count: u32 = self.conn().query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
            params![user.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    let id_str: String = row.get(0)?;
    let kind_str: String = row.get(2)?;
    let data_str: Option<String> = row.get(5)?;
    let created_str: String = row.get(7)?;
    let updated_str: String = row.get(8)?;

    let kind: NotificationKind = kind_str.parse().map_err(|e| conversion_error(2, e))?;
    let data = data_str
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| conversion_error(5, e))?;

    Ok(Notification {
        id: Uuid::parse_str(&id_str).map_err(|e| conversion_error(0, e))?,
        user_id: UserId(row.get(1)?),
        kind,
        title: row.get(3)?,
        content: row.get(4)?,
        data,
        is_read: row.get(6)?,
        created_at: ts_from_sql(7, &created_str)?,
        updated_at: ts_from_sql(8, &updated_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unread_count_follows_mark_read() {
        let db = Database::open_in_memory().unwrap();
        let user = UserId::from("u1");
        let first = Notification::new(
            user.clone(),
            NotificationKind::TaskUpdate,
            "Task updated",
            "Task 'Ship' is now done",
            Some(serde_json::json!({ "task_id": "t1", "status": "done" })),
        );
        let second = Notification::new(user.clone(), NotificationKind::System, "Hi", "welcome", None);
        db.create_notification(&first).unwrap();
        db.create_notification(&second).unwrap();
        assert_eq!(db.count_unread_notifications(&user).unwrap(), 2);

        db.mark_notification_as_read(first.id).unwrap();
        assert_eq!(db.count_unread_notifications(&user).unwrap(), 1);

        let loaded = db.get_notification(first.id).unwrap();
        assert!(loaded.is_read);
        assert_eq!(loaded.data.unwrap()["task_id"], "t1");
    }

    #[test]
    fn list_is_scoped_to_user() {
        let db = Database::open_in_memory().unwrap();
        for n in 0..3 {
            db.create_notification(&Notification::new(
                UserId::from("u1"),
                NotificationKind::Mention,
                "Mention",
                format!("n{n}"),
                None,
            ))
            .unwrap();
        }
        db.create_notification(&Notification::new(
            UserId::from("u2"),
            NotificationKind::Mention,
            "Mention",
            "other",
            None,
        ))
        .unwrap();

        let listed = db.list_user_notifications(&UserId::from("u1"), 10, 0).unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].content, "n2");
    }

    #[test]
    fn mark_unknown_notification_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.mark_notification_as_read(Uuid::new_v4()),
            Err(StoreError::NotFound)
        ));
    }
}
