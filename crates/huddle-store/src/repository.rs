//! The persistence seam used by the messaging service.

use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use huddle_shared::{RoomId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{ChatMessage, MessageStatusRecord, Notification, Room};

/// Storage operations the hub service needs. Lookups of missing records
/// return [`StoreError::NotFound`].
pub trait ChatRepository: Send + Sync {
    fn create_room(&self, room: &Room) -> Result<()>;
    fn get_room(&self, id: &RoomId) -> Result<Room>;
    fn update_room(&self, room: &Room) -> Result<()>;
    fn delete_room(&self, id: &RoomId) -> Result<bool>;
    fn list_user_rooms(&self, user: &UserId) -> Result<Vec<Room>>;
    fn add_user_to_room(&self, room: &RoomId, user: &UserId) -> Result<bool>;
    fn remove_user_from_room(&self, room: &RoomId, user: &UserId) -> Result<bool>;
    fn get_room_users(&self, room: &RoomId) -> Result<Vec<UserId>>;

    fn create_message(&self, message: &ChatMessage) -> Result<()>;
    fn get_message(&self, id: Uuid) -> Result<ChatMessage>;
    fn get_room_messages(&self, room: &RoomId, limit: u32, offset: u32)
        -> Result<Vec<ChatMessage>>;
    fn update_message_status(&self, record: &MessageStatusRecord) -> Result<()>;
    fn get_message_status(&self, message_id: Uuid, user: &UserId) -> Result<MessageStatusRecord>;

    fn create_notification(&self, notification: &Notification) -> Result<()>;
    fn get_notification(&self, id: Uuid) -> Result<Notification>;
    fn list_user_notifications(
        &self,
        user: &UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Notification>>;
    fn mark_notification_as_read(&self, id: Uuid) -> Result<()>;
    fn count_unread_notifications(&self, user: &UserId) -> Result<u32>;
}

/// A [`Database`] behind a mutex, shareable across tasks.
pub struct SharedDatabase {
    inner: Mutex<Database>,
}

impl SharedDatabase {
    pub fn new(db: Database) -> Self {
        Self {
            inner: Mutex::new(db),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl ChatRepository for SharedDatabase {
    fn create_room(&self, room: &Room) -> Result<()> {
        self.lock()?.create_room(room)
    }

    fn get_room(&self, id: &RoomId) -> Result<Room> {
        self.lock()?.get_room(id)
    }

    fn update_room(&self, room: &Room) -> Result<()> {
        self.lock()?.update_room(room)
    }

    fn delete_room(&self, id: &RoomId) -> Result<bool> {
        self.lock()?.delete_room(id)
    }

    fn list_user_rooms(&self, user: &UserId) -> Result<Vec<Room>> {
        self.lock()?.list_user_rooms(user)
    }

    fn add_user_to_room(&self, room: &RoomId, user: &UserId) -> Result<bool> {
        self.lock()?.add_user_to_room(room, user)
    }

    fn remove_user_from_room(&self, room: &RoomId, user: &UserId) -> Result<bool> {
        self.lock()?.remove_user_from_room(room, user)
    }

    fn get_room_users(&self, room: &RoomId) -> Result<Vec<UserId>> {
        self.lock()?.get_room_users(room)
    }

    fn create_message(&self, message: &ChatMessage) -> Result<()> {
        self.lock()?.create_message(message)
    }

    fn get_message(&self, id: Uuid) -> Result<ChatMessage> {
        self.lock()?.get_message(id)
    }

    fn get_room_messages(
        &self,
        room: &RoomId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChatMessage>> {
        self.lock()?.get_room_messages(room, limit, offset)
    }

    fn update_message_status(&self, record: &MessageStatusRecord) -> Result<()> {
        self.lock()?.update_message_status(record)
    }

    fn get_message_status(&self, message_id: Uuid, user: &UserId) -> Result<MessageStatusRecord> {
        self.lock()?.get_message_status(message_id, user)
    }

    fn create_notification(&self, notification: &Notification) -> Result<()> {
        self.lock()?.create_notification(notification)
    }

    fn get_notification(&self, id: Uuid) -> Result<Notification> {
        self.lock()?.get_notification(id)
    }

    fn list_user_notifications(
        &self,
        user: &UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Notification>> {
        self.lock()?.list_user_notifications(user, limit, offset)
    }

    fn mark_notification_as_read(&self, id: Uuid) -> Result<()> {
        self.lock()?.mark_notification_as_read(id)
    }

    fn count_unread_notifications(&self, user: &UserId) -> Result<u32> {
        self.lock()?.count_unread_notifications(user)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn shared_database_is_usable_as_trait_object() {
        let repo: Arc<dyn ChatRepository> =
            Arc::new(SharedDatabase::new(Database::open_in_memory().unwrap()));
        let room = Room::direct(&UserId::from("a"), &UserId::from("b"));
        repo.create_room(&room).unwrap();

        let loaded = repo.get_room(&room.id).unwrap();
        assert_eq!(loaded.members.len(), 2);
        assert_eq!(repo.list_user_rooms(&UserId::from("b")).unwrap().len(), 1);
    }
}
