//! Public messaging operations.
//!
//! Every mutation is persisted through the [`ChatRepository`] first, then
//! mirrored into the hub cache, then routed to live connections. Every
//! command that writes the room cache (including read-through loads) is sent
//! while holding `room_lock`, so the hub sees room snapshots in the same
//! order they were persisted and concurrent calls cannot lose unread counter
//! or pin updates.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use huddle_shared::{
    DeliveryStatus, Envelope, MessageContent, MessageKind, NotificationKind, RoomId, RoomKind,
    UserId,
};
use huddle_store::{
    ChatMessage, ChatRepository, MessageStatusRecord, Notification, OptionalExt, Room,
};

use crate::config::RoomLookup;
use crate::error::ServerError;
use crate::hub::HubHandle;

type Result<T> = std::result::Result<T, ServerError>;

/// Page size policy for history and notification listings.
#[derive(Debug, Clone, Copy)]
pub struct PageLimits {
    pub default: u32,
    pub max: u32,
}

impl PageLimits {
    fn clamp(&self, limit: u32) -> u32 {
        if limit == 0 {
            self.default
        } else {
            limit.min(self.max)
        }
    }
}

/// Live members of a room and the users currently viewing it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RoomPresence {
    pub online: Vec<UserId>,
    pub viewing: Vec<UserId>,
}

pub struct MessagingService {
    repo: Arc<dyn ChatRepository>,
    hub: HubHandle,
    lookup: RoomLookup,
    limits: PageLimits,
    room_lock: Mutex<()>,
}

fn require(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ServerError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn require_member(room: Room, user: &UserId) -> Result<Room> {
    if !room.is_member(user) {
        return Err(ServerError::UserNotInRoom {
            room: room.id,
            user: user.clone(),
        });
    }
    Ok(room)
}

/// A room found under a direct id must be the direct room of both users.
fn direct_pair(room: Room, a: &UserId, b: &UserId) -> Result<Room> {
    if room.kind != RoomKind::Direct {
        return Err(ServerError::BadRequest(format!(
            "room {} is not a direct room",
            room.id
        )));
    }
    require_member(require_member(room, a)?, b)
}

impl MessagingService {
    pub fn new(
        repo: Arc<dyn ChatRepository>,
        hub: HubHandle,
        lookup: RoomLookup,
        limits: PageLimits,
    ) -> Self {
        Self {
            repo,
            hub,
            lookup,
            limits,
            room_lock: Mutex::new(()),
        }
    }

    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    // ------------------------------------------------------------------
    // Room resolution
    // ------------------------------------------------------------------

    /// Find a room in the hub cache, falling back to storage under the
    /// read-through policy. The caller holds `room_lock`.
    async fn resolve_room(&self, room_id: &RoomId) -> Result<Room> {
        if let Some(room) = self.hub.room(room_id).await? {
            return Ok(room);
        }
        if self.lookup == RoomLookup::CacheOnly {
            return Err(ServerError::RoomNotFound(room_id.clone()));
        }
        match self.repo.get_room(room_id).optional()? {
            Some(room) => {
                debug!(room = %room_id, "Room loaded from storage");
                self.hub.cache_room(room.clone()).await?;
                Ok(room)
            }
            None => Err(ServerError::RoomNotFound(room_id.clone())),
        }
    }

    async fn resolve_member_room(&self, room_id: &RoomId, user: &UserId) -> Result<Room> {
        require_member(self.resolve_room(room_id).await?, user)
    }

    /// Read-only lookup for callers that do not hold `room_lock`. A cache hit
    /// needs no lock; a miss takes it before loading from storage.
    async fn read_room(&self, room_id: &RoomId) -> Result<Room> {
        if let Some(room) = self.hub.room(room_id).await? {
            return Ok(room);
        }
        let _guard = self.room_lock.lock().await;
        self.resolve_room(room_id).await
    }

    async fn read_member_room(&self, room_id: &RoomId, user: &UserId) -> Result<Room> {
        require_member(self.read_room(room_id).await?, user)
    }

    /// Write the room's columns and mirror it into the cache.
    async fn store_room(&self, room: &mut Room) -> Result<()> {
        room.touch();
        self.repo.update_room(room)?;
        self.hub.cache_room(room.clone()).await?;
        Ok(())
    }

    /// Message `message_id` if it belongs to `room_id`.
    fn room_message(&self, room_id: &RoomId, message_id: Uuid) -> Result<ChatMessage> {
        self.repo
            .get_message(message_id)
            .optional()?
            .filter(|m| &m.room_id == room_id)
            .ok_or_else(|| ServerError::MessageNotFound(message_id.to_string()))
    }

    // ------------------------------------------------------------------
    // Rooms
    // ------------------------------------------------------------------

    /// Open the direct room between two users, or return the existing one.
    pub async fn create_direct_room(&self, a: &UserId, b: &UserId) -> Result<Room> {
        require(a.as_str(), "user id")?;
        require(b.as_str(), "user id")?;
        let _guard = self.room_lock.lock().await;
        self.ensure_direct_room(a, b).await
    }

    async fn ensure_direct_room(&self, a: &UserId, b: &UserId) -> Result<Room> {
        let room_id = RoomId::direct(a, b);
        if let Some(room) = self.hub.room(&room_id).await? {
            return direct_pair(room, a, b);
        }
        let room = match self.repo.get_room(&room_id).optional()? {
            Some(room) => direct_pair(room, a, b)?,
            None => {
                let room = Room::direct(a, b);
                self.repo.create_room(&room)?;
                info!(room = %room.id, "Direct room created");
                room
            }
        };
        self.hub.cache_room(room.clone()).await?;
        Ok(room)
    }

    pub async fn create_group_room(
        &self,
        name: &str,
        members: impl IntoIterator<Item = UserId>,
    ) -> Result<Room> {
        let room = Room::group(name.trim(), members.into_iter().filter(|m| !m.is_empty()));
        if room.members.is_empty() {
            return Err(ServerError::BadRequest(
                "a group room needs at least one member".into(),
            ));
        }
        self.repo.create_room(&room)?;
        let _guard = self.room_lock.lock().await;
        self.hub.cache_room(room.clone()).await?;
        info!(room = %room.id, members = room.members.len(), "Group room created");
        Ok(room)
    }

    pub async fn join_room(&self, room_id: &RoomId, user: &UserId) -> Result<Room> {
        require(user.as_str(), "user id")?;
        let _guard = self.room_lock.lock().await;
        let mut room = self.resolve_room(room_id).await?;
        if room.add_member(user.clone()) {
            self.repo.add_user_to_room(room_id, user)?;
            self.store_room(&mut room).await?;
            info!(room = %room_id, user = %user, "User joined room");
        }
        Ok(room)
    }

    pub async fn leave_room(&self, room_id: &RoomId, user: &UserId) -> Result<()> {
        let _guard = self.room_lock.lock().await;
        let mut room = self.resolve_room(room_id).await?;
        if !room.remove_member(user) {
            return Err(ServerError::UserNotInRoom {
                room: room_id.clone(),
                user: user.clone(),
            });
        }
        self.repo.remove_user_from_room(room_id, user)?;
        room.touch();
        self.repo.update_room(&room)?;
        if room.members.is_empty() {
            self.hub.evict_room(room_id.clone()).await?;
        } else {
            self.hub.cache_room(room).await?;
        }
        info!(room = %room_id, user = %user, "User left room");
        Ok(())
    }

    pub async fn list_rooms(&self, user: &UserId) -> Result<Vec<Room>> {
        Ok(self.repo.list_user_rooms(user)?)
    }

    pub async fn get_room(&self, room_id: &RoomId, user: &UserId) -> Result<Room> {
        self.read_member_room(room_id, user).await
    }

    pub async fn archive_room(&self, room_id: &RoomId, user: &UserId) -> Result<Room> {
        self.set_room_flags(room_id, user, |room| room.is_archived = true)
            .await
    }

    pub async fn unarchive_room(&self, room_id: &RoomId, user: &UserId) -> Result<Room> {
        self.set_room_flags(room_id, user, |room| room.is_archived = false)
            .await
    }

    pub async fn mute_room(&self, room_id: &RoomId, user: &UserId) -> Result<Room> {
        self.set_room_flags(room_id, user, |room| room.is_muted = true)
            .await
    }

    pub async fn unmute_room(&self, room_id: &RoomId, user: &UserId) -> Result<Room> {
        self.set_room_flags(room_id, user, |room| room.is_muted = false)
            .await
    }

    async fn set_room_flags(
        &self,
        room_id: &RoomId,
        user: &UserId,
        apply: impl FnOnce(&mut Room),
    ) -> Result<Room> {
        let _guard = self.room_lock.lock().await;
        let mut room = self.resolve_member_room(room_id, user).await?;
        apply(&mut room);
        self.store_room(&mut room).await?;
        debug!(
            room = %room_id,
            user = %user,
            archived = room.is_archived,
            muted = room.is_muted,
            "Room flags updated"
        );
        Ok(room)
    }

    /// Overwrite name, description and avatar with whichever are non-empty.
    pub async fn update_room_info(
        &self,
        room_id: &RoomId,
        name: Option<&str>,
        description: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<Room> {
        let _guard = self.room_lock.lock().await;
        let mut room = self.resolve_room(room_id).await?;
        let non_empty = |v: Option<&str>| v.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        if let Some(name) = non_empty(name) {
            room.name = name;
        }
        if let Some(description) = non_empty(description) {
            room.description = description;
        }
        if let Some(avatar_url) = non_empty(avatar_url) {
            room.avatar_url = avatar_url;
        }
        self.store_room(&mut room).await?;
        Ok(room)
    }

    pub async fn room_presence(&self, room_id: &RoomId, user: &UserId) -> Result<RoomPresence> {
        let room = self.read_member_room(room_id, user).await?;
        let online_users = self.hub.online_users().await?;
        let online = room
            .members
            .iter()
            .filter(|m| online_users.contains(m))
            .cloned()
            .collect();
        let viewing = self.hub.room_viewers(room_id).await?;
        Ok(RoomPresence { online, viewing })
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Send a text message to `receiver`, opening the direct room on first
    /// use. Only the receiver gets the live copy.
    pub async fn send_direct_message(
        &self,
        sender: &UserId,
        receiver: &UserId,
        body: &str,
    ) -> Result<ChatMessage> {
        require(sender.as_str(), "sender id")?;
        require(receiver.as_str(), "receiver id")?;
        require(body, "content")?;

        let _guard = self.room_lock.lock().await;
        let mut room = self.ensure_direct_room(sender, receiver).await?;
        let message = ChatMessage::new(room.id.clone(), sender.clone(), MessageContent::text(body));
        self.repo.create_message(&message)?;

        let envelope = message.to_envelope().with_target(receiver.clone());
        room.last_message = Some(envelope.clone());
        room.increment_unread_except(sender);
        self.store_room(&mut room).await?;
        self.hub.direct(receiver.clone(), envelope).await?;
        debug!(sender = %sender, receiver = %receiver, message = %message.id, "Direct message sent");
        Ok(message)
    }

    /// Persist a content message in a room and fan it out to the members.
    async fn send_room_message(
        &self,
        room_id: &RoomId,
        sender: &UserId,
        content: MessageContent,
    ) -> Result<ChatMessage> {
        let _guard = self.room_lock.lock().await;
        let mut room = self.resolve_member_room(room_id, sender).await?;
        let message = ChatMessage::new(room_id.clone(), sender.clone(), content);
        self.repo.create_message(&message)?;

        let envelope = message.to_envelope();
        room.last_message = Some(envelope.clone());
        room.increment_unread_except(sender);
        self.store_room(&mut room).await?;
        // Still under the lock, so members see sends in persistence order.
        self.hub.broadcast(envelope).await?;
        debug!(room = %room_id, sender = %sender, kind = %message.kind(), "Room message sent");
        Ok(message)
    }

    pub async fn send_group_message(
        &self,
        room_id: &RoomId,
        sender: &UserId,
        body: &str,
    ) -> Result<ChatMessage> {
        require(body, "content")?;
        self.send_room_message(room_id, sender, MessageContent::text(body))
            .await
    }

    pub async fn send_file_message(
        &self,
        room_id: &RoomId,
        sender: &UserId,
        url: &str,
        name: &str,
        size: i64,
        file_type: &str,
    ) -> Result<ChatMessage> {
        require(url, "file_url")?;
        let content = MessageContent::File {
            url: url.to_string(),
            name: name.to_string(),
            size,
            file_type: file_type.to_string(),
        };
        self.send_room_message(room_id, sender, content).await
    }

    pub async fn send_image_message(
        &self,
        room_id: &RoomId,
        sender: &UserId,
        url: &str,
        thumbnail_url: Option<&str>,
    ) -> Result<ChatMessage> {
        require(url, "file_url")?;
        let content = MessageContent::Image {
            url: url.to_string(),
            thumbnail_url: thumbnail_url.filter(|t| !t.is_empty()).map(String::from),
        };
        self.send_room_message(room_id, sender, content).await
    }

    pub async fn send_video_message(
        &self,
        room_id: &RoomId,
        sender: &UserId,
        url: &str,
        thumbnail_url: Option<&str>,
        duration: i64,
    ) -> Result<ChatMessage> {
        require(url, "file_url")?;
        let content = MessageContent::Video {
            url: url.to_string(),
            thumbnail_url: thumbnail_url.filter(|t| !t.is_empty()).map(String::from),
            duration,
        };
        self.send_room_message(room_id, sender, content).await
    }

    pub async fn send_audio_message(
        &self,
        room_id: &RoomId,
        sender: &UserId,
        url: &str,
        duration: i64,
    ) -> Result<ChatMessage> {
        require(url, "file_url")?;
        let content = MessageContent::Audio {
            url: url.to_string(),
            duration,
        };
        self.send_room_message(room_id, sender, content).await
    }

    /// Dispatch an already-typed payload, as decoded from an HTTP request.
    pub async fn send_content(
        &self,
        room_id: &RoomId,
        sender: &UserId,
        content: MessageContent,
    ) -> Result<ChatMessage> {
        match content {
            MessageContent::Text { body } => self.send_group_message(room_id, sender, &body).await,
            MessageContent::File {
                url,
                name,
                size,
                file_type,
            } => {
                self.send_file_message(room_id, sender, &url, &name, size, &file_type)
                    .await
            }
            MessageContent::Image { url, thumbnail_url } => {
                self.send_image_message(room_id, sender, &url, thumbnail_url.as_deref())
                    .await
            }
            MessageContent::Video {
                url,
                thumbnail_url,
                duration,
            } => {
                self.send_video_message(room_id, sender, &url, thumbnail_url.as_deref(), duration)
                    .await
            }
            MessageContent::Audio { url, duration } => {
                self.send_audio_message(room_id, sender, &url, duration)
                    .await
            }
        }
    }

    /// Ephemeral; nothing is stored.
    pub async fn send_typing_indicator(&self, room_id: &RoomId, user: &UserId) -> Result<()> {
        self.read_member_room(room_id, user).await?;
        let envelope = Envelope::new(MessageKind::Typing)
            .with_room(room_id.clone())
            .with_user(user.clone());
        self.hub.broadcast(envelope).await?;
        Ok(())
    }

    /// Record a read receipt, zero the reader's unread counter and tell the
    /// room.
    pub async fn mark_message_as_read(
        &self,
        room_id: &RoomId,
        user: &UserId,
        message_id: Uuid,
    ) -> Result<()> {
        let _guard = self.room_lock.lock().await;
        let mut room = self.resolve_member_room(room_id, user).await?;
        self.room_message(room_id, message_id)?;

        self.repo.update_message_status(&MessageStatusRecord::new(
            message_id,
            user.clone(),
            DeliveryStatus::Read,
        ))?;
        room.reset_unread(user);
        self.store_room(&mut room).await?;

        let mut receipt = Envelope::new(MessageKind::Read)
            .with_room(room_id.clone())
            .with_user(user.clone());
        receipt.message_id = Some(message_id.to_string());
        receipt.status = Some(DeliveryStatus::Read);
        self.hub.broadcast(receipt).await?;
        Ok(())
    }

    /// Pinning an already-pinned message is a no-op.
    pub async fn pin_message(&self, room_id: &RoomId, message_id: Uuid) -> Result<Room> {
        let _guard = self.room_lock.lock().await;
        let mut room = self.resolve_room(room_id).await?;
        self.room_message(room_id, message_id)?;
        if room.pin(message_id) {
            self.store_room(&mut room).await?;
            debug!(room = %room_id, message = %message_id, "Message pinned");
        }
        Ok(room)
    }

    /// Unpinning a message that is not pinned is a no-op.
    pub async fn unpin_message(&self, room_id: &RoomId, message_id: Uuid) -> Result<Room> {
        let _guard = self.room_lock.lock().await;
        let mut room = self.resolve_room(room_id).await?;
        if room.unpin(&message_id) {
            self.store_room(&mut room).await?;
            debug!(room = %room_id, message = %message_id, "Message unpinned");
        }
        Ok(room)
    }

    /// A page of the room's history, newest first.
    pub async fn get_room_history(
        &self,
        room_id: &RoomId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Envelope>> {
        self.read_room(room_id).await?;
        let messages = self
            .repo
            .get_room_messages(room_id, self.limits.clamp(limit), offset)?;
        Ok(messages.iter().map(ChatMessage::to_envelope).collect())
    }

    pub async fn get_unread_count(&self, room_id: &RoomId, user: &UserId) -> Result<u32> {
        Ok(self.read_room(room_id).await?.unread_for(user))
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    async fn notify(&self, notification: Notification) -> Result<Notification> {
        self.repo.create_notification(&notification)?;
        self.hub
            .direct(notification.user_id.clone(), notification.to_envelope())
            .await?;
        debug!(
            user = %notification.user_id,
            kind = notification.kind.as_str(),
            "Notification sent"
        );
        Ok(notification)
    }

    pub async fn send_task_update_notification(
        &self,
        user: &UserId,
        task_id: &str,
        task_title: &str,
        task_status: &str,
    ) -> Result<Notification> {
        self.notify(Notification::new(
            user.clone(),
            NotificationKind::TaskUpdate,
            "Task Update",
            format!("{} status changed to {}", task_title, task_status),
            Some(json!({
                "task_id": task_id,
                "task_title": task_title,
                "task_status": task_status,
            })),
        ))
        .await
    }

    pub async fn send_mention_notification(
        &self,
        user: &UserId,
        sender: &UserId,
        content: &str,
    ) -> Result<Notification> {
        self.notify(Notification::new(
            user.clone(),
            NotificationKind::Mention,
            "You were mentioned",
            content,
            Some(json!({ "sender_id": sender })),
        ))
        .await
    }

    pub async fn send_system_notification(
        &self,
        user: &UserId,
        title: &str,
        content: &str,
    ) -> Result<Notification> {
        self.notify(Notification::new(
            user.clone(),
            NotificationKind::System,
            title,
            content,
            None,
        ))
        .await
    }

    /// Push a task update to every connected user. Not stored.
    pub async fn broadcast_task_update(
        &self,
        task_id: &str,
        task_title: &str,
        task_status: &str,
    ) -> Result<()> {
        let envelope = Envelope::new(MessageKind::TaskUpdate)
            .with_id(task_id)
            .with_content(format!("{} status changed to {}", task_title, task_status));
        self.hub.broadcast(envelope).await?;
        Ok(())
    }

    /// Mark one of `user`'s notifications as read. Notifications of other
    /// users are reported as not found.
    pub async fn mark_notification_as_read(&self, user: &UserId, id: Uuid) -> Result<()> {
        let not_found = || ServerError::NotificationNotFound(id.to_string());
        let notification = self.repo.get_notification(id).optional()?.ok_or_else(not_found)?;
        if &notification.user_id != user {
            return Err(not_found());
        }
        self.repo.mark_notification_as_read(id)?;
        Ok(())
    }

    pub async fn get_unread_notification_count(&self, user: &UserId) -> Result<u32> {
        Ok(self.repo.count_unread_notifications(user)?)
    }

    pub async fn list_notifications(
        &self,
        user: &UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Notification>> {
        Ok(self
            .repo
            .list_user_notifications(user, self.limits.clamp(limit), offset)?)
    }
}
