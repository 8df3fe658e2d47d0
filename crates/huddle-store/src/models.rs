//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! straight to the HTTP layer.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use huddle_shared::{
    DeliveryStatus, Envelope, MessageContent, MessageKind, NotificationKind, RoomId, RoomKind,
    UserId,
};

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// A conversation room (direct or group) with its membership and
/// per-user state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Room {
    /// Stable room id. Direct rooms use the sorted user pair.
    pub id: RoomId,
    pub kind: RoomKind,
    pub name: String,
    pub description: String,
    pub avatar_url: String,
    /// Members, without duplicates. Stored in `room_users`.
    pub members: Vec<UserId>,
    /// Snapshot of the most recent content message.
    pub last_message: Option<Envelope>,
    pub is_archived: bool,
    pub is_muted: bool,
    /// Unread message counters keyed by user.
    pub unread: HashMap<UserId, u32>,
    /// Pinned message ids in pin order.
    pub pinned: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    /// The direct room between two users. Its id does not depend on the
    /// argument order.
    pub fn direct(a: &UserId, b: &UserId) -> Self {
        let mut room = Self::empty(RoomId::direct(a, b), RoomKind::Direct, String::new());
        room.add_member(a.clone());
        room.add_member(b.clone());
        room
    }

    /// A new group room with a random id. Duplicate members are collapsed.
    pub fn group(name: impl Into<String>, members: impl IntoIterator<Item = UserId>) -> Self {
        let mut room = Self::empty(RoomId::new(), RoomKind::Group, name.into());
        for member in members {
            room.add_member(member);
        }
        room
    }

    fn empty(id: RoomId, kind: RoomKind, name: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            name,
            description: String::new(),
            avatar_url: String::new(),
            members: Vec::new(),
            last_message: None,
            is_archived: false,
            is_muted: false,
            unread: HashMap::new(),
            pinned: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_member(&self, user: &UserId) -> bool {
        self.members.contains(user)
    }

    /// Returns `false` if the user was already a member.
    pub fn add_member(&mut self, user: UserId) -> bool {
        if self.is_member(&user) {
            return false;
        }
        self.members.push(user);
        true
    }

    /// Returns `false` if the user was not a member.
    pub fn remove_member(&mut self, user: &UserId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != user);
        self.unread.remove(user);
        self.members.len() != before
    }

    /// Returns `false` if the message was already pinned.
    pub fn pin(&mut self, message_id: Uuid) -> bool {
        if self.pinned.contains(&message_id) {
            return false;
        }
        self.pinned.push(message_id);
        true
    }

    /// Returns `false` if the message was not pinned.
    pub fn unpin(&mut self, message_id: &Uuid) -> bool {
        let before = self.pinned.len();
        self.pinned.retain(|m| m != message_id);
        self.pinned.len() != before
    }

    /// Bump the unread counter of every member except `sender`.
    pub fn increment_unread_except(&mut self, sender: &UserId) {
        for member in &self.members {
            if member != sender {
                *self.unread.entry(member.clone()).or_insert(0) += 1;
            }
        }
    }

    pub fn unread_for(&self, user: &UserId) -> u32 {
        self.unread.get(user).copied().unwrap_or(0)
    }

    /// Zero one user's counter, leaving the others alone.
    pub fn reset_unread(&mut self, user: &UserId) {
        self.unread.insert(user.clone(), 0);
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A stored room message. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub content: MessageContent,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(room_id: RoomId, sender_id: UserId, content: MessageContent) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            room_id,
            sender_id,
            content,
            status: DeliveryStatus::Sent,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.content.kind()
    }

    /// Wire form of the message as pushed to clients and returned by history.
    pub fn to_envelope(&self) -> Envelope {
        let mut envelope = Envelope::new(self.kind())
            .with_id(self.id.to_string())
            .with_room(self.room_id.clone())
            .with_user(self.sender_id.clone());
        self.content.apply_to(&mut envelope);
        envelope.status = Some(self.status);
        envelope.timestamp = Some(self.created_at);
        envelope
    }
}

// ---------------------------------------------------------------------------
// Message status
// ---------------------------------------------------------------------------

/// Delivery status of one message for one recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageStatusRecord {
    pub id: Uuid,
    pub message_id: Uuid,
    pub user_id: UserId,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageStatusRecord {
    pub fn new(message_id: Uuid, user_id: UserId, status: DeliveryStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            message_id,
            user_id,
            status,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// A per-user notification. Not tied to any room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub content: String,
    /// Structured payload, e.g. the task id and status of a task update.
    pub data: Option<serde_json::Value>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        content: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            title: title.into(),
            content: content.into(),
            data,
            is_read: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Envelope pushed to the target user's live connection.
    pub fn to_envelope(&self) -> Envelope {
        let mut envelope = Envelope::new(self.kind.message_kind())
            .with_id(self.id.to_string())
            .with_target(self.user_id.clone())
            .with_content(self.content.clone());
        envelope.timestamp = Some(self.created_at);
        envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::from(id)
    }

    #[test]
    fn group_members_are_deduplicated() {
        let room = Room::group("team", vec![user("u1"), user("u2"), user("u1")]);
        assert_eq!(room.members, vec![user("u1"), user("u2")]);
        assert_eq!(room.kind, RoomKind::Group);
    }

    #[test]
    fn join_leave_never_duplicates() {
        let mut room = Room::group("team", vec![user("u1")]);
        assert!(room.add_member(user("u2")));
        assert!(!room.add_member(user("u2")));
        assert!(room.remove_member(&user("u2")));
        assert!(!room.remove_member(&user("u2")));
        assert!(room.add_member(user("u2")));
        assert_eq!(room.members, vec![user("u1"), user("u2")]);
    }

    #[test]
    fn pin_and_unpin_are_idempotent() {
        let mut room = Room::direct(&user("a"), &user("b"));
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        assert!(room.pin(first));
        assert!(room.pin(second));
        assert!(!room.pin(first));
        assert_eq!(room.pinned, vec![first, second]);

        assert!(!room.unpin(&Uuid::new_v4()));
        assert!(room.unpin(&first));
        assert_eq!(room.pinned, vec![second]);
    }

    #[test]
    fn unread_reset_touches_only_one_user() {
        let mut room = Room::group("team", vec![user("u1"), user("u2"), user("u3")]);
        room.increment_unread_except(&user("u1"));
        room.increment_unread_except(&user("u1"));
        assert_eq!(room.unread_for(&user("u1")), 0);
        assert_eq!(room.unread_for(&user("u2")), 2);

        room.reset_unread(&user("u2"));
        assert_eq!(room.unread_for(&user("u2")), 0);
        assert_eq!(room.unread_for(&user("u3")), 2);
    }

    #[test]
    fn message_envelope_carries_payload() {
        let msg = ChatMessage::new(
            RoomId::from("r1"),
            user("u1"),
            MessageContent::Audio {
                url: "https://cdn/a.ogg".into(),
                duration: 7,
            },
        );
        let env = msg.to_envelope();
        assert_eq!(env.kind, MessageKind::Audio);
        assert_eq!(env.id, Some(msg.id.to_string()));
        assert_eq!(env.file_url.as_deref(), Some("https://cdn/a.ogg"));
        assert_eq!(env.duration, Some(7));
        assert_eq!(env.status, Some(DeliveryStatus::Sent));
    }

    #[test]
    fn notification_targets_its_user() {
        let n = Notification::new(user("u9"), NotificationKind::Mention, "Mention", "hey", None);
        let env = n.to_envelope();
        assert_eq!(env.kind, MessageKind::Mention);
        assert_eq!(env.target_id, Some(user("u9")));
        assert_eq!(env.room_id, None);
    }
}
