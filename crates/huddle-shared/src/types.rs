use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::DIRECT_ROOM_SEPARATOR;
use crate::error::ProtocolError;

// User identity = opaque id issued by the auth layer (JWT `user_id` claim)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Fresh random id for a group room.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Deterministic id for the direct room between two users.
    ///
    /// The pair is sorted first, so `direct(a, b) == direct(b, a)`.
    /// Separators and backslashes inside the ids are escaped, so distinct
    /// pairs never share an id.
    pub fn direct(a: &UserId, b: &UserId) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        let mut id = escape_direct_part(first.as_str());
        id.push(DIRECT_ROOM_SEPARATOR);
        id.push_str(&escape_direct_part(second.as_str()));
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn escape_direct_part(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for c in id.chars() {
        if c == '\\' || c == DIRECT_ROOM_SEPARATOR {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RoomId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Direct,
    Group,
}

impl RoomKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomKind::Direct => "direct",
            RoomKind::Group => "group",
        }
    }
}

impl FromStr for RoomKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(RoomKind::Direct),
            "group" => Ok(RoomKind::Group),
            other => Err(ProtocolError::UnknownVariant {
                kind: "room type",
                value: other.to_string(),
            }),
        }
    }
}

/// The `type` discriminator of a wire envelope.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    File,
    Image,
    Video,
    Audio,
    Typing,
    Read,
    TaskUpdate,
    Mention,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::File => "file",
            MessageKind::Image => "image",
            MessageKind::Video => "video",
            MessageKind::Audio => "audio",
            MessageKind::Typing => "typing",
            MessageKind::Read => "read",
            MessageKind::TaskUpdate => "task_update",
            MessageKind::Mention => "mention",
            MessageKind::System => "system",
        }
    }

    /// Kinds that carry user content and are stored as room messages.
    pub fn is_content(&self) -> bool {
        matches!(
            self,
            MessageKind::Text
                | MessageKind::File
                | MessageKind::Image
                | MessageKind::Video
                | MessageKind::Audio
        )
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "text" => MessageKind::Text,
            "file" => MessageKind::File,
            "image" => MessageKind::Image,
            "video" => MessageKind::Video,
            "audio" => MessageKind::Audio,
            "typing" => MessageKind::Typing,
            "read" => MessageKind::Read,
            "task_update" => MessageKind::TaskUpdate,
            "mention" => MessageKind::Mention,
            "system" => MessageKind::System,
            other => {
                return Err(ProtocolError::UnknownVariant {
                    kind: "message type",
                    value: other.to_string(),
                })
            }
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Read => "read",
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(DeliveryStatus::Sent),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "read" => Ok(DeliveryStatus::Read),
            other => Err(ProtocolError::UnknownVariant {
                kind: "message status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TaskUpdate,
    Mention,
    System,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::TaskUpdate => "task_update",
            NotificationKind::Mention => "mention",
            NotificationKind::System => "system",
        }
    }

    /// Envelope type used when the notification is pushed to a live client.
    pub fn message_kind(&self) -> MessageKind {
        match self {
            NotificationKind::TaskUpdate => MessageKind::TaskUpdate,
            NotificationKind::Mention => MessageKind::Mention,
            NotificationKind::System => MessageKind::System,
        }
    }
}

impl FromStr for NotificationKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task_update" => Ok(NotificationKind::TaskUpdate),
            "mention" => Ok(NotificationKind::Mention),
            "system" => Ok(NotificationKind::System),
            other => Err(ProtocolError::UnknownVariant {
                kind: "notification type",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_room_id_is_symmetric() {
        let a = UserId::from("alice");
        let b = UserId::from("bob");
        assert_eq!(RoomId::direct(&a, &b), RoomId::direct(&b, &a));
        assert_eq!(RoomId::direct(&a, &b).as_str(), "alice_bob");
    }

    #[test]
    fn direct_room_ids_do_not_collide_on_separator() {
        let left = RoomId::direct(&UserId::from("a_b"), &UserId::from("c"));
        let right = RoomId::direct(&UserId::from("a"), &UserId::from("b_c"));
        assert_ne!(left, right);
        assert_eq!(left.as_str(), r"a\_b_c");
        assert_eq!(right.as_str(), r"a_b\_c");

        let slash = RoomId::direct(&UserId::from(r"a\"), &UserId::from("b"));
        let plain = RoomId::direct(&UserId::from("a"), &UserId::from(r"\b"));
        assert_ne!(slash, plain);
    }

    #[test]
    fn group_room_ids_are_unique() {
        assert_ne!(RoomId::new(), RoomId::new());
    }

    #[test]
    fn message_kind_wire_names() {
        for kind in [
            MessageKind::Text,
            MessageKind::Typing,
            MessageKind::TaskUpdate,
            MessageKind::System,
        ] {
            assert_eq!(kind.as_str().parse::<MessageKind>().unwrap(), kind);
        }
        assert_eq!(
            serde_json::to_string(&MessageKind::TaskUpdate).unwrap(),
            "\"task_update\""
        );
        assert!("sticker".parse::<MessageKind>().is_err());
    }

    #[test]
    fn only_payload_kinds_are_content() {
        assert!(MessageKind::Audio.is_content());
        assert!(!MessageKind::Typing.is_content());
        assert!(!MessageKind::Read.is_content());
        assert!(!MessageKind::Mention.is_content());
    }
}
