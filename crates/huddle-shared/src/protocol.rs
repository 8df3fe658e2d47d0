use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_FRAME_SIZE;
use crate::error::ProtocolError;
use crate::types::{DeliveryStatus, MessageKind, RoomId, UserId};

/// JSON frame exchanged with clients over the WebSocket.
///
/// Every field except `type` is optional; absent and empty fields are left
/// out of the serialized form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeliveryStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Where the hub should deliver an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Fan out to the live members of a room.
    Room(RoomId),
    /// Deliver to a single user.
    Direct(UserId),
    /// Deliver to every connected user (room-less task updates).
    Global,
    /// Nothing to route on.
    Unroutable,
}

impl Envelope {
    /// Empty envelope of the given kind, stamped with the current time.
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            id: None,
            room_id: None,
            user_id: None,
            target_id: None,
            content: None,
            file_url: None,
            file_name: None,
            file_size: None,
            file_type: None,
            thumbnail_url: None,
            duration: None,
            message_id: None,
            status: None,
            timestamp: Some(Utc::now()),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_room(mut self, room_id: RoomId) -> Self {
        self.room_id = Some(room_id);
        self
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_target(mut self, target_id: UserId) -> Self {
        self.target_id = Some(target_id);
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Classify the envelope for delivery.
    ///
    /// A room id wins over a target id. A room-less `task_update` without a
    /// target is a global fan-out.
    pub fn route(&self) -> Route {
        if let Some(room_id) = &self.room_id {
            Route::Room(room_id.clone())
        } else if let Some(target_id) = &self.target_id {
            Route::Direct(target_id.clone())
        } else if self.kind == MessageKind::TaskUpdate {
            Route::Global
        } else {
            Route::Unroutable
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a client frame. Empty identifier strings are treated as absent.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        if text.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: text.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        let mut envelope: Envelope = serde_json::from_str(text)?;
        envelope.normalize();
        Ok(envelope)
    }

    fn normalize(&mut self) {
        if self.room_id.as_ref().is_some_and(|r| r.0.trim().is_empty()) {
            self.room_id = None;
        }
        if self.user_id.as_ref().is_some_and(|u| u.is_empty()) {
            self.user_id = None;
        }
        if self.target_id.as_ref().is_some_and(|u| u.is_empty()) {
            self.target_id = None;
        }
        for field in [
            &mut self.id,
            &mut self.file_url,
            &mut self.file_name,
            &mut self.file_type,
            &mut self.thumbnail_url,
            &mut self.message_id,
        ] {
            if field.as_deref().is_some_and(str::is_empty) {
                *field = None;
            }
        }
    }
}

/// Payload of a stored room message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text {
        body: String,
    },
    File {
        url: String,
        name: String,
        size: i64,
        file_type: String,
    },
    Image {
        url: String,
        thumbnail_url: Option<String>,
    },
    Video {
        url: String,
        thumbnail_url: Option<String>,
        duration: i64,
    },
    Audio {
        url: String,
        duration: i64,
    },
}

impl MessageContent {
    pub fn text(body: impl Into<String>) -> Self {
        MessageContent::Text { body: body.into() }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            MessageContent::Text { .. } => MessageKind::Text,
            MessageContent::File { .. } => MessageKind::File,
            MessageContent::Image { .. } => MessageKind::Image,
            MessageContent::Video { .. } => MessageKind::Video,
            MessageContent::Audio { .. } => MessageKind::Audio,
        }
    }

    /// Short human-readable form of the payload: the body for text, a
    /// bracketed tag such as `[image]` for media.
    pub fn summary(&self) -> String {
        match self {
            MessageContent::Text { body } => body.clone(),
            MessageContent::File { name, .. } => format!("[file] {}", name),
            MessageContent::Image { .. } => "[image]".to_string(),
            MessageContent::Video { .. } => "[video]".to_string(),
            MessageContent::Audio { .. } => "[audio]".to_string(),
        }
    }

    /// Write the type and payload fields onto an envelope.
    pub fn apply_to(&self, envelope: &mut Envelope) {
        envelope.kind = self.kind();
        match self {
            MessageContent::Text { body } => {
                envelope.content = Some(body.clone());
            }
            MessageContent::File {
                url,
                name,
                size,
                file_type,
            } => {
                envelope.file_url = Some(url.clone());
                envelope.file_name = Some(name.clone());
                envelope.file_size = Some(*size);
                envelope.file_type = Some(file_type.clone());
            }
            MessageContent::Image { url, thumbnail_url } => {
                envelope.file_url = Some(url.clone());
                envelope.thumbnail_url = thumbnail_url.clone();
            }
            MessageContent::Video {
                url,
                thumbnail_url,
                duration,
            } => {
                envelope.file_url = Some(url.clone());
                envelope.thumbnail_url = thumbnail_url.clone();
                envelope.duration = Some(*duration);
            }
            MessageContent::Audio { url, duration } => {
                envelope.file_url = Some(url.clone());
                envelope.duration = Some(*duration);
            }
        }
    }

    /// Rebuild the payload from an envelope's type and fields.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        let url = || {
            envelope
                .file_url
                .clone()
                .ok_or(ProtocolError::MissingField("file_url"))
        };
        Ok(match envelope.kind {
            MessageKind::Text => MessageContent::Text {
                body: envelope
                    .content
                    .clone()
                    .ok_or(ProtocolError::MissingField("content"))?,
            },
            MessageKind::File => MessageContent::File {
                url: url()?,
                name: envelope.file_name.clone().unwrap_or_default(),
                size: envelope.file_size.unwrap_or(0),
                file_type: envelope.file_type.clone().unwrap_or_default(),
            },
            MessageKind::Image => MessageContent::Image {
                url: url()?,
                thumbnail_url: envelope.thumbnail_url.clone(),
            },
            MessageKind::Video => MessageContent::Video {
                url: url()?,
                thumbnail_url: envelope.thumbnail_url.clone(),
                duration: envelope.duration.unwrap_or(0),
            },
            MessageKind::Audio => MessageContent::Audio {
                url: url()?,
                duration: envelope.duration.unwrap_or(0),
            },
            other => return Err(ProtocolError::NotContent(other.to_string())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_fields_are_omitted() {
        let env = Envelope::new(MessageKind::Typing)
            .with_room(RoomId::from("r1"))
            .with_user(UserId::from("u1"));
        let json = env.to_json().unwrap();
        assert!(json.contains("\"type\":\"typing\""));
        assert!(json.contains("\"room_id\":\"r1\""));
        assert!(!json.contains("target_id"));
        assert!(!json.contains("file_url"));
    }

    #[test]
    fn decodes_client_frame() {
        let env = Envelope::from_json(
            r#"{"type":"text","room_id":"r1","content":"hello","target_id":""}"#,
        )
        .unwrap();
        assert_eq!(env.kind, MessageKind::Text);
        assert_eq!(env.content.as_deref(), Some("hello"));
        assert_eq!(env.target_id, None);
        assert_eq!(env.timestamp, None);
    }

    #[test]
    fn rejects_garbage_and_unknown_types() {
        assert!(Envelope::from_json("not json").is_err());
        assert!(Envelope::from_json(r#"{"type":"sticker"}"#).is_err());
        assert!(Envelope::from_json(r#"{"content":"no type"}"#).is_err());
    }

    #[test]
    fn rejects_oversized_frame() {
        let big = format!(r#"{{"type":"text","content":"{}"}}"#, "x".repeat(MAX_FRAME_SIZE));
        assert!(matches!(
            Envelope::from_json(&big),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn routing_prefers_room_then_target() {
        let both = Envelope::new(MessageKind::Text)
            .with_room(RoomId::from("r1"))
            .with_target(UserId::from("u2"));
        assert_eq!(both.route(), Route::Room(RoomId::from("r1")));

        let direct = Envelope::new(MessageKind::Text).with_target(UserId::from("u2"));
        assert_eq!(direct.route(), Route::Direct(UserId::from("u2")));

        assert_eq!(Envelope::new(MessageKind::TaskUpdate).route(), Route::Global);
        assert_eq!(Envelope::new(MessageKind::Text).route(), Route::Unroutable);
    }

    #[test]
    fn video_payload_survives_envelope() {
        let content = MessageContent::Video {
            url: "https://cdn/v.mp4".into(),
            thumbnail_url: Some("https://cdn/v.jpg".into()),
            duration: 42,
        };
        let mut env = Envelope::new(MessageKind::Text);
        content.apply_to(&mut env);
        assert_eq!(env.kind, MessageKind::Video);
        assert_eq!(MessageContent::from_envelope(&env).unwrap(), content);
    }

    #[test]
    fn media_without_url_is_invalid() {
        let env = Envelope::new(MessageKind::Image);
        assert!(matches!(
            MessageContent::from_envelope(&env),
            Err(ProtocolError::MissingField("file_url"))
        ));
        let typing = Envelope::new(MessageKind::Typing);
        assert!(MessageContent::from_envelope(&typing).is_err());
    }

    #[test]
    fn summary_tags_media() {
        assert_eq!(MessageContent::text("hi").summary(), "hi");
        let file = MessageContent::File {
            url: "https://cdn/f".into(),
            name: "notes.pdf".into(),
            size: 10,
            file_type: "application/pdf".into(),
        };
        assert_eq!(file.summary(), "[file] notes.pdf");
        let audio = MessageContent::Audio {
            url: "https://cdn/a".into(),
            duration: 3,
        };
        assert_eq!(audio.summary(), "[audio]");
    }
}
