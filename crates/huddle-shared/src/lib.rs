//! # huddle-shared
//!
//! Types shared by the hub server and its storage layer: user and room
//! identifiers, the domain enums (room kind, message kind, delivery status,
//! notification kind) and the JSON wire envelope exchanged with clients.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use protocol::{Envelope, MessageContent, Route};
pub use types::{DeliveryStatus, MessageKind, NotificationKind, RoomId, RoomKind, UserId};
