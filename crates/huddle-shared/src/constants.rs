/// Separator between the two user ids of a direct room id
pub const DIRECT_ROOM_SEPARATOR: char = '_';

/// Maximum accepted size of a single inbound text frame (256 KiB)
pub const MAX_FRAME_SIZE: usize = 262_144;

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default capacity of a connection's outbound queue
pub const DEFAULT_OUTBOUND_QUEUE: usize = 256;

/// Default capacity of the hub command queue
pub const DEFAULT_HUB_QUEUE: usize = 1024;

/// Default page size for room history
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Upper bound for a room history page
pub const MAX_HISTORY_LIMIT: u32 = 200;

/// WebSocket close code sent when the auth token has expired
pub const CLOSE_TOKEN_EXPIRED: u16 = 4001;

/// WebSocket close code sent when the auth token is invalid
pub const CLOSE_TOKEN_INVALID: u16 = 4002;
