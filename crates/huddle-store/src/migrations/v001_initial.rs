//! v001 -- Initial schema creation.
//!
//! Creates `rooms`, `room_users`, `messages`, `message_statuses` and
//! `notifications`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Rooms
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS rooms (
    id              TEXT PRIMARY KEY NOT NULL,   -- UUID v4, or "a_b" for direct rooms
    kind            TEXT NOT NULL,               -- direct | group
    name            TEXT NOT NULL DEFAULT '',
    description     TEXT NOT NULL DEFAULT '',
    avatar_url      TEXT NOT NULL DEFAULT '',
    last_message    TEXT,                        -- JSON envelope
    is_archived     INTEGER NOT NULL DEFAULT 0,
    is_muted        INTEGER NOT NULL DEFAULT 0,
    unread_counts   TEXT NOT NULL DEFAULT '{}',  -- JSON object user_id -> count
    pinned_messages TEXT NOT NULL DEFAULT '[]',  -- JSON array of message ids
    created_at      TEXT NOT NULL,               -- RFC 3339
    updated_at      TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Room membership
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS room_users (
    room_id   TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
    user_id   TEXT NOT NULL,
    joined_at TEXT NOT NULL,
    PRIMARY KEY (room_id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_room_users_user ON room_users(user_id);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id            TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    room_id       TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
    sender_id     TEXT NOT NULL,
    kind          TEXT NOT NULL,                 -- text | file | image | video | audio
    content       TEXT,
    file_url      TEXT,
    file_name     TEXT,
    file_size     INTEGER,
    file_type     TEXT,
    thumbnail_url TEXT,
    duration      INTEGER,
    status        TEXT NOT NULL,                 -- sent | delivered | read
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_room_created ON messages(room_id, created_at);

-- ----------------------------------------------------------------
-- Per-user delivery status
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS message_statuses (
    id         TEXT PRIMARY KEY NOT NULL,
    message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
    user_id    TEXT NOT NULL,
    status     TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (message_id, user_id)
);

-- ----------------------------------------------------------------
-- Notifications
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS notifications (
    id         TEXT PRIMARY KEY NOT NULL,
    user_id    TEXT NOT NULL,
    kind       TEXT NOT NULL,                    -- task_update | mention | system
    title      TEXT NOT NULL,
    content    TEXT NOT NULL,
    data       TEXT,                             -- optional JSON payload
    is_read    INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, is_read);
"#;

/// Apply the initial schema.
pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UP_SQL)
}
