//! # huddle-store
//!
//! Durable storage for chat rooms, messages, delivery receipts and user
//! notifications, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle with typed CRUD helpers
//! for every model, and the [`ChatRepository`] trait that the hub service
//! depends on. [`SharedDatabase`] puts a `Database` behind a mutex so it can
//! be shared across async tasks as an `Arc<dyn ChatRepository>`.

pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod notifications;
pub mod repository;
pub mod rooms;

mod error;

pub use database::Database;
pub use error::{OptionalExt, Result, StoreError};
pub use models::*;
pub use repository::{ChatRepository, SharedDatabase};
