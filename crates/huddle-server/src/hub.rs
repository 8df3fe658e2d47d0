//! The hub: a single actor task that owns every live connection and the
//! room cache, and routes envelopes between them.
//!
//! Everything else talks to it through a [`HubHandle`], which wraps the
//! bounded command queue. Queries carry a `oneshot` reply channel, so there
//! is no shared state and no lock around the connection table.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use huddle_shared::{Envelope, RoomId, Route, UserId};
use huddle_store::Room;

use crate::error::HubUnavailable;

/// Commands processed by the hub actor, in arrival order.
#[derive(Debug)]
pub enum HubCommand {
    /// Register a connection, replacing any previous session of the user.
    Register {
        user: UserId,
        room: Option<RoomId>,
        outbound: mpsc::Sender<Envelope>,
        reply: oneshot::Sender<u64>,
    },
    /// Drop a connection if `session` is still the live one.
    Unregister { user: UserId, session: u64 },
    /// Room fan-out, or global fan-out for room-less task updates.
    Broadcast {
        envelope: Envelope,
        /// Client frames may only reach rooms their sender belongs to.
        from_client: bool,
    },
    /// Deliver to a single user.
    Direct { target: UserId, envelope: Envelope },
    CacheRoom(Box<Room>),
    EvictRoom(RoomId),
    GetRoom {
        room: RoomId,
        reply: oneshot::Sender<Option<Room>>,
    },
    IsOnline {
        user: UserId,
        reply: oneshot::Sender<bool>,
    },
    OnlineUsers {
        reply: oneshot::Sender<Vec<UserId>>,
    },
    /// Users whose connection is associated with the room.
    RoomViewers {
        room: RoomId,
        reply: oneshot::Sender<Vec<UserId>>,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub cached_rooms: usize,
}

struct Connection {
    session: u64,
    outbound: mpsc::Sender<Envelope>,
    room: Option<RoomId>,
}

/// State owned by the actor task.
#[derive(Default)]
struct Hub {
    connections: HashMap<UserId, Connection>,
    rooms: HashMap<RoomId, Room>,
    next_session: u64,
}

impl Hub {
    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register {
                user,
                room,
                outbound,
                reply,
            } => {
                let session = self.register(user, room, outbound);
                let _ = reply.send(session);
            }
            HubCommand::Unregister { user, session } => self.unregister(&user, session),
            HubCommand::Broadcast {
                envelope,
                from_client,
            } => self.broadcast(envelope, from_client),
            HubCommand::Direct { target, envelope } => {
                if !self.deliver(&target, envelope) {
                    debug!(target = %target, "Recipient offline, dropping direct message");
                }
            }
            HubCommand::CacheRoom(room) => {
                self.rooms.insert(room.id.clone(), *room);
            }
            HubCommand::EvictRoom(room) => {
                self.rooms.remove(&room);
            }
            HubCommand::GetRoom { room, reply } => {
                let _ = reply.send(self.rooms.get(&room).cloned());
            }
            HubCommand::IsOnline { user, reply } => {
                let _ = reply.send(self.connections.contains_key(&user));
            }
            HubCommand::OnlineUsers { reply } => {
                let _ = reply.send(self.connections.keys().cloned().collect());
            }
            HubCommand::RoomViewers { room, reply } => {
                let viewers = self
                    .connections
                    .iter()
                    .filter(|(_, c)| c.room.as_ref() == Some(&room))
                    .map(|(user, _)| user.clone())
                    .collect();
                let _ = reply.send(viewers);
            }
            HubCommand::Stats { reply } => {
                let _ = reply.send(HubStats {
                    connections: self.connections.len(),
                    cached_rooms: self.rooms.len(),
                });
            }
        }
    }

    fn register(
        &mut self,
        user: UserId,
        room: Option<RoomId>,
        outbound: mpsc::Sender<Envelope>,
    ) -> u64 {
        self.next_session += 1;
        let session = self.next_session;
        let previous = self.connections.insert(
            user.clone(),
            Connection {
                session,
                outbound,
                room,
            },
        );

        match previous {
            // Dropping the old sender makes the old writer close its transport.
            Some(old) => info!(
                user = %user,
                session,
                replaced = old.session,
                "Connection replaced"
            ),
            None => info!(
                user = %user,
                session,
                connections = self.connections.len(),
                "Connection registered"
            ),
        }
        session
    }

    fn unregister(&mut self, user: &UserId, session: u64) {
        match self.connections.get(user) {
            Some(conn) if conn.session == session => {
                self.connections.remove(user);
                info!(
                    user = %user,
                    session,
                    connections = self.connections.len(),
                    "Connection unregistered"
                );
            }
            _ => debug!(user = %user, session, "Ignoring unregister for stale session"),
        }
    }

    /// Push onto one user's queue. Returns `false` if nothing was enqueued.
    fn deliver(&mut self, user: &UserId, envelope: Envelope) -> bool {
        let Some(conn) = self.connections.get(user) else {
            return false;
        };
        match conn.outbound.try_send(envelope) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(user = %user, session = conn.session, "Outbound queue full, disconnecting slow connection");
                self.connections.remove(user);
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(user = %user, session = conn.session, "Outbound queue closed, removing connection");
                self.connections.remove(user);
                false
            }
        }
    }

    fn broadcast(&mut self, envelope: Envelope, from_client: bool) {
        match envelope.route() {
            Route::Room(room_id) => self.broadcast_to_room(&room_id, envelope, from_client),
            Route::Global => {
                let targets: Vec<UserId> = self.connections.keys().cloned().collect();
                for user in &targets {
                    self.deliver(user, envelope.clone());
                }
                debug!(recipients = targets.len(), "Global fan-out");
            }
            Route::Direct(_) | Route::Unroutable => {
                debug!(kind = %envelope.kind, "Broadcast without room, dropping");
            }
        }
    }

    fn broadcast_to_room(&mut self, room_id: &RoomId, envelope: Envelope, from_client: bool) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            debug!(room = %room_id, "Room not cached, dropping broadcast");
            return;
        };

        if from_client {
            let is_member = envelope
                .user_id
                .as_ref()
                .is_some_and(|sender| room.is_member(sender));
            if !is_member {
                warn!(room = %room_id, sender = ?envelope.user_id, "Sender not in room, dropping broadcast");
                return;
            }
        }

        // Service sends arrive with the snapshot already set by `CacheRoom`.
        if from_client && envelope.kind.is_content() {
            room.last_message = Some(envelope.clone());
        }

        let targets: Vec<UserId> = room
            .members
            .iter()
            .filter(|m| self.connections.contains_key(*m))
            .cloned()
            .collect();

        let mut delivered = 0usize;
        for user in &targets {
            if self.deliver(user, envelope.clone()) {
                delivered += 1;
            }
        }
        debug!(room = %room_id, kind = %envelope.kind, delivered, "Room broadcast");
    }
}

/// Spawn the hub actor. It runs until every [`HubHandle`] is dropped.
pub fn spawn(queue_capacity: usize) -> mpsc::Sender<HubCommand> {
    let (tx, mut rx) = mpsc::channel::<HubCommand>(queue_capacity);

    tokio::spawn(async move {
        let mut hub = Hub::default();
        while let Some(command) = rx.recv().await {
            hub.handle(command);
        }
        info!("Hub command queue closed, stopping");
    });

    tx
}

/// Cloneable front door to the hub actor.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
    pub(crate) outbound_capacity: usize,
    pub(crate) write_timeout: Duration,
}

impl HubHandle {
    pub fn new(queue_capacity: usize, outbound_capacity: usize, write_timeout: Duration) -> Self {
        Self {
            commands: spawn(queue_capacity),
            outbound_capacity,
            write_timeout,
        }
    }

    async fn send(&self, command: HubCommand) -> Result<(), HubUnavailable> {
        self.commands.send(command).await.map_err(|_| HubUnavailable)
    }

    async fn ask<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> HubCommand,
    ) -> Result<T, HubUnavailable> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply)).await?;
        rx.await.map_err(|_| HubUnavailable)
    }

    /// Register `user` and return its session number plus the receiving end
    /// of its outbound queue.
    pub async fn register(
        &self,
        user: UserId,
        room: Option<RoomId>,
    ) -> Result<(u64, mpsc::Receiver<Envelope>), HubUnavailable> {
        let (outbound, rx) = mpsc::channel(self.outbound_capacity);
        let session = self
            .ask(|reply| HubCommand::Register {
                user,
                room,
                outbound,
                reply,
            })
            .await?;
        Ok((session, rx))
    }

    pub async fn unregister(&self, user: UserId, session: u64) -> Result<(), HubUnavailable> {
        self.send(HubCommand::Unregister { user, session }).await
    }

    pub async fn broadcast(&self, envelope: Envelope) -> Result<(), HubUnavailable> {
        self.send(HubCommand::Broadcast {
            envelope,
            from_client: false,
        })
        .await
    }

    pub(crate) async fn relay(&self, envelope: Envelope) -> Result<(), HubUnavailable> {
        self.send(HubCommand::Broadcast {
            envelope,
            from_client: true,
        })
        .await
    }

    pub async fn direct(&self, target: UserId, envelope: Envelope) -> Result<(), HubUnavailable> {
        self.send(HubCommand::Direct { target, envelope }).await
    }

    pub async fn cache_room(&self, room: Room) -> Result<(), HubUnavailable> {
        self.send(HubCommand::CacheRoom(Box::new(room))).await
    }

    pub async fn evict_room(&self, room: RoomId) -> Result<(), HubUnavailable> {
        self.send(HubCommand::EvictRoom(room)).await
    }

    pub async fn room(&self, room: &RoomId) -> Result<Option<Room>, HubUnavailable> {
        let room = room.clone();
        self.ask(|reply| HubCommand::GetRoom { room, reply }).await
    }

    pub async fn is_online(&self, user: &UserId) -> Result<bool, HubUnavailable> {
        let user = user.clone();
        self.ask(|reply| HubCommand::IsOnline { user, reply }).await
    }

    pub async fn online_users(&self) -> Result<Vec<UserId>, HubUnavailable> {
        self.ask(|reply| HubCommand::OnlineUsers { reply }).await
    }

    pub async fn room_viewers(&self, room: &RoomId) -> Result<Vec<UserId>, HubUnavailable> {
        let room = room.clone();
        self.ask(|reply| HubCommand::RoomViewers { room, reply }).await
    }

    pub async fn stats(&self) -> Result<HubStats, HubUnavailable> {
        self.ask(|reply| HubCommand::Stats { reply }).await
    }
}
