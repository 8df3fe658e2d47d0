//! Per-connection read and write pumps.
//!
//! The pumps are generic over any `Sink<Frame>` / `Stream<Item = Result<Frame, E>>`
//! pair. The WebSocket adapter in [`crate::ws`] maps axum messages onto
//! [`Frame`]s; tests drive the pumps over in-memory channels.

use std::fmt::Display;
use std::time::Duration;

use chrono::Utc;
use futures::{Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use huddle_shared::{Envelope, RoomId, Route, UserId};

use crate::error::HubUnavailable;
use crate::hub::HubHandle;

/// Transport-level unit exchanged with a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close,
}

#[derive(Debug, Error)]
pub enum PumpError {
    #[error("write failed: {0}")]
    Write(String),

    #[error("write timed out after {0:?}")]
    Timeout(Duration),
}

impl HubHandle {
    /// Register `user` and run its pumps until either side ends.
    ///
    /// Returns the supervisor task. When it completes the connection has been
    /// unregistered (unless a newer session replaced it first).
    pub async fn handle_connection<S, R, E>(
        &self,
        user: UserId,
        room: Option<RoomId>,
        sink: S,
        stream: R,
    ) -> Result<JoinHandle<()>, HubUnavailable>
    where
        S: Sink<Frame> + Send + 'static,
        S::Error: Display + Send,
        R: Stream<Item = Result<Frame, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let (session, outbound) = self.register(user.clone(), room).await?;

        let mut writer = tokio::spawn(write_pump(sink, outbound, self.write_timeout));
        let mut reader = tokio::spawn(read_pump(stream, user.clone(), self.clone()));
        let hub = self.clone();

        Ok(tokio::spawn(async move {
            tokio::select! {
                result = &mut writer => {
                    match result {
                        Ok(Ok(())) => debug!(user = %user, session, "Writer finished"),
                        Ok(Err(e)) => warn!(user = %user, session, error = %e, "Writer failed"),
                        Err(e) => warn!(user = %user, session, error = %e, "Writer task aborted"),
                    }
                    reader.abort();
                }
                _ = &mut reader => {
                    debug!(user = %user, session, "Reader finished");
                    writer.abort();
                }
            }
            if hub.unregister(user.clone(), session).await.is_err() {
                debug!(user = %user, "Hub gone before unregister");
            }
            info!(user = %user, session, "Connection closed");
        }))
    }
}

/// Drain the outbound queue into the sink. Sends a close frame once the
/// queue is closed (unregistered, replaced or disconnected for overflow).
pub(crate) async fn write_pump<S>(
    sink: S,
    mut outbound: mpsc::Receiver<Envelope>,
    write_timeout: Duration,
) -> Result<(), PumpError>
where
    S: Sink<Frame>,
    S::Error: Display,
{
    let mut sink = std::pin::pin!(sink);

    while let Some(envelope) = outbound.recv().await {
        let text = match envelope.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to encode envelope, skipping");
                continue;
            }
        };
        match tokio::time::timeout(write_timeout, sink.send(Frame::Text(text))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(PumpError::Write(e.to_string())),
            Err(_) => return Err(PumpError::Timeout(write_timeout)),
        }
    }

    if let Ok(Err(e)) = tokio::time::timeout(write_timeout, sink.send(Frame::Close)).await {
        debug!(error = %e, "Close frame not delivered");
    }
    let _ = tokio::time::timeout(write_timeout, sink.close()).await;
    Ok(())
}

/// Decode client frames and forward them to the hub until the client
/// closes, the transport fails, or the hub goes away.
pub(crate) async fn read_pump<R, E>(stream: R, user: UserId, hub: HubHandle)
where
    R: Stream<Item = Result<Frame, E>>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);

    while let Some(item) = stream.next().await {
        let text = match item {
            Ok(Frame::Text(text)) => text,
            Ok(Frame::Close) => break,
            Err(e) => {
                debug!(user = %user, error = %e, "Read failed");
                break;
            }
        };

        let envelope = match Envelope::from_json(&text) {
            Ok(envelope) => stamp(envelope, &user),
            Err(e) => {
                warn!(user = %user, error = %e, "Dropping malformed frame");
                continue;
            }
        };

        let sent = match envelope.route() {
            Route::Room(_) => hub.relay(envelope).await,
            Route::Direct(target) => hub.direct(target, envelope).await,
            Route::Global | Route::Unroutable => {
                warn!(user = %user, kind = %envelope.kind, "Dropping unroutable client frame");
                continue;
            }
        };
        if sent.is_err() {
            break;
        }
    }
}

/// The sender is always the authenticated user, whatever the frame says.
fn stamp(mut envelope: Envelope, user: &UserId) -> Envelope {
    envelope.user_id = Some(user.clone());
    if envelope.id.is_none() {
        envelope.id = Some(uuid::Uuid::new_v4().to_string());
    }
    if envelope.timestamp.is_none() {
        envelope.timestamp = Some(Utc::now());
    }
    envelope
}
