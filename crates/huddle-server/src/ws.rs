use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{future, SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{info, warn};

use huddle_shared::{RoomId, UserId};

use crate::api::AppState;
use crate::connection::Frame;
use crate::hub::HubHandle;

/// Query parameters of the WebSocket endpoint.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: String,
    #[serde(default)]
    pub room_id: Option<String>,
}

/// GET /ws?token=JWT[&room_id=...]
///
/// On auth failure the connection is upgraded and immediately closed with
/// 4001 (expired) or 4002 (invalid).
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    match state.validator.validate(&params.token) {
        Ok(user) => {
            let room = params
                .room_id
                .filter(|r| !r.trim().is_empty())
                .map(RoomId::from);
            info!(user = %user, room = ?room, "WebSocket connection authenticated");
            let hub = state.service.hub().clone();
            ws.on_upgrade(move |socket| serve_socket(socket, hub, user, room))
        }
        Err(err) => {
            warn!(close_code = err.close_code(), reason = %err, "WebSocket auth failed");
            ws.on_upgrade(move |mut socket| async move {
                let close = CloseFrame {
                    code: err.close_code(),
                    reason: err.to_string().into(),
                };
                let _ = socket.send(Message::Close(Some(close))).await;
            })
        }
    }
}

async fn serve_socket(socket: WebSocket, hub: HubHandle, user: UserId, room: Option<RoomId>) {
    let (sink, stream) = socket.split();
    let sink = sink.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(to_message(frame))));
    let stream = stream.filter_map(|msg| future::ready(to_frame(msg)));

    match hub.handle_connection(user.clone(), room, sink, stream).await {
        Ok(supervisor) => {
            let _ = supervisor.await;
        }
        Err(e) => warn!(user = %user, error = %e, "Could not register connection"),
    }
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text),
        Frame::Close => Message::Close(None),
    }
}

/// Pings and pongs are answered by the transport and never reach the pumps.
fn to_frame(msg: Result<Message, axum::Error>) -> Option<Result<Frame, axum::Error>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
        Ok(Message::Binary(bytes)) => String::from_utf8(bytes).ok().map(|t| Ok(Frame::Text(t))),
        Ok(Message::Close(_)) => Some(Ok(Frame::Close)),
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
        Err(e) => Some(Err(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_map_onto_messages() {
        assert!(matches!(to_message(Frame::Text("x".into())), Message::Text(t) if t == "x"));
        assert!(matches!(to_message(Frame::Close), Message::Close(None)));
    }

    #[test]
    fn control_messages_are_filtered() {
        assert!(to_frame(Ok(Message::Ping(vec![1]))).is_none());
        assert!(to_frame(Ok(Message::Pong(vec![]))).is_none());
        assert!(matches!(
            to_frame(Ok(Message::Binary(b"{}".to_vec()))),
            Some(Ok(Frame::Text(t))) if t == "{}"
        ));
        assert!(matches!(
            to_frame(Ok(Message::Close(None))),
            Some(Ok(Frame::Close))
        ));
    }
}
