use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::Method,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use huddle_shared::{Envelope, MessageContent, MessageKind, RoomId, UserId};
use huddle_store::{ChatMessage, Notification, Room};

use crate::auth::{AuthUser, TokenValidator};
use crate::error::ServerError;
use crate::service::{MessagingService, RoomPresence};
use crate::ws::ws_upgrade;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MessagingService>,
    pub validator: Arc<dyn TokenValidator>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(ws_upgrade))
        .route("/chat/direct", post(send_direct_message))
        .route("/chat/rooms", get(list_rooms))
        .route("/chat/rooms/direct", post(create_direct_room))
        .route("/chat/rooms/group", post(create_group_room))
        .route("/chat/rooms/:room_id", get(get_room).put(update_room))
        .route("/chat/rooms/:room_id/join", post(join_room))
        .route("/chat/rooms/:room_id/leave", post(leave_room))
        .route("/chat/rooms/:room_id/archive", post(archive_room))
        .route("/chat/rooms/:room_id/unarchive", post(unarchive_room))
        .route("/chat/rooms/:room_id/mute", post(mute_room))
        .route("/chat/rooms/:room_id/unmute", post(unmute_room))
        .route("/chat/rooms/:room_id/typing", post(send_typing))
        .route("/chat/rooms/:room_id/unread", get(unread_count))
        .route("/chat/rooms/:room_id/presence", get(room_presence))
        .route(
            "/chat/rooms/:room_id/messages",
            get(room_history).post(send_message),
        )
        .route(
            "/chat/rooms/:room_id/messages/:message_id/read",
            post(mark_read),
        )
        .route(
            "/chat/rooms/:room_id/messages/:message_id/pin",
            post(pin_message).delete(unpin_message),
        )
        .route("/chat/users/:user_id/online", get(user_online))
        .route("/notifications", get(list_notifications))
        .route("/notifications/unread", get(unread_notifications))
        .route("/notifications/:id/read", post(mark_notification_read))
        .route("/internal/notifications/task", post(notify_task_update))
        .route("/internal/notifications/mention", post(notify_mention))
        .route("/internal/notifications/system", post(notify_system))
        .route("/internal/tasks/broadcast", post(broadcast_task_update))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP API listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    connections: usize,
}

#[derive(Serialize)]
struct CountResponse {
    count: u32,
}

#[derive(Serialize)]
struct OnlineResponse {
    user_id: UserId,
    online: bool,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

const OK: StatusResponse = StatusResponse { status: "ok" };

#[derive(Deserialize)]
struct CreateDirectRoomRequest {
    user_id_2: String,
}

#[derive(Deserialize)]
struct CreateGroupRoomRequest {
    #[serde(default)]
    name: String,
    user_ids: Vec<String>,
}

#[derive(Deserialize)]
struct UpdateRoomRequest {
    name: Option<String>,
    description: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
struct SendDirectRequest {
    receiver_id: String,
    content: String,
}

/// Body of `POST /chat/rooms/:room_id/messages`. `type` defaults to text.
#[derive(Deserialize)]
struct SendMessageRequest {
    #[serde(rename = "type", default)]
    kind: Option<MessageKind>,
    content: Option<String>,
    file_url: Option<String>,
    file_name: Option<String>,
    file_size: Option<i64>,
    file_type: Option<String>,
    thumbnail_url: Option<String>,
    duration: Option<i64>,
}

impl SendMessageRequest {
    fn into_content(self) -> Result<MessageContent, ServerError> {
        let kind = self.kind.unwrap_or(MessageKind::Text);
        if !kind.is_content() {
            return Err(ServerError::BadRequest(format!(
                "cannot send a message of type {}",
                kind
            )));
        }
        let mut envelope = Envelope::new(kind);
        envelope.content = self.content;
        envelope.file_url = self.file_url.filter(|u| !u.is_empty());
        envelope.file_name = self.file_name;
        envelope.file_size = self.file_size;
        envelope.file_type = self.file_type;
        envelope.thumbnail_url = self.thumbnail_url;
        envelope.duration = self.duration;
        MessageContent::from_envelope(&envelope).map_err(|e| ServerError::BadRequest(e.to_string()))
    }
}

#[derive(Deserialize)]
struct TaskUpdateRequest {
    user_id: Option<String>,
    task_id: String,
    #[serde(default)]
    task_title: String,
    task_status: String,
}

#[derive(Deserialize)]
struct MentionRequest {
    user_id: String,
    content: String,
}

#[derive(Deserialize)]
struct SystemNotificationRequest {
    user_id: String,
    title: String,
    content: String,
}

#[derive(Deserialize)]
struct PageQuery {
    #[serde(default)]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, ServerError> {
    let stats = state.service.hub().stats().await?;
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        connections: stats.connections,
    }))
}

async fn create_direct_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateDirectRoomRequest>,
) -> Result<Json<Room>, ServerError> {
    let other = UserId::from(req.user_id_2);
    Ok(Json(state.service.create_direct_room(&user, &other).await?))
}

async fn create_group_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateGroupRoomRequest>,
) -> Result<Json<Room>, ServerError> {
    let members = std::iter::once(user).chain(req.user_ids.into_iter().map(UserId::from));
    Ok(Json(state.service.create_group_room(&req.name, members).await?))
}

async fn list_rooms(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Room>>, ServerError> {
    Ok(Json(state.service.list_rooms(&user).await?))
}

async fn get_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
) -> Result<Json<Room>, ServerError> {
    Ok(Json(state.service.get_room(&RoomId::from(room_id), &user).await?))
}

async fn update_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
    Json(req): Json<UpdateRoomRequest>,
) -> Result<Json<Room>, ServerError> {
    let room_id = RoomId::from(room_id);
    state.service.get_room(&room_id, &user).await?;
    let room = state
        .service
        .update_room_info(
            &room_id,
            req.name.as_deref(),
            req.description.as_deref(),
            req.avatar_url.as_deref(),
        )
        .await?;
    Ok(Json(room))
}

async fn join_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
) -> Result<Json<Room>, ServerError> {
    Ok(Json(state.service.join_room(&RoomId::from(room_id), &user).await?))
}

async fn leave_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
) -> Result<Json<StatusResponse>, ServerError> {
    state.service.leave_room(&RoomId::from(room_id), &user).await?;
    Ok(Json(OK))
}

async fn archive_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
) -> Result<Json<Room>, ServerError> {
    Ok(Json(state.service.archive_room(&RoomId::from(room_id), &user).await?))
}

async fn unarchive_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
) -> Result<Json<Room>, ServerError> {
    Ok(Json(state.service.unarchive_room(&RoomId::from(room_id), &user).await?))
}

async fn mute_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
) -> Result<Json<Room>, ServerError> {
    Ok(Json(state.service.mute_room(&RoomId::from(room_id), &user).await?))
}

async fn unmute_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
) -> Result<Json<Room>, ServerError> {
    Ok(Json(state.service.unmute_room(&RoomId::from(room_id), &user).await?))
}

async fn send_typing(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
) -> Result<Json<StatusResponse>, ServerError> {
    state
        .service
        .send_typing_indicator(&RoomId::from(room_id), &user)
        .await?;
    Ok(Json(OK))
}

async fn unread_count(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
) -> Result<Json<CountResponse>, ServerError> {
    let count = state
        .service
        .get_unread_count(&RoomId::from(room_id), &user)
        .await?;
    Ok(Json(CountResponse { count }))
}

async fn room_presence(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
) -> Result<Json<RoomPresence>, ServerError> {
    Ok(Json(state.service.room_presence(&RoomId::from(room_id), &user).await?))
}

async fn room_history(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<Envelope>>, ServerError> {
    let room_id = RoomId::from(room_id);
    state.service.get_room(&room_id, &user).await?;
    let history = state
        .service
        .get_room_history(&room_id, page.limit, page.offset)
        .await?;
    Ok(Json(history))
}

async fn send_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<Envelope>, ServerError> {
    let content = req.into_content()?;
    let message = state
        .service
        .send_content(&RoomId::from(room_id), &user, content)
        .await?;
    Ok(Json(message.to_envelope()))
}

async fn send_direct_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<SendDirectRequest>,
) -> Result<Json<ChatMessage>, ServerError> {
    let receiver = UserId::from(req.receiver_id);
    Ok(Json(
        state
            .service
            .send_direct_message(&user, &receiver, &req.content)
            .await?,
    ))
}

async fn mark_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((room_id, message_id)): Path<(String, Uuid)>,
) -> Result<Json<StatusResponse>, ServerError> {
    state
        .service
        .mark_message_as_read(&RoomId::from(room_id), &user, message_id)
        .await?;
    Ok(Json(OK))
}

async fn pin_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((room_id, message_id)): Path<(String, Uuid)>,
) -> Result<Json<Room>, ServerError> {
    let room_id = RoomId::from(room_id);
    state.service.get_room(&room_id, &user).await?;
    Ok(Json(state.service.pin_message(&room_id, message_id).await?))
}

async fn unpin_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((room_id, message_id)): Path<(String, Uuid)>,
) -> Result<Json<Room>, ServerError> {
    let room_id = RoomId::from(room_id);
    state.service.get_room(&room_id, &user).await?;
    Ok(Json(state.service.unpin_message(&room_id, message_id).await?))
}

async fn user_online(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(user_id): Path<String>,
) -> Result<Json<OnlineResponse>, ServerError> {
    let user_id = UserId::from(user_id);
    let online = state.service.hub().is_online(&user_id).await?;
    Ok(Json(OnlineResponse { user_id, online }))
}

async fn list_notifications(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<Notification>>, ServerError> {
    Ok(Json(
        state
            .service
            .list_notifications(&user, page.limit, page.offset)
            .await?,
    ))
}

async fn unread_notifications(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<CountResponse>, ServerError> {
    let count = state.service.get_unread_notification_count(&user).await?;
    Ok(Json(CountResponse { count }))
}

async fn mark_notification_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>, ServerError> {
    state.service.mark_notification_as_read(&user, id).await?;
    Ok(Json(OK))
}

// Called by other backend services (task tracker, mention parser).

async fn notify_task_update(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Json(req): Json<TaskUpdateRequest>,
) -> Result<Json<Notification>, ServerError> {
    let user = req
        .user_id
        .map(UserId::from)
        .ok_or_else(|| ServerError::BadRequest("user_id is required".into()))?;
    Ok(Json(
        state
            .service
            .send_task_update_notification(&user, &req.task_id, &req.task_title, &req.task_status)
            .await?,
    ))
}

async fn notify_mention(
    State(state): State<AppState>,
    AuthUser(sender): AuthUser,
    Json(req): Json<MentionRequest>,
) -> Result<Json<Notification>, ServerError> {
    Ok(Json(
        state
            .service
            .send_mention_notification(&UserId::from(req.user_id), &sender, &req.content)
            .await?,
    ))
}

async fn notify_system(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Json(req): Json<SystemNotificationRequest>,
) -> Result<Json<Notification>, ServerError> {
    Ok(Json(
        state
            .service
            .send_system_notification(&UserId::from(req.user_id), &req.title, &req.content)
            .await?,
    ))
}

async fn broadcast_task_update(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Json(req): Json<TaskUpdateRequest>,
) -> Result<Json<StatusResponse>, ServerError> {
    state
        .service
        .broadcast_task_update(&req.task_id, &req.task_title, &req.task_status)
        .await?;
    Ok(Json(OK))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use huddle_store::{Database, SharedDatabase};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::auth::{issue_token, JwtValidator};
    use crate::config::RoomLookup;
    use crate::hub::HubHandle;
    use crate::service::PageLimits;

    const SECRET: &[u8] = b"router-test-secret";

    fn state() -> AppState {
        let repo = Arc::new(SharedDatabase::new(Database::open_in_memory().unwrap()));
        let hub = HubHandle::new(64, 16, Duration::from_secs(1));
        let service = MessagingService::new(
            repo,
            hub,
            RoomLookup::ReadThrough,
            PageLimits { default: 50, max: 200 },
        );
        AppState {
            service: Arc::new(service),
            validator: Arc::new(JwtValidator::new(SECRET)),
        }
    }

    fn bearer(user: &str) -> String {
        format!(
            "Bearer {}",
            issue_token(SECRET, &UserId::from(user), 60).unwrap()
        )
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            req = req.header(header::AUTHORIZATION, bearer(user));
        }
        let req = match body {
            Some(json) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn health_needs_no_auth() {
        let app = build_router(state());
        let (status, body) = call(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
    }

    #[tokio::test]
    async fn chat_routes_require_bearer_token() {
        let app = build_router(state());
        let (status, body) = call(&app, Method::GET, "/chat/rooms", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].as_str().unwrap().contains("authorization"));
    }

    #[tokio::test]
    async fn group_room_flow() {
        let app = build_router(state());
        let (status, room) = call(
            &app,
            Method::POST,
            "/chat/rooms/group",
            Some("u1"),
            Some(serde_json::json!({ "name": "team", "user_ids": ["u2"] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let room_id = room["id"].as_str().unwrap().to_string();
        assert_eq!(room["members"], serde_json::json!(["u1", "u2"]));

        let (status, msg) = call(
            &app,
            Method::POST,
            &format!("/chat/rooms/{room_id}/messages"),
            Some("u2"),
            Some(serde_json::json!({ "content": "hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(msg["type"], "text");
        let message_id = msg["id"].as_str().unwrap().to_string();

        let (_, unread) = call(
            &app,
            Method::GET,
            &format!("/chat/rooms/{room_id}/unread"),
            Some("u1"),
            None,
        )
        .await;
        assert_eq!(unread["count"], 1);

        let (status, _) = call(
            &app,
            Method::POST,
            &format!("/chat/rooms/{room_id}/messages/{message_id}/read"),
            Some("u1"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, history) = call(
            &app,
            Method::GET,
            &format!("/chat/rooms/{room_id}/messages?limit=10"),
            Some("u1"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().unwrap().len(), 1);

        let (status, _) = call(
            &app,
            Method::GET,
            &format!("/chat/rooms/{room_id}/messages"),
            Some("outsider"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn pin_and_archive_routes() {
        let app = build_router(state());
        let (_, room) = call(
            &app,
            Method::POST,
            "/chat/rooms/direct",
            Some("a"),
            Some(serde_json::json!({ "user_id_2": "b" })),
        )
        .await;
        assert_eq!(room["id"], "a_b");

        let (_, msg) = call(
            &app,
            Method::POST,
            "/chat/rooms/a_b/messages",
            Some("a"),
            Some(serde_json::json!({ "type": "image", "file_url": "https://cdn/i.png" })),
        )
        .await;
        assert_eq!(msg["type"], "image");
        let message_id = msg["id"].as_str().unwrap().to_string();

        let uri = format!("/chat/rooms/a_b/messages/{message_id}/pin");
        let (status, pinned) = call(&app, Method::POST, &uri, Some("b"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pinned["pinned"], serde_json::json!([message_id]));

        let (_, unpinned) = call(&app, Method::DELETE, &uri, Some("b"), None).await;
        assert_eq!(unpinned["pinned"], serde_json::json!([]));

        let (_, archived) = call(&app, Method::POST, "/chat/rooms/a_b/archive", Some("a"), None).await;
        assert_eq!(archived["is_archived"], true);
    }

    #[tokio::test]
    async fn invalid_payloads_are_bad_requests() {
        let app = build_router(state());
        call(
            &app,
            Method::POST,
            "/chat/rooms/direct",
            Some("a"),
            Some(serde_json::json!({ "user_id_2": "b" })),
        )
        .await;

        let (status, _) = call(
            &app,
            Method::POST,
            "/chat/rooms/a_b/messages",
            Some("a"),
            Some(serde_json::json!({ "type": "video" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            Method::POST,
            "/chat/rooms/a_b/messages",
            Some("a"),
            Some(serde_json::json!({ "type": "typing" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, Method::GET, "/chat/rooms/nope/unread", Some("a"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn notification_routes() {
        let state = state();
        let notification = state
            .service
            .send_system_notification(&UserId::from("u1"), "Hi", "welcome")
            .await
            .unwrap();
        let app = build_router(state);

        let (_, unread) = call(&app, Method::GET, "/notifications/unread", Some("u1"), None).await;
        assert_eq!(unread["count"], 1);

        let (_, listed) = call(&app, Method::GET, "/notifications", Some("u1"), None).await;
        assert_eq!(listed[0]["title"], "Hi");

        let uri = format!("/notifications/{}/read", notification.id);
        let (status, _) = call(&app, Method::POST, &uri, Some("u2"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, Method::POST, &uri, Some("u1"), None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, unread) = call(&app, Method::GET, "/notifications/unread", Some("u1"), None).await;
        assert_eq!(unread["count"], 0);
    }

    #[tokio::test]
    async fn internal_notification_routes() {
        let app = build_router(state());
        let (status, task) = call(
            &app,
            Method::POST,
            "/internal/notifications/task",
            Some("tracker"),
            Some(serde_json::json!({
                "user_id": "u1",
                "task_id": "t-9",
                "task_title": "Ship it",
                "task_status": "done"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(task["kind"], "task_update");
        assert_eq!(task["content"], "Ship it status changed to done");

        let (_, mention) = call(
            &app,
            Method::POST,
            "/internal/notifications/mention",
            Some("u2"),
            Some(serde_json::json!({ "user_id": "u1", "content": "@u1 look" })),
        )
        .await;
        assert_eq!(mention["data"]["sender_id"], "u2");

        let (status, _) = call(
            &app,
            Method::POST,
            "/internal/notifications/task",
            Some("tracker"),
            Some(serde_json::json!({ "task_id": "t", "task_status": "open" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            Method::POST,
            "/internal/tasks/broadcast",
            Some("tracker"),
            Some(serde_json::json!({ "task_id": "t", "task_status": "open" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, unread) = call(&app, Method::GET, "/notifications/unread", Some("u1"), None).await;
        assert_eq!(unread["count"], 2);
    }

    #[tokio::test]
    async fn direct_message_route() {
        let app = build_router(state());
        let (status, msg) = call(
            &app,
            Method::POST,
            "/chat/direct",
            Some("a"),
            Some(serde_json::json!({ "receiver_id": "b", "content": "yo" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(msg["room_id"], "a_b");

        let (_, online) = call(&app, Method::GET, "/chat/users/b/online", Some("a"), None).await;
        assert_eq!(online["online"], false);
    }
}
