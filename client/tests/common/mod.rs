#![allow(dead_code)]

use std::{
    collections::HashMap,
    net::{SocketAddr, TcpListener},
    path::Path,
    sync::Arc,
    time::Duration,
};

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path as UrlPath, Query, State,
    },
    http::{HeaderMap, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use campus_rides::config::Config;
use parking_lot::Mutex;
use ride_api::ServerEvent;
use serde_json::{json, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::{sync::broadcast, task::JoinHandle};
use url::Url;

pub const PASSWORD: &str = "secret123";
const TOKENS: [&str; 2] = ["Bearer tok-ana", "Bearer tok-ana-2"];

#[derive(Default)]
pub struct MockState {
    /// Requests seen, keyed by `"METHOD /path"`.
    pub hits: HashMap<String, usize>,
    /// Authorization header of each request, keyed like `hits`.
    pub auth: HashMap<String, Vec<Option<String>>>,
    pub reject_accept: bool,
    pub ride_accepted: bool,
    pub sockets: Vec<String>,
    /// Extra latency of the geocoder and the people search.
    pub lookup_delay: Duration,
}

/// In-process stand-in for the ride-sharing backend and its map services.
#[derive(Clone)]
pub struct Mock {
    state: Arc<Mutex<MockState>>,
    push: broadcast::Sender<String>,
}

impl Mock {
    fn new() -> Self {
        let (push, _) = broadcast::channel(64);
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            push,
        }
    }

    pub fn hits(&self, key: &str) -> usize {
        self.state.lock().hits.get(key).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.state.lock().hits.values().sum()
    }

    pub fn auth_headers(&self, key: &str) -> Vec<Option<String>> {
        self.state
            .lock()
            .auth
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn reject_accept(&self, reject: bool) {
        self.state.lock().reject_accept = reject;
    }

    pub fn slow_lookups(&self, delay: Duration) {
        self.state.lock().lookup_delay = delay;
    }

    fn lookup_delay(&self) -> Duration {
        self.state.lock().lookup_delay
    }

    pub fn sockets(&self) -> Vec<String> {
        self.state.lock().sockets.clone()
    }

    /// Send a raw frame to every connected socket.
    pub fn push(&self, event: &str, data: Value) {
        let _ = self
            .push
            .send(json!({ "event": event, "data": data }).to_string());
    }

    /// Send a typed event, framed the way the backend does.
    pub fn push_event(&self, event: &ServerEvent) {
        let frame = event.to_frame().unwrap();
        self.push(&frame.event, frame.data);
    }
}

pub struct Backend {
    pub addr: SocketAddr,
    pub mock: Mock,
    server: JoinHandle<()>,
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

impl Backend {
    /// Client configuration pointing every service at this backend.
    pub fn config(&self, data_dir: &Path) -> Config {
        let mut cfg = Config::builtin(data_dir.to_path_buf()).unwrap();
        cfg.api_base_url = Url::parse(&format!("http://{}/api", self.addr)).unwrap();
        cfg.socket_url = Url::parse(&format!("ws://{}/socket", self.addr)).unwrap();
        cfg.geocode_url = Url::parse(&format!("http://{}/geo", self.addr)).unwrap();
        cfg.routing_url = Url::parse(&format!("http://{}/osrm", self.addr)).unwrap();
        cfg.search_debounce = Duration::from_millis(20);
        cfg.request_timeout = Duration::from_secs(5);
        cfg
    }
}

pub async fn spawn_backend() -> Backend {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    listener.set_nonblocking(true).unwrap();
    let mock = Mock::new();

    let api = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(ok_empty))
        .route("/users/me", get(me))
        .route("/chat/unread-count", get(unread_messages))
        .route("/notifications/unread-count", get(unread_notifications))
        .route("/chat/messages", post(send_message))
        .route("/chat/conversations", get(conversations))
        .route("/chat/conversations/:id/messages", get(thread))
        .route("/chat/conversations/:id/seen", post(ok_empty))
        .route("/users/search", get(search_users))
        .route("/rides/:id", get(get_ride))
        .route("/rides/:id/accept", post(accept_ride));
    let app = Router::new()
        .nest("/api", api)
        .route("/socket", get(socket))
        .route("/geo/search", get(geocode))
        .layer(middleware::from_fn_with_state(mock.clone(), record))
        .with_state(mock.clone());

    let server = tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .unwrap()
            .serve(app.into_make_service())
            .await
            .unwrap();
    });
    Backend { addr, mock, server }
}

pub fn ana() -> Value {
    json!({ "_id": "u1", "username": "ana", "fullname": "Ana Lima" })
}

pub fn bob() -> Value {
    json!({ "_id": "u2", "username": "bob", "fullname": "Bob Tran", "isDriver": true })
}

fn now() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap()
}

/// A signed-looking access token for `sub` expiring `ttl` from now.
pub fn expiring_jwt(sub: &str, ttl: time::Duration) -> String {
    let exp = (OffsetDateTime::now_utc() + ttl).unix_timestamp();
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{sub}","exp":{exp}}}"#));
    format!("{header}.{payload}.sig")
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| TOKENS.contains(&v) || v.starts_with("Bearer eyJ"))
        .unwrap_or(false)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "Unauthorized" })),
    )
        .into_response()
}

async fn record<B>(State(mock): State<Mock>, req: Request<B>, next: Next<B>) -> Response {
    let key = format!("{} {}", req.method(), req.uri().path());
    let auth = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    {
        let mut st = mock.state.lock();
        *st.hits.entry(key.clone()).or_default() += 1;
        st.auth.entry(key).or_default().push(auth);
    }
    next.run(req).await
}

async fn login(Json(body): Json<Value>) -> Response {
    match (body["username"].as_str(), body["password"].as_str()) {
        (Some("ana"), Some(PASSWORD)) => Json(json!({
            "accessToken": "tok-ana",
            "refreshToken": "ref-ana",
            "user": ana(),
        }))
        .into_response(),
        // same account, but handed a token that is about to expire
        (Some("eve"), Some(PASSWORD)) => Json(json!({
            "accessToken": expiring_jwt("u1", time::Duration::seconds(30)),
            "refreshToken": "ref-ana",
            "user": ana(),
        }))
        .into_response(),
        (Some("mallory"), Some(PASSWORD)) => Json(json!({
            "accessToken": "tok-mallory",
            "user": { "_id": "u9", "username": "mallory", "fullname": "M", "isSuspended": true },
        }))
        .into_response(),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Invalid username or password" })),
        )
            .into_response(),
    }
}

async fn refresh(Json(body): Json<Value>) -> Response {
    match body["refreshToken"].as_str() {
        Some("ref-ana") | Some("ref-ana-2") => Json(json!({
            "accessToken": "tok-ana-2",
            "refreshToken": "ref-ana-2",
        }))
        .into_response(),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Session expired" })),
        )
            .into_response(),
    }
}

async fn ok_empty() -> Json<Value> {
    Json(json!({}))
}

async fn me(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(ana()).into_response()
}

async fn unread_messages(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({ "count": 3 })).into_response()
}

async fn unread_notifications(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({ "count": 1 })).into_response()
}

/// Stores nothing; echoes the message over the socket before answering.
async fn send_message(
    State(mock): State<Mock>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    if body["text"] == "fail" {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "could not store message" })),
        )
            .into_response();
    }
    let msg = json!({
        "_id": body["id"],
        "conversationId": body["conversationId"],
        "senderId": "u1",
        "text": body["text"],
        "createdAt": now(),
    });
    mock.push("newMessage", msg.clone());
    tokio::time::sleep(Duration::from_millis(50)).await;
    Json(msg).into_response()
}

fn ride(id: &str, accepted: bool) -> Value {
    json!({
        "_id": id,
        "poster": bob(),
        "pickup": { "name": "Main Library", "lat": 40.1047, "lng": -88.2290 },
        "dropoff": { "name": "Union Station", "lat": 40.1150, "lng": -88.2410 },
        "cost": 12.5,
        "seats": 3,
        "departureTime": "2031-05-01T10:00:00Z",
        "accepted": accepted,
        "acceptedBy": if accepted { json!("u1") } else { Value::Null },
    })
}

async fn get_ride(State(mock): State<Mock>, UrlPath(id): UrlPath<String>) -> Json<Value> {
    let accepted = mock.state.lock().ride_accepted;
    Json(ride(&id, accepted))
}

async fn accept_ride(
    State(mock): State<Mock>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<String>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut st = mock.state.lock();
    if st.reject_accept {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "message": "Ride already accepted" })),
        )
            .into_response();
    }
    st.ride_accepted = true;
    Json(ride(&id, true)).into_response()
}

async fn conversations(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!([
        {
            "_id": "c1",
            "participants": [ana(), bob()],
            "lastMessage": {
                "_id": "m1",
                "conversationId": "c1",
                "senderId": "u2",
                "text": "are you still driving?",
                "createdAt": "2031-05-01T08:00:00Z",
            },
            "unreadCount": 2,
        },
    ]))
    .into_response()
}

async fn thread(headers: HeaderMap, UrlPath(id): UrlPath<String>) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let msg = |mid: &str, at: &str| {
        json!({
            "_id": mid,
            "conversationId": id,
            "senderId": "u2",
            "text": "are you still driving?",
            "createdAt": at,
        })
    };
    Json(json!([
        msg("m0", "2031-05-01T07:59:00Z"),
        msg("m1", "2031-05-01T08:00:00Z"),
    ]))
    .into_response()
}

async fn search_users(
    State(mock): State<Mock>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    tokio::time::sleep(mock.lookup_delay()).await;
    let q = q.get("q").cloned().unwrap_or_default();
    let users: Vec<Value> = [ana(), bob()]
        .into_iter()
        .filter(|u| u["username"].as_str().unwrap_or("").starts_with(&q))
        .collect();
    Json(Value::Array(users)).into_response()
}

async fn geocode(
    State(mock): State<Mock>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Value> {
    tokio::time::sleep(mock.lookup_delay()).await;
    let name = q.get("q").cloned().unwrap_or_default();
    Json(json!([
        { "display_name": format!("{name}, Campus"), "lat": "40.1047", "lon": "-88.2290" },
        { "display_name": "broken", "lat": "n/a", "lon": "0" },
    ]))
}

async fn socket(
    ws: WebSocketUpgrade,
    Query(q): Query<HashMap<String, String>>,
    State(mock): State<Mock>,
) -> Response {
    let user = q.get("userId").cloned().unwrap_or_default();
    ws.on_upgrade(move |socket| serve_socket(socket, user, mock))
}

async fn serve_socket(mut socket: WebSocket, user: String, mock: Mock) {
    let mut rx = mock.push.subscribe();
    mock.state.lock().sockets.push(user.clone());
    let hello = json!({ "event": "getOnlineUsers", "data": [user, "u2"] }).to_string();
    if socket.send(WsMessage::Text(hello)).await.is_err() {
        return;
    }
    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Ok(txt) => {
                    if socket.send(WsMessage::Text(txt)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Poll `cond` until it holds or a second has passed.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
