use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Account as exposed by the backend.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(alias = "_id")]
    pub id: String,
    pub username: String,
    pub fullname: String,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub is_driver: bool,
    #[serde(default)]
    pub rating: Option<f32>,
    #[serde(default)]
    pub is_suspended: bool,
}

/// Named point on the map.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Location {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RidePost {
    #[serde(alias = "_id")]
    pub id: String,
    pub poster: User,
    pub pickup: Location,
    pub dropoff: Location,
    pub cost: f64,
    pub seats: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub departure_time: OffsetDateTime,
    #[serde(default)]
    pub accepted: bool,
    #[serde(default)]
    pub accepted_by: Option<String>,
}

/// Body of `POST /rides`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewRide {
    pub pickup: Location,
    pub dropoff: Location,
    pub cost: f64,
    pub seats: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub departure_time: OffsetDateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FareUpdate {
    pub cost: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(alias = "_id")]
    pub id: String,
    pub participants: Vec<User>,
    #[serde(default)]
    pub last_message: Option<Message>,
    #[serde(default)]
    pub unread_count: u32,
}

impl Conversation {
    /// The participant that is not `me`.
    pub fn peer(&self, me: &str) -> Option<&User> {
        self.participants.iter().find(|u| u.id != me)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(alias = "_id")]
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub seen: bool,
}

/// Body of `POST /chat/messages`. The id is generated by the sender.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub id: String,
    pub conversation_id: String,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub notifier: Option<User>,
    pub message: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnreadCount {
    pub count: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SignupRequest {
    pub username: String,
    pub fullname: String,
    pub email: String,
    pub password: String,
}

/// Returned by login and signup.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: User,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Returned by `POST /auth/refresh`. A rotated refresh token is optional.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct OtpSendRequest {
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct OtpVerifyRequest {
    pub email: String,
    pub otp: String,
}

/// Partial update of the current user. Unset fields are left untouched.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fullname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_driver: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RatingRequest {
    pub user_id: String,
    pub ride_id: String,
    pub score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintRequest {
    pub against_user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ride_id: Option<String>,
    pub description: String,
}

/// Error payload. The backend is inconsistent about the field name.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    pub fn text(&self) -> Option<&str> {
        self.message.as_deref().or(self.error.as_deref())
    }
}

pub const EVENT_NEW_MESSAGE: &str = "newMessage";
pub const EVENT_NEW_NOTIFICATION: &str = "newNotification";
pub const EVENT_ONLINE_USERS: &str = "getOnlineUsers";

/// Raw frame exchanged over the real-time socket.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SocketFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Inbound real-time events understood by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    NewMessage(Message),
    NewNotification(Notification),
    OnlineUsers(Vec<String>),
}

impl ServerEvent {
    /// Decode a frame. Unknown event names yield `Ok(None)`.
    pub fn from_frame(frame: SocketFrame) -> Result<Option<Self>, serde_json::Error> {
        let ev = match frame.event.as_str() {
            EVENT_NEW_MESSAGE => Self::NewMessage(serde_json::from_value(frame.data)?),
            EVENT_NEW_NOTIFICATION => Self::NewNotification(serde_json::from_value(frame.data)?),
            EVENT_ONLINE_USERS => Self::OnlineUsers(serde_json::from_value(frame.data)?),
            _ => return Ok(None),
        };
        Ok(Some(ev))
    }

    pub fn to_frame(&self) -> Result<SocketFrame, serde_json::Error> {
        let (event, data) = match self {
            Self::NewMessage(m) => (EVENT_NEW_MESSAGE, serde_json::to_value(m)?),
            Self::NewNotification(n) => (EVENT_NEW_NOTIFICATION, serde_json::to_value(n)?),
            Self::OnlineUsers(ids) => (EVENT_ONLINE_USERS, serde_json::to_value(ids)?),
        };
        Ok(SocketFrame {
            event: event.into(),
            data,
        })
    }
}
