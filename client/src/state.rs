use std::{
    collections::{HashSet, VecDeque},
    fmt,
    str::FromStr,
    sync::Arc,
};

use parking_lot::Mutex;
use ride_api::{ServerEvent, UnreadCount};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{ClientError, ClientResult},
    http::{ApiClient, Auth},
    storage::{Storage, KEY_NOTIFICATIONS_ENABLED, KEY_THEME},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl FromStr for Theme {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            other => Err(ClientError::validation(format!("unknown theme '{other}'"))),
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Light => "light",
            Self::Dark => "dark",
        })
    }
}

/// Badge numbers shown in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counters {
    pub unread_messages: u32,
    pub unread_notifications: u32,
}

/// How many recent event ids are remembered for duplicate detection.
const COUNTED_CAPACITY: usize = 512;

/// Bounded set of event ids, oldest evicted first.
#[derive(Default)]
struct RecentIds {
    ids: HashSet<String>,
    order: VecDeque<String>,
}

impl RecentIds {
    /// Returns false if `id` is already remembered.
    fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() == COUNTED_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.ids.insert(id.to_string());
        self.order.push_back(id.to_string());
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.order.len()
    }

    fn clear(&mut self) {
        self.ids.clear();
        self.order.clear();
    }
}

#[derive(Default)]
struct Inner {
    counters: Counters,
    /// Event ids already reflected in the counters.
    counted: RecentIds,
    online: HashSet<String>,
    me: Option<String>,
    active_conversation: Option<String>,
    notifications_enabled: bool,
    theme: Theme,
}

/// State shared by every view: unread badges, presence and preferences.
/// Counters are seeded by a fetch and then moved by socket events.
pub struct UiState {
    storage: Arc<Storage>,
    inner: Mutex<Inner>,
}

impl UiState {
    /// Build from persisted preferences. Notifications default to enabled.
    pub async fn load(storage: Arc<Storage>) -> Self {
        let notifications_enabled = storage
            .get_as::<bool>(KEY_NOTIFICATIONS_ENABLED)
            .await
            .unwrap_or(true);
        let theme = storage.get_as::<Theme>(KEY_THEME).await.unwrap_or_default();
        Self {
            storage,
            inner: Mutex::new(Inner {
                notifications_enabled,
                theme,
                ..Default::default()
            }),
        }
    }

    pub fn counters(&self) -> Counters {
        self.inner.lock().counters
    }

    pub fn theme(&self) -> Theme {
        self.inner.lock().theme
    }

    pub fn notifications_enabled(&self) -> bool {
        self.inner.lock().notifications_enabled
    }

    pub async fn set_theme(&self, theme: Theme) -> ClientResult<()> {
        self.storage.put(KEY_THEME, theme).await?;
        self.inner.lock().theme = theme;
        Ok(())
    }

    pub async fn set_notifications_enabled(&self, enabled: bool) -> ClientResult<()> {
        self.storage.put(KEY_NOTIFICATIONS_ENABLED, enabled).await?;
        self.inner.lock().notifications_enabled = enabled;
        Ok(())
    }

    /// Flip the notification preference and return the new value.
    pub async fn toggle_notifications(&self) -> ClientResult<bool> {
        let next = !self.notifications_enabled();
        self.set_notifications_enabled(next).await?;
        Ok(next)
    }

    pub fn set_me(&self, user_id: Option<String>) {
        self.inner.lock().me = user_id;
    }

    /// Messages for the open conversation are not counted as unread.
    pub fn set_active_conversation(&self, conversation_id: Option<String>) {
        self.inner.lock().active_conversation = conversation_id;
    }

    pub fn active_conversation(&self) -> Option<String> {
        self.inner.lock().active_conversation.clone()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.inner.lock().online.contains(user_id)
    }

    pub fn online_users(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.lock().online.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Fold a pushed event into the shared state. Returns true when the user
    /// should be alerted (a new notification while alerts are enabled).
    pub fn apply(&self, event: &ServerEvent) -> bool {
        let mut inner = self.inner.lock();
        match event {
            ServerEvent::NewMessage(msg) => {
                let own = inner.me.as_deref() == Some(msg.sender_id.as_str());
                let open = inner.active_conversation.as_deref() == Some(msg.conversation_id.as_str());
                if !own && !open && inner.counted.insert(&msg.id) {
                    inner.counters.unread_messages += 1;
                }
                false
            }
            ServerEvent::NewNotification(n) => {
                if n.read || !inner.counted.insert(&n.id) {
                    return false;
                }
                inner.counters.unread_notifications += 1;
                inner.notifications_enabled
            }
            ServerEvent::OnlineUsers(ids) => {
                inner.online = ids.iter().cloned().collect();
                false
            }
        }
    }

    pub fn set_unread_messages(&self, count: u32) {
        self.inner.lock().counters.unread_messages = count;
    }

    pub fn set_unread_notifications(&self, count: u32) {
        self.inner.lock().counters.unread_notifications = count;
    }

    /// Decrease the message badge after a conversation was opened.
    pub fn messages_read(&self, count: u32) {
        let mut inner = self.inner.lock();
        inner.counters.unread_messages = inner.counters.unread_messages.saturating_sub(count);
    }

    pub fn notification_read(&self) {
        let mut inner = self.inner.lock();
        inner.counters.unread_notifications =
            inner.counters.unread_notifications.saturating_sub(1);
    }

    /// Seed both badges from the backend. Failures are logged and ignored.
    pub async fn refresh_counts(&self, api: &ApiClient) {
        let (messages, notifications) = tokio::join!(
            api.get::<UnreadCount>("/chat/unread-count", Auth::Bearer),
            api.get::<UnreadCount>("/notifications/unread-count", Auth::Bearer),
        );
        let mut inner = self.inner.lock();
        inner.counted.clear();
        match messages {
            Ok(c) => inner.counters.unread_messages = c.count,
            Err(e) => debug!(error = %e, "unread message count unavailable"),
        }
        match notifications {
            Ok(c) => inner.counters.unread_notifications = c.count,
            Err(e) => debug!(error = %e, "unread notification count unavailable"),
        }
    }

    /// Forget per-user state on logout. Preferences stay.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.counters = Counters::default();
        inner.counted.clear();
        inner.online.clear();
        inner.me = None;
        inner.active_conversation = None;
    }
}
