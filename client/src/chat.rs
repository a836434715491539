use std::collections::HashSet;

use parking_lot::Mutex;
use ride_api::{Conversation, Message, SendMessage, ServerEvent};
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    error::{ClientError, ClientResult},
    http::{ApiClient, Auth},
    state::UiState,
    view::{Loadable, ViewState},
};

pub async fn list_conversations(api: &ApiClient) -> ClientResult<Vec<Conversation>> {
    api.get("/chat/conversations", Auth::Bearer).await
}

pub async fn fetch_messages(api: &ApiClient, conversation_id: &str) -> ClientResult<Vec<Message>> {
    api.get(
        &format!("/chat/conversations/{conversation_id}/messages"),
        Auth::Bearer,
    )
    .await
}

pub async fn post_message(api: &ApiClient, msg: &SendMessage) -> ClientResult<Message> {
    api.post("/chat/messages", msg, Auth::Bearer).await
}

pub async fn mark_seen(api: &ApiClient, conversation_id: &str) -> ClientResult<()> {
    api.post_unit(
        &format!("/chat/conversations/{conversation_id}/seen"),
        &serde_json::json!({}),
        Auth::Bearer,
    )
    .await
}

/// Inbox: one row per conversation, most recent activity first.
pub struct ConversationList {
    state: ViewState<Vec<Conversation>>,
    /// Ids of messages already folded into a row.
    seen: Mutex<HashSet<String>>,
}

impl Default for ConversationList {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationList {
    pub fn new() -> Self {
        Self {
            state: ViewState::new(),
            seen: Mutex::new(HashSet::new()),
        }
    }

    pub async fn reload(&self, api: &ApiClient) {
        self.state.load(|| list_conversations(api)).await;
        let mut seen = self.seen.lock();
        seen.clear();
        if let Some(list) = self.state.snapshot().ready() {
            seen.extend(
                list.iter()
                    .filter_map(|c| c.last_message.as_ref())
                    .map(|m| m.id.clone()),
            );
        }
    }

    pub fn snapshot(&self) -> Loadable<Vec<Conversation>> {
        self.state.snapshot()
    }

    /// Bump the conversation a pushed message belongs to. Unknown
    /// conversations need a reload to appear. A message id is counted once,
    /// and an older message never replaces a newer preview.
    pub fn apply(&self, event: &ServerEvent, me: &str) -> bool {
        let ServerEvent::NewMessage(msg) = event else {
            return false;
        };
        let mut seen = self.seen.lock();
        if seen.contains(&msg.id) {
            debug!(id = %msg.id, "message already in inbox");
            return false;
        }
        let mut found = false;
        self.state.update(|list| {
            let Some(pos) = list.iter().position(|c| c.id == msg.conversation_id) else {
                return;
            };
            found = true;
            if msg.sender_id != me {
                list[pos].unread_count += 1;
            }
            let newer = list[pos]
                .last_message
                .as_ref()
                .map_or(true, |last| msg.created_at >= last.created_at);
            if newer {
                let mut conv = list.remove(pos);
                conv.last_message = Some(msg.clone());
                list.insert(0, conv);
            }
        });
        if found {
            seen.insert(msg.id.clone());
        }
        found
    }

    /// Clear the unread marker of one conversation, returning how many were cleared.
    pub fn clear_unread(&self, conversation_id: &str) -> u32 {
        let mut cleared = 0;
        self.state.update(|list| {
            if let Some(conv) = list.iter_mut().find(|c| c.id == conversation_id) {
                cleared = std::mem::take(&mut conv.unread_count);
            }
        });
        cleared
    }
}

/// Messages of one conversation, oldest first.
///
/// Entries are unique by id: a pushed echo of a message already shown (for
/// instance one sent from here) is dropped. Outgoing messages appear at once
/// and are withdrawn if the backend refuses them.
pub struct ChatThread {
    conversation_id: String,
    messages: Mutex<Vec<Message>>,
    pending: Mutex<HashSet<String>>,
    status: Mutex<Loadable<()>>,
}

impl ChatThread {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            messages: Mutex::new(Vec::new()),
            pending: Mutex::new(HashSet::new()),
            status: Mutex::new(Loadable::Idle),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    pub fn status(&self) -> Loadable<()> {
        self.status.lock().clone()
    }

    /// Whether `id` was sent from here and is awaiting the backend.
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.lock().contains(id)
    }

    /// Fetch the thread. Local messages still in flight are kept.
    pub async fn load(&self, api: &ApiClient) {
        *self.status.lock() = Loadable::Loading;
        match fetch_messages(api, &self.conversation_id).await {
            Ok(mut fetched) => {
                let pending = self.pending.lock().clone();
                let mut msgs = self.messages.lock();
                let known: HashSet<String> = fetched.iter().map(|m| m.id.clone()).collect();
                fetched.extend(
                    msgs.iter()
                        .filter(|m| pending.contains(&m.id) && !known.contains(&m.id))
                        .cloned(),
                );
                fetched.sort_by_key(|m| m.created_at);
                *msgs = fetched;
                *self.status.lock() = Loadable::Ready(());
            }
            Err(e) => {
                warn!(conversation = %self.conversation_id, error = %e, "could not load messages");
                *self.status.lock() = Loadable::Failed(e.to_string());
            }
        }
    }

    /// Append a message received from elsewhere. Returns false when it was
    /// ignored (other conversation or id already present).
    pub fn merge_incoming(&self, msg: Message) -> bool {
        if msg.conversation_id != self.conversation_id {
            return false;
        }
        let mut msgs = self.messages.lock();
        if msgs.iter().any(|m| m.id == msg.id) {
            debug!(id = %msg.id, "duplicate message ignored");
            return false;
        }
        msgs.push(msg);
        true
    }

    pub fn apply(&self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::NewMessage(msg) => self.merge_incoming(msg.clone()),
            _ => false,
        }
    }

    /// Optimistic send: show first, then ask the backend, roll back on failure.
    pub async fn send(&self, api: &ApiClient, sender_id: &str, text: &str) -> ClientResult<Message> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::validation("Message cannot be empty"));
        }
        let local = Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: self.conversation_id.clone(),
            sender_id: sender_id.to_string(),
            text: text.to_string(),
            created_at: OffsetDateTime::now_utc(),
            seen: false,
        };
        self.messages.lock().push(local.clone());
        self.pending.lock().insert(local.id.clone());

        let res = post_message(
            api,
            &SendMessage {
                id: local.id.clone(),
                conversation_id: self.conversation_id.clone(),
                text: local.text.clone(),
            },
        )
        .await;
        self.pending.lock().remove(&local.id);

        let mut msgs = self.messages.lock();
        match res {
            Ok(confirmed) => {
                let echoed = confirmed.id != local.id && msgs.iter().any(|m| m.id == confirmed.id);
                match msgs.iter().position(|m| m.id == local.id) {
                    Some(pos) if echoed => {
                        msgs.remove(pos);
                    }
                    Some(pos) => msgs[pos] = confirmed.clone(),
                    None if !echoed => msgs.push(confirmed.clone()),
                    None => {}
                }
                Ok(confirmed)
            }
            Err(e) => {
                msgs.retain(|m| m.id != local.id);
                warn!(conversation = %self.conversation_id, error = %e, "message rolled back");
                Err(e)
            }
        }
    }

    /// Load the thread as the conversation on screen: pushed messages for
    /// it stop moving the unread badge until [`close`](Self::close).
    pub async fn open(&self, api: &ApiClient, ui: &UiState) {
        ui.set_active_conversation(Some(self.conversation_id.clone()));
        self.load(api).await;
    }

    pub fn close(&self, ui: &UiState) {
        if ui.active_conversation().as_deref() == Some(self.conversation_id.as_str()) {
            ui.set_active_conversation(None);
        }
    }

    /// Mark the thread read everywhere it shows: backend, inbox row and
    /// header badge. Returns how much the badge dropped.
    pub async fn mark_read(
        &self,
        api: &ApiClient,
        ui: &UiState,
        inbox: &ConversationList,
        me: &str,
    ) -> ClientResult<u32> {
        let seen = self.mark_seen(api, me).await?;
        let read = inbox.clear_unread(&self.conversation_id).max(seen);
        ui.messages_read(read);
        Ok(read)
    }

    /// Tell the backend the thread was read and flag peer messages seen locally.
    /// Returns how many messages changed.
    pub async fn mark_seen(&self, api: &ApiClient, me: &str) -> ClientResult<u32> {
        mark_seen(api, &self.conversation_id).await?;
        let mut changed = 0;
        for m in self.messages.lock().iter_mut() {
            if m.sender_id != me && !m.seen {
                m.seen = true;
                changed += 1;
            }
        }
        Ok(changed)
    }
}
