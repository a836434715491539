use ride_api::{Notification, ServerEvent};

use crate::{
    error::{ClientError, ClientResult},
    http::{ApiClient, Auth},
    state::UiState,
    view::{Loadable, ViewState},
};

pub async fn list_notifications(api: &ApiClient) -> ClientResult<Vec<Notification>> {
    api.get("/notifications", Auth::Bearer).await
}

pub async fn mark_read(api: &ApiClient, id: &str) -> ClientResult<()> {
    api.post_unit(
        &format!("/notifications/{id}/read"),
        &serde_json::json!({}),
        Auth::Bearer,
    )
    .await
}

pub async fn mark_all_read(api: &ApiClient) -> ClientResult<()> {
    api.post_unit("/notifications/read-all", &serde_json::json!({}), Auth::Bearer)
        .await
}

/// Notification list, newest first, unique by id.
pub struct NotificationFeed {
    state: ViewState<Vec<Notification>>,
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationFeed {
    pub fn new() -> Self {
        Self {
            state: ViewState::new(),
        }
    }

    pub async fn reload(&self, api: &ApiClient) {
        self.state
            .load(|| async {
                let mut list = list_notifications(api).await?;
                list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                Ok::<_, ClientError>(list)
            })
            .await;
    }

    pub fn snapshot(&self) -> Loadable<Vec<Notification>> {
        self.state.snapshot()
    }

    pub fn unread(&self) -> usize {
        self.state
            .snapshot()
            .ready()
            .map(|l| l.iter().filter(|n| !n.read).count())
            .unwrap_or(0)
    }

    /// Prepend a pushed notification unless its id is already listed.
    pub fn push(&self, n: Notification) -> bool {
        let mut added = false;
        self.state.update(|list| {
            if !list.iter().any(|x| x.id == n.id) {
                list.insert(0, n);
                added = true;
            }
        });
        added
    }

    pub fn apply(&self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::NewNotification(n) => self.push(n.clone()),
            _ => false,
        }
    }

    /// Mark one entry read on the backend, then locally. The badge only moves
    /// when the entry was unread.
    pub async fn read(&self, api: &ApiClient, ui: &UiState, id: &str) -> ClientResult<()> {
        mark_read(api, id).await?;
        let mut was_unread = false;
        self.state.update(|list| {
            if let Some(n) = list.iter_mut().find(|n| n.id == id) {
                was_unread = !n.read;
                n.read = true;
            }
        });
        if was_unread {
            ui.notification_read();
        }
        Ok(())
    }

    pub async fn read_all(&self, api: &ApiClient, ui: &UiState) -> ClientResult<()> {
        mark_all_read(api).await?;
        self.state.update(|list| list.iter_mut().for_each(|n| n.read = true));
        ui.set_unread_notifications(0);
        Ok(())
    }
}
