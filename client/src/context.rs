use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use ride_api::{ServerEvent, User};
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    config::Config,
    error::{ClientError, ClientResult},
    forms::{LoginForm, SignupForm},
    geo::PlaceSearch,
    http::ApiClient,
    profile::UserSearch,
    realtime::RealtimeChannel,
    session::{SessionStatus, SessionStore},
    state::UiState,
    storage::Storage,
    upload::ImageUploader,
};

const EVENT_BUFFER: usize = 256;
/// Access tokens closer than this to expiry are renewed before use.
pub const REFRESH_MARGIN: time::Duration = time::Duration::minutes(1);

/// Everything a view needs, handed down explicitly instead of living in
/// globals. Build one per running client.
pub struct Context {
    pub config: Config,
    pub api: ApiClient,
    pub storage: Arc<Storage>,
    pub session: SessionStore,
    pub ui: UiState,
    pub realtime: RealtimeChannel,
    ui_pump: Mutex<Option<JoinHandle<()>>>,
}

impl Context {
    pub async fn new(config: Config) -> ClientResult<Arc<Self>> {
        let api = ApiClient::new(config.api_base_url.clone(), config.request_timeout)?;
        let storage = Arc::new(Storage::open(&config.data_dir).await?);
        let session = SessionStore::new(api.clone(), storage.clone());
        let ui = UiState::load(storage.clone()).await;
        Ok(Arc::new(Self {
            config,
            api,
            storage,
            session,
            ui,
            realtime: RealtimeChannel::new(EVENT_BUFFER),
            ui_pump: Mutex::new(None),
        }))
    }

    /// Restore the previous session, if any, and bring up the live parts.
    pub async fn start(self: &Arc<Self>) -> SessionStatus {
        let status = self.resume().await;
        if status == SessionStatus::Authenticated {
            self.go_live().await;
        }
        status
    }

    /// Restore the previous session and the badge counts, without opening
    /// the real-time channel.
    pub async fn resume(&self) -> SessionStatus {
        let status = self.session.bootstrap().await;
        if status == SessionStatus::Authenticated {
            self.fresh_api().await;
            self.load_user_state().await;
        }
        status
    }

    pub async fn login(self: &Arc<Self>, form: &LoginForm) -> ClientResult<User> {
        let user = self.session.login(form).await?;
        self.load_user_state().await;
        self.go_live().await;
        Ok(user)
    }

    pub async fn signup(self: &Arc<Self>, form: &SignupForm) -> ClientResult<User> {
        let user = self.session.signup(form).await?;
        self.load_user_state().await;
        self.go_live().await;
        Ok(user)
    }

    /// Tear down the socket first, then drop per-user state and credentials.
    pub async fn logout(&self) -> ClientResult<()> {
        self.realtime.disconnect().await;
        if let Some(pump) = self.ui_pump.lock().take() {
            pump.abort();
        }
        self.ui.reset();
        self.session.logout().await
    }

    pub fn me(&self) -> ClientResult<User> {
        self.session
            .current_user()
            .ok_or(ClientError::NotAuthenticated)
    }

    /// The API client, after renewing an access token that is about to
    /// expire. A failed renewal is logged; the next request then reports it.
    pub async fn fresh_api(&self) -> &ApiClient {
        if self.session.is_authenticated() {
            match self.session.ensure_fresh(REFRESH_MARGIN).await {
                Ok(true) => info!("access token renewed"),
                Ok(false) => {}
                Err(e) => warn!(error = %e, "access token renewal failed"),
            }
        }
        &self.api
    }

    /// Open the real-time channel for the signed-in user.
    pub async fn connect_realtime(self: &Arc<Self>) -> ClientResult<()> {
        if !self.session.is_authenticated() {
            return Err(ClientError::NotAuthenticated);
        }
        let me = self.me()?;
        self.spawn_ui_pump();
        self.realtime.connect(&self.config.socket_url, &me.id).await
    }

    async fn load_user_state(&self) {
        let Some(me) = self.session.current_user() else {
            return;
        };
        self.ui.set_me(Some(me.id));
        self.ui.refresh_counts(&self.api).await;
    }

    async fn go_live(self: &Arc<Self>) {
        // views still work by fetching when push is down
        if let Err(e) = self.connect_realtime().await {
            warn!(error = %e, "realtime channel unavailable");
        }
    }

    fn spawn_ui_pump(self: &Arc<Self>) {
        let mut slot = self.ui_pump.lock();
        if slot.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            return;
        }
        let rx = self.realtime.subscribe();
        let ctx = Arc::downgrade(self);
        *slot = Some(tokio::spawn(pump_ui(ctx, rx)));
    }

    pub fn place_search(&self) -> PlaceSearch {
        PlaceSearch::new(
            self.api.http().clone(),
            self.config.geocode_url.clone(),
            self.config.search_debounce,
        )
    }

    pub fn user_search(&self) -> UserSearch {
        UserSearch::new(self.config.search_debounce)
    }

    pub fn uploader(&self) -> ImageUploader {
        ImageUploader::new(
            self.api.http().clone(),
            self.config.upload_url.clone(),
            self.config.upload_preset.clone(),
        )
    }
}

async fn pump_ui(ctx: Weak<Context>, mut rx: tokio::sync::broadcast::Receiver<ServerEvent>) {
    loop {
        let ev = match rx.recv().await {
            Ok(ev) => ev,
            Err(RecvError::Lagged(n)) => {
                warn!(skipped = n, "ui state fell behind realtime events");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let Some(strong) = ctx.upgrade() else { break };
        if strong.ui.apply(&ev) {
            if let ServerEvent::NewNotification(n) = &ev {
                info!(notification = %n.id, "{}", n.message);
            }
        }
    }
}
