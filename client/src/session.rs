use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::StatusCode;
use ride_api::{
    AuthResponse, LogoutRequest, OtpSendRequest, OtpVerifyRequest, RefreshRequest,
    RefreshResponse, User,
};
use time::Duration;
use tracing::{info, warn};

use crate::{
    auth,
    error::{ClientError, ClientResult},
    forms::{self, ChangePasswordForm, LoginForm, SignupForm},
    http::{ApiClient, Auth},
    storage::{Storage, KEY_REFRESH_TOKEN},
};

/// What a view should render while the session settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Bootstrap has not finished; show a placeholder.
    Loading,
    Authenticated,
    /// No usable credential; redirect to login.
    Anonymous,
}

/// Current user plus credentials. The access token lives only in memory
/// (inside the shared [`ApiClient`]); the refresh credential is persisted.
pub struct SessionStore {
    api: ApiClient,
    storage: Arc<Storage>,
    user: RwLock<Option<User>>,
    status: RwLock<SessionStatus>,
}

impl SessionStore {
    pub fn new(api: ApiClient, storage: Arc<Storage>) -> Self {
        Self {
            api,
            storage,
            user: RwLock::new(None),
            status: RwLock::new(SessionStatus::Loading),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.read()
    }

    pub fn current_user(&self) -> Option<User> {
        self.user.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.status() == SessionStatus::Authenticated
    }

    /// Replace the cached user record, e.g. after a profile edit.
    pub fn set_user(&self, user: User) {
        *self.user.write() = Some(user);
    }

    /// Exchange the persisted refresh credential for an access token and the
    /// user record. One attempt; any failure leaves the session anonymous.
    pub async fn bootstrap(&self) -> SessionStatus {
        *self.status.write() = SessionStatus::Loading;
        let Some(refresh) = self.storage.get_as::<String>(KEY_REFRESH_TOKEN).await else {
            self.clear();
            return SessionStatus::Anonymous;
        };
        match self.restore(&refresh).await {
            Ok(user) => {
                info!(user = %user.username, "session restored");
                *self.user.write() = Some(user);
                *self.status.write() = SessionStatus::Authenticated;
            }
            Err(e) => {
                warn!(error = %e, "session bootstrap failed");
                if credential_rejected(&e) {
                    if let Err(e) = self.storage.remove(KEY_REFRESH_TOKEN).await {
                        warn!(error = %e, "could not drop rejected refresh token");
                    }
                }
                self.clear();
            }
        }
        self.status()
    }

    async fn restore(&self, refresh: &str) -> ClientResult<User> {
        let resp: RefreshResponse = self
            .api
            .post(
                "/auth/refresh",
                &RefreshRequest {
                    refresh_token: refresh.to_string(),
                },
                Auth::Public,
            )
            .await?;
        self.api.set_token(Some(resp.access_token));
        if let Some(rotated) = resp.refresh_token {
            self.storage.put(KEY_REFRESH_TOKEN, rotated).await?;
        }
        self.api.get("/users/me", Auth::Bearer).await
    }

    pub async fn login(&self, form: &LoginForm) -> ClientResult<User> {
        let req = form.validate()?;
        let resp: AuthResponse = self.api.post("/auth/login", &req, Auth::Public).await?;
        self.establish(resp).await
    }

    pub async fn signup(&self, form: &SignupForm) -> ClientResult<User> {
        let req = form.validate()?;
        let resp: AuthResponse = self.api.post("/auth/signup", &req, Auth::Public).await?;
        self.establish(resp).await
    }

    async fn establish(&self, resp: AuthResponse) -> ClientResult<User> {
        if resp.user.is_suspended {
            return Err(ClientError::validation("This account is suspended"));
        }
        self.api.set_token(Some(resp.access_token));
        if let Some(refresh) = resp.refresh_token {
            self.storage.put(KEY_REFRESH_TOKEN, refresh).await?;
        }
        info!(user = %resp.user.username, "logged in");
        *self.user.write() = Some(resp.user.clone());
        *self.status.write() = SessionStatus::Authenticated;
        Ok(resp.user)
    }

    /// Tell the backend (best effort) and forget every credential locally.
    pub async fn logout(&self) -> ClientResult<()> {
        let refresh_token = self.storage.get_as::<String>(KEY_REFRESH_TOKEN).await;
        if self.api.has_token() {
            if let Err(e) = self
                .api
                .post_unit("/auth/logout", &LogoutRequest { refresh_token }, Auth::Bearer)
                .await
            {
                warn!(error = %e, "logout request failed");
            }
        }
        self.clear();
        self.storage.remove(KEY_REFRESH_TOKEN).await
    }

    pub async fn change_password(&self, form: &ChangePasswordForm) -> ClientResult<()> {
        let req = form.validate()?;
        self.api
            .post_unit("/auth/change-password", &req, Auth::Bearer)
            .await
    }

    pub async fn send_otp(&self, email: &str) -> ClientResult<()> {
        let email = forms::validate_email(email)?;
        self.api
            .post_unit(
                "/auth/otp/send",
                &OtpSendRequest {
                    email: email.to_string(),
                },
                Auth::Public,
            )
            .await
    }

    pub async fn verify_otp(&self, email: &str, code: &str) -> ClientResult<()> {
        let email = forms::validate_email(email)?;
        let otp = forms::validate_otp(code)?;
        self.api
            .post_unit(
                "/auth/otp/verify",
                &OtpVerifyRequest {
                    email: email.to_string(),
                    otp: otp.to_string(),
                },
                Auth::Public,
            )
            .await
    }

    /// Refresh the access token if it expires within `within`. Returns whether
    /// a refresh happened.
    pub async fn ensure_fresh(&self, within: Duration) -> ClientResult<bool> {
        let token = self.api.token().ok_or(ClientError::NotAuthenticated)?;
        if !auth::needs_refresh(&token, within) {
            return Ok(false);
        }
        let refresh = self
            .storage
            .get_as::<String>(KEY_REFRESH_TOKEN)
            .await
            .ok_or(ClientError::Unauthorized)?;
        let resp: RefreshResponse = self
            .api
            .post(
                "/auth/refresh",
                &RefreshRequest {
                    refresh_token: refresh,
                },
                Auth::Public,
            )
            .await?;
        self.api.set_token(Some(resp.access_token));
        if let Some(rotated) = resp.refresh_token {
            self.storage.put(KEY_REFRESH_TOKEN, rotated).await?;
        }
        Ok(true)
    }

    fn clear(&self) {
        self.api.set_token(None);
        *self.user.write() = None;
        *self.status.write() = SessionStatus::Anonymous;
    }
}

fn credential_rejected(err: &ClientError) -> bool {
    matches!(
        err.status(),
        Some(StatusCode::UNAUTHORIZED) | Some(StatusCode::FORBIDDEN)
    )
}
