use ride_api::{ComplaintRequest, ProfileUpdate, RatingRequest, User};
use tracing::info;

use crate::{
    debounce::Debouncer,
    error::{ClientError, ClientResult},
    http::{ApiClient, Auth},
    session::SessionStore,
    view::{Loadable, ViewState},
};

pub const MIN_COMPLAINT_LEN: usize = 10;

pub async fn get_profile(api: &ApiClient, username: &str) -> ClientResult<User> {
    api.get(&format!("/users/{username}"), Auth::Bearer).await
}

pub async fn search_users(api: &ApiClient, query: &str) -> ClientResult<Vec<User>> {
    api.get_query("/users/search", &[("q", query)], Auth::Bearer)
        .await
}

/// Update the signed-in user and refresh the session's copy.
pub async fn update_me(session: &SessionStore, update: &ProfileUpdate) -> ClientResult<User> {
    if let Some(name) = &update.fullname {
        if name.trim().is_empty() {
            return Err(ClientError::validation("Full name is required"));
        }
    }
    let user: User = session
        .api()
        .patch("/users/me", update, Auth::Bearer)
        .await?;
    session.set_user(user.clone());
    Ok(user)
}

pub async fn rate_user(api: &ApiClient, rating: &RatingRequest) -> ClientResult<()> {
    if !(1..=5).contains(&rating.score) {
        return Err(ClientError::validation("Rating must be between 1 and 5"));
    }
    api.post_unit("/ratings", rating, Auth::Bearer).await?;
    info!(user = %rating.user_id, ride = %rating.ride_id, "rating sent");
    Ok(())
}

pub async fn file_complaint(api: &ApiClient, complaint: &ComplaintRequest) -> ClientResult<()> {
    if complaint.description.trim().chars().count() < MIN_COMPLAINT_LEN {
        return Err(ClientError::validation(format!(
            "Please describe the problem in at least {MIN_COMPLAINT_LEN} characters"
        )));
    }
    api.post_unit("/complaints", complaint, Auth::Bearer).await
}

pub struct ProfileView {
    username: String,
    state: ViewState<User>,
}

impl ProfileView {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            state: ViewState::new(),
        }
    }

    pub async fn load(&self, api: &ApiClient) {
        self.state.load(|| get_profile(api, &self.username)).await;
    }

    pub fn snapshot(&self) -> Loadable<User> {
        self.state.snapshot()
    }
}

/// People search box. Keystrokes are debounced; an empty box clears results.
pub struct UserSearch {
    debouncer: Debouncer,
    results: ViewState<Vec<User>>,
}

impl UserSearch {
    pub fn new(debounce: std::time::Duration) -> Self {
        Self {
            debouncer: Debouncer::new(debounce),
            results: ViewState::new(),
        }
    }

    /// Returns false when a newer keystroke superseded this one, including
    /// while its search was in flight.
    pub async fn input(&self, api: &ApiClient, query: &str) -> bool {
        let query = query.trim();
        if query.is_empty() {
            self.debouncer.cancel();
            self.results.set(Loadable::Ready(Vec::new()));
            return true;
        }
        let Some(generation) = self.debouncer.settle().await else {
            return false;
        };
        self.results
            .load_if_current(
                || search_users(api, query),
                || self.debouncer.is_current(generation),
            )
            .await
    }

    pub fn results(&self) -> Loadable<Vec<User>> {
        self.results.snapshot()
    }
}
