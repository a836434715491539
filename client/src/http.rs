use std::{sync::Arc, time::Duration};

use parking_lot::RwLock;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use ride_api::ErrorBody;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{ClientError, ClientResult};

/// Whether a call carries the session's bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    Bearer,
    Public,
}

/// Thin wrapper over `reqwest` bound to the backend base URL.
///
/// Clones share the HTTP connection pool and the access token, so a token set
/// by the session store is seen by every view holding a clone.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    pub fn new(base: Url, timeout: Duration) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("campus-rides/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base,
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// The underlying HTTP client, for third-party services that take no token.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn has_token(&self) -> bool {
        self.token.read().is_some()
    }

    /// Resolve an API path such as `/rides/42` against the base URL.
    pub fn url(&self, path: &str) -> ClientResult<Url> {
        join_path(&self.base, path)
    }

    fn request(&self, method: Method, path: &str, auth: Auth) -> ClientResult<RequestBuilder> {
        let url = self.url(path)?;
        debug!(%method, %url, ?auth, "api request");
        let rb = self.http.request(method, url);
        match auth {
            Auth::Public => Ok(rb),
            Auth::Bearer => match self.token() {
                Some(token) => Ok(rb.bearer_auth(token)),
                None => Err(ClientError::NotAuthenticated),
            },
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, auth: Auth) -> ClientResult<T> {
        let rb = self.request(Method::GET, path, auth)?;
        decode(execute(rb, auth).await?).await
    }

    pub async fn get_query<Q, T>(&self, path: &str, query: &Q, auth: Auth) -> ClientResult<T>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let rb = self.request(Method::GET, path, auth)?.query(query);
        decode(execute(rb, auth).await?).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B, auth: Auth) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let rb = self.request(Method::POST, path, auth)?.json(body);
        decode(execute(rb, auth).await?).await
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B, auth: Auth) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let rb = self.request(Method::PATCH, path, auth)?.json(body);
        decode(execute(rb, auth).await?).await
    }

    /// POST whose response body is irrelevant.
    pub async fn post_unit<B>(&self, path: &str, body: &B, auth: Auth) -> ClientResult<()>
    where
        B: Serialize + ?Sized,
    {
        let rb = self.request(Method::POST, path, auth)?.json(body);
        execute(rb, auth).await?;
        Ok(())
    }
}

/// Append `path` to `base`, keeping any path prefix `base` already has.
pub(crate) fn join_path(base: &Url, path: &str) -> ClientResult<Url> {
    let mut raw = base.as_str().trim_end_matches('/').to_string();
    if !path.starts_with('/') {
        raw.push('/');
    }
    raw.push_str(path);
    Ok(Url::parse(&raw)?)
}

async fn execute(rb: RequestBuilder, auth: Auth) -> ClientResult<Response> {
    let resp = rb.send().await?;
    check_status(resp, auth).await
}

async fn check_status(resp: Response, auth: Auth) -> ClientResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::UNAUTHORIZED && auth == Auth::Bearer {
        debug!("bearer token rejected");
        return Err(ClientError::Unauthorized);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::Api {
        status,
        message: error_message(status, &body),
    })
}

/// Status check for third-party calls, which never carry the session token.
pub(crate) async fn ensure_success(resp: Response) -> ClientResult<Response> {
    check_status(resp, Auth::Public).await
}

/// Extract the server-provided message, falling back to the raw body or reason phrase.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    if let Some(text) = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.text().map(str::to_string))
        .filter(|m| !m.is_empty())
    {
        return text;
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() && !trimmed.starts_with('{') {
        return trimmed.to_string();
    }
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}

pub(crate) async fn decode<T: DeserializeOwned>(resp: Response) -> ClientResult<T> {
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
