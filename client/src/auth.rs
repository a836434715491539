use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use time::{Duration, OffsetDateTime};

/// Claims the client reads from an access token. The signature is the
/// backend's business; only the expiry matters locally.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
pub struct Claims {
    #[serde(default)]
    pub sub: Option<String>,
    pub exp: i64,
}

/// Decode the payload segment of a JWT without verifying it.
pub fn peek_claims(token: &str) -> Option<Claims> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Determine if a token should be refreshed given a threshold duration.
/// Opaque tokens (no readable `exp`) are never refreshed proactively.
pub fn needs_refresh(token: &str, within: Duration) -> bool {
    match peek_claims(token) {
        Some(claims) => {
            let now = OffsetDateTime::now_utc().unix_timestamp();
            claims.exp - now < within.whole_seconds()
        }
        None => false,
    }
}

#[cfg(test)]
pub(crate) fn fake_jwt(sub: &str, exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{sub}","exp":{exp}}}"#));
    format!("{header}.{payload}.sig")
}
