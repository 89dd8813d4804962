//! OAuth 2.0 device authorization grant (RFC 8628).
//!
//! `m365chat login` requests a device code, sends the user to the
//! verification URL in a browser, and polls the token endpoint until the
//! user completes sign-in. The resulting tokens are persisted through the
//! credentials store. Refreshing an expired access token goes through the
//! same token endpoint with the refresh grant.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use base64::Engine;
use serde::Deserialize;
use time::OffsetDateTime;

use crate::auth::{CLIENT_ID, Credentials, CredentialsStore, device_code_url, scope_string, token_url};
use crate::client::{DEFAULT_TIMEOUT, shared_http};
use crate::error::{Error, Result};
use crate::observability::TOKEN_REFRESHES;

/// Fallback token lifetime when neither the response nor the JWT carries an
/// expiry (15 minutes).
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 900;

/// How often the polling sleep checks the cancellation flag.
const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Response from the device authorization endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeResponse {
    /// Opaque code the client polls with.
    pub device_code: String,
    /// Short code the user types at the verification URL.
    #[serde(default)]
    pub user_code: Option<String>,
    /// URL the user visits to complete sign-in.
    pub verification_uri: String,
    /// Lifetime of the device code, in seconds.
    pub expires_in: u64,
    /// Server-requested polling interval, in seconds.
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    5
}

/// Successful response from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// The bearer token.
    pub access_token: String,
    /// Refresh token, present when offline_access was granted.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access-token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Error response from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Run the device authorization flow and persist the resulting credentials.
///
/// Prints the verification URL and user code, opens the browser, then polls
/// at the server-specified interval. The `cancel` flag is checked every
/// 100ms during polling sleeps so Ctrl+C takes effect promptly.
pub async fn login(store: &CredentialsStore, cancel: &AtomicBool) -> Result<Credentials> {
    let client = shared_http()?;

    let response = client
        .post(device_code_url())
        .timeout(DEFAULT_TIMEOUT)
        .form(&[("client_id", CLIENT_ID), ("scope", &scope_string())])
        .send()
        .await
        .map_err(map_transport_error)?;
    if !response.status().is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::authentication(format!(
            "Device code request failed: {body}"
        )));
    }
    let device_code: DeviceCodeResponse = response
        .json()
        .await
        .map_err(|e| Error::serialization(format!("Malformed device code response: {e}"), Some(Box::new(e))))?;

    let user_code = device_code.user_code.as_deref().unwrap_or("(see URL)");
    println!("Open this URL in your browser:");
    println!("  {}", device_code.verification_uri);
    println!("  Code: {user_code}");
    println!();
    if open::that(&device_code.verification_uri).is_ok() {
        println!("Browser opened automatically.");
        println!();
    }
    println!("Waiting for authorization (Ctrl+C to cancel)...");

    let credentials = poll_for_tokens(&device_code, cancel).await?;
    store.save(&credentials)?;

    let account = credentials.account.as_deref().unwrap_or("user");
    println!("Signed in as {account}");
    Ok(credentials)
}

/// Sign out by clearing the token cache.
pub fn logout(store: &CredentialsStore) -> Result<()> {
    store.clear()?;
    println!("Signed out. Token cache cleared.");
    Ok(())
}

/// Redeem an expired access token with the refresh grant and persist the
/// result.
pub async fn refresh(store: &CredentialsStore, refresh_token: &str) -> Result<Credentials> {
    refresh_with_endpoint(store, refresh_token, &token_url()).await
}

async fn refresh_with_endpoint(
    store: &CredentialsStore,
    refresh_token: &str,
    endpoint: &str,
) -> Result<Credentials> {
    TOKEN_REFRESHES.click();
    let client = shared_http()?;
    let response = client
        .post(endpoint)
        .timeout(DEFAULT_TIMEOUT)
        .form(&[
            ("grant_type", "refresh_token"),
            ("client_id", CLIENT_ID),
            ("refresh_token", refresh_token),
            ("scope", &scope_string()),
        ])
        .send()
        .await
        .map_err(map_transport_error)?;
    if !response.status().is_success() {
        let body = response.text().await.unwrap_or_default();
        let description = serde_json::from_str::<TokenErrorResponse>(&body)
            .ok()
            .and_then(|e| e.error_description)
            .unwrap_or(body);
        return Err(Error::authentication(format!(
            "Token refresh failed: {description}. Run 'm365chat login' to sign in again."
        )));
    }
    let tokens: TokenResponse = response
        .json()
        .await
        .map_err(|e| Error::serialization(format!("Malformed token response: {e}"), Some(Box::new(e))))?;
    let mut credentials = build_credentials(tokens);
    if credentials.refresh_token.is_none() {
        credentials.refresh_token = Some(refresh_token.to_string());
    }
    store.save(&credentials)?;
    Ok(credentials)
}

/// Poll the token endpoint until the user authorizes, the code expires, or
/// the flow is cancelled.
async fn poll_for_tokens(
    device_code: &DeviceCodeResponse,
    cancel: &AtomicBool,
) -> Result<Credentials> {
    let client = shared_http()?;
    let mut interval = Duration::from_secs(device_code.interval.max(1));
    let deadline = Instant::now() + Duration::from_secs(device_code.expires_in);

    while Instant::now() < deadline {
        if interruptible_sleep(interval, cancel).await {
            return Err(Error::authentication("Authentication cancelled"));
        }

        let response = client
            .post(token_url())
            .timeout(DEFAULT_TIMEOUT)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
                ("client_id", CLIENT_ID),
                ("device_code", &device_code.device_code),
            ])
            .send()
            .await
            .map_err(map_transport_error)?;

        if response.status().is_success() {
            let tokens: TokenResponse = response.json().await.map_err(|e| {
                Error::serialization(format!("Malformed token response: {e}"), Some(Box::new(e)))
            })?;
            return Ok(build_credentials(tokens));
        }

        let body = response.text().await.unwrap_or_default();
        let Ok(error) = serde_json::from_str::<TokenErrorResponse>(&body) else {
            return Err(Error::authentication(format!("Sign-in failed: {body}")));
        };
        match error.error.as_str() {
            "authorization_pending" => continue,
            "slow_down" => {
                interval += Duration::from_secs(5);
            }
            "access_denied" => {
                return Err(Error::authentication("Sign-in was denied"));
            }
            "expired_token" => {
                return Err(Error::authentication(
                    "The sign-in request expired. Run 'm365chat login' again.",
                ));
            }
            _ => {
                let description = error.error_description.unwrap_or(error.error);
                return Err(Error::authentication(format!("Sign-in failed: {description}")));
            }
        }
    }

    Err(Error::authentication(
        "The sign-in request expired. Run 'm365chat login' again.",
    ))
}

/// Sleep for the given duration, checking the cancellation flag every
/// 100ms. Returns true when cancelled.
async fn interruptible_sleep(duration: Duration, cancel: &AtomicBool) -> bool {
    let start = Instant::now();
    while start.elapsed() < duration {
        if cancel.load(Ordering::SeqCst) {
            return true;
        }
        let remaining = duration.saturating_sub(start.elapsed());
        tokio::time::sleep(remaining.min(CANCEL_CHECK_INTERVAL)).await;
    }
    cancel.load(Ordering::SeqCst)
}

/// Build credentials from a token response.
///
/// Expiry comes from `expires_in`, falling back to the JWT `exp` claim,
/// then a 15-minute default. The account name comes from the JWT
/// `preferred_username` claim when present.
fn build_credentials(tokens: TokenResponse) -> Credentials {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let expires_at = match tokens.expires_in {
        Some(expires_in) => now + expires_in as i64,
        None => jwt_claim_i64(&tokens.access_token, "exp")
            .unwrap_or(now + DEFAULT_TOKEN_LIFETIME_SECS as i64),
    };
    let account = jwt_claim_string(&tokens.access_token, "preferred_username");
    Credentials {
        access_token: Some(tokens.access_token),
        refresh_token: tokens.refresh_token,
        expires_at: Some(expires_at),
        account,
    }
}

/// Decode the payload of a JWT without verifying its signature.
///
/// Signature verification is the server's job; the client only reads
/// advisory claims (expiry, account name).
fn jwt_payload(token: &str) -> Option<serde_json::Value> {
    let payload = token.split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn jwt_claim_i64(token: &str, claim: &str) -> Option<i64> {
    jwt_payload(token)?.get(claim)?.as_i64()
}

fn jwt_claim_string(token: &str, claim: &str) -> Option<String> {
    Some(jwt_payload(token)?.get(claim)?.as_str()?.to_string())
}

fn map_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::timeout(format!("Request timed out: {e}"), None)
    } else if e.is_connect() {
        Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
    } else {
        Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fake_jwt(payload: serde_json::Value) -> String {
        let header = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(br#"{"alg":"none"}"#);
        let body = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(serde_json::to_vec(&payload).unwrap());
        format!("{header}.{body}.sig")
    }

    #[test]
    fn jwt_claims_decode_without_verification() {
        let token = fake_jwt(serde_json::json!({
            "exp": 1234567890,
            "preferred_username": "user@example.com",
        }));
        assert_eq!(jwt_claim_i64(&token, "exp"), Some(1234567890));
        assert_eq!(
            jwt_claim_string(&token, "preferred_username").as_deref(),
            Some("user@example.com")
        );
        assert_eq!(jwt_claim_i64("not-a-jwt", "exp"), None);
    }

    #[test]
    fn build_credentials_prefers_expires_in() {
        let tokens = TokenResponse {
            access_token: "opaque".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_in: Some(3600),
        };
        let creds = build_credentials(tokens);
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let expires_at = creds.expires_at.unwrap();
        assert!((now + 3590..=now + 3610).contains(&expires_at));
        assert_eq!(creds.refresh_token.as_deref(), Some("refresh"));
    }

    #[test]
    fn build_credentials_falls_back_to_jwt_then_default() {
        let token = fake_jwt(serde_json::json!({"exp": 1234567890}));
        let creds = build_credentials(TokenResponse {
            access_token: token,
            refresh_token: None,
            expires_in: None,
        });
        assert_eq!(creds.expires_at, Some(1234567890));

        let creds = build_credentials(TokenResponse {
            access_token: "opaque".to_string(),
            refresh_token: None,
            expires_in: None,
        });
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let expires_at = creds.expires_at.unwrap();
        assert!((now + 890..=now + 910).contains(&expires_at));
    }

    #[tokio::test]
    async fn interruptible_sleep_detects_cancellation() {
        let cancel = AtomicBool::new(true);
        let start = Instant::now();
        assert!(interruptible_sleep(Duration::from_secs(5), &cancel).await);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn refresh_persists_new_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-access",
                "refresh_token": "new-refresh",
                "expires_in": 3600,
            })))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let store = CredentialsStore::with_path(temp.path().join("credentials.json"));
        let creds = refresh_with_endpoint(&store, "old-refresh", &server.uri())
            .await
            .unwrap();
        assert_eq!(creds.access_token.as_deref(), Some("new-access"));
        assert_eq!(creds.refresh_token.as_deref(), Some("new-refresh"));
        assert_eq!(store.load(), creds);
    }

    #[tokio::test]
    async fn refresh_failure_is_an_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "refresh token revoked",
            })))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let store = CredentialsStore::with_path(temp.path().join("credentials.json"));
        let err = refresh_with_endpoint(&store, "revoked", &server.uri())
            .await
            .unwrap_err();
        assert!(err.is_authentication());
        assert!(err.to_string().contains("refresh token revoked"));
    }
}
