//! Authentication for the Copilot API.
//!
//! Tokens are obtained through the OAuth 2.0 device authorization grant
//! against Microsoft Entra and cached on disk. The [`TokenSupplier`] trait
//! is the seam the API client consumes: one operation, "get the current
//! bearer token," which either returns a valid token or fails with an
//! authentication error. Interactive login never happens on the supplier
//! path; it is an explicit `m365chat login` step.

pub mod credentials;
pub mod device_flow;

pub use credentials::{Credentials, CredentialsStore};

use crate::error::{Error, Result};

/// Public client id for the application registration.
pub const CLIENT_ID: &str = "3c19e780-1d86-4317-800f-cc91904b4a25";

/// The Entra tenant ("common" for multi-tenant sign-in).
pub const TENANT_ID: &str = "common";

/// Required Microsoft Graph scopes for Copilot access.
pub const SCOPES: &[&str] = &[
    "https://graph.microsoft.com/Sites.Read.All",
    "https://graph.microsoft.com/Mail.Read",
    "https://graph.microsoft.com/People.Read.All",
    "https://graph.microsoft.com/OnlineMeetingTranscript.Read.All",
    "https://graph.microsoft.com/Chat.Read",
    "https://graph.microsoft.com/ChannelMessage.Read.All",
    "https://graph.microsoft.com/ExternalItem.Read.All",
];

/// The device authorization endpoint for the tenant.
pub fn device_code_url() -> String {
    format!("https://login.microsoftonline.com/{TENANT_ID}/oauth2/v2.0/devicecode")
}

/// The token endpoint for the tenant.
pub fn token_url() -> String {
    format!("https://login.microsoftonline.com/{TENANT_ID}/oauth2/v2.0/token")
}

/// The scope string sent on token requests.
///
/// `offline_access` is added so the server issues a refresh token alongside
/// the access token.
pub fn scope_string() -> String {
    let mut scopes: Vec<&str> = SCOPES.to_vec();
    scopes.push("offline_access");
    scopes.join(" ")
}

/// Supplies a valid bearer token on demand.
#[async_trait::async_trait]
pub trait TokenSupplier: Send + Sync {
    /// Returns the current bearer token, or an authentication error when no
    /// valid token can be produced without interactive login.
    async fn bearer_token(&self) -> Result<String>;
}

/// A [`TokenSupplier`] that returns a fixed token.
///
/// Useful for tests and for environments where a token is provisioned out
/// of band.
pub struct StaticTokenSupplier {
    token: String,
}

impl StaticTokenSupplier {
    /// Create a supplier that always returns the given token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait::async_trait]
impl TokenSupplier for StaticTokenSupplier {
    async fn bearer_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// A [`TokenSupplier`] backed by the on-disk credentials store.
///
/// A valid cached token is returned directly; an expired token with a
/// refresh token triggers a refresh grant; anything else is an
/// authentication error directing the user to `m365chat login`.
pub struct CachedTokenSupplier {
    store: CredentialsStore,
}

impl CachedTokenSupplier {
    /// Create a supplier over the default credentials location.
    pub fn new() -> Result<Self> {
        let store = CredentialsStore::new()?;
        Ok(Self { store })
    }

    /// Create a supplier over a specific store.
    pub fn with_store(store: CredentialsStore) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl TokenSupplier for CachedTokenSupplier {
    async fn bearer_token(&self) -> Result<String> {
        let creds = self.store.load();
        let Some(token) = creds.access_token.clone() else {
            return Err(Error::authentication(
                "Not authenticated. Run 'm365chat login' to sign in.",
            ));
        };
        if !creds.is_expired() {
            return Ok(token);
        }
        if let Some(refresh_token) = creds.refresh_token.clone() {
            let refreshed = device_flow::refresh(&self.store, &refresh_token).await?;
            return refreshed.access_token.ok_or_else(|| {
                Error::authentication("Token refresh returned no access token")
            });
        }
        Err(Error::authentication(
            "Token expired. Run 'm365chat login' to sign in again.",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_credentials_is_an_authentication_error() {
        let temp = TempDir::new().unwrap();
        let store = CredentialsStore::with_path(temp.path().join("credentials.json"));
        let supplier = CachedTokenSupplier::with_store(store);

        let err = supplier.bearer_token().await.unwrap_err();
        assert!(err.is_authentication());
        assert!(err.to_string().contains("m365chat login"));
    }

    #[tokio::test]
    async fn valid_cached_token_is_returned() {
        let temp = TempDir::new().unwrap();
        let store = CredentialsStore::with_path(temp.path().join("credentials.json"));
        let creds = Credentials {
            access_token: Some("cached-token".to_string()),
            refresh_token: None,
            expires_at: Some(time::OffsetDateTime::now_utc().unix_timestamp() + 3600),
            account: None,
        };
        store.save(&creds).unwrap();

        let supplier = CachedTokenSupplier::with_store(store);
        assert_eq!(supplier.bearer_token().await.unwrap(), "cached-token");
    }

    #[tokio::test]
    async fn expired_token_without_refresh_is_an_authentication_error() {
        let temp = TempDir::new().unwrap();
        let store = CredentialsStore::with_path(temp.path().join("credentials.json"));
        let creds = Credentials {
            access_token: Some("stale-token".to_string()),
            refresh_token: None,
            expires_at: Some(0),
            account: None,
        };
        store.save(&creds).unwrap();

        let supplier = CachedTokenSupplier::with_store(store);
        let err = supplier.bearer_token().await.unwrap_err();
        assert!(err.is_authentication());
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn scope_string_requests_offline_access() {
        let scopes = scope_string();
        assert!(scopes.contains("offline_access"));
        assert!(scopes.contains("https://graph.microsoft.com/Chat.Read"));
    }
}
