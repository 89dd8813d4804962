//! On-disk token cache.
//!
//! Credentials live in `~/.m365chat/credentials.json`. Only tokens and
//! their expiry are stored; everything else is fetched from the server.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{Error, Result};

/// The credentials directory name under the home directory.
const CREDENTIALS_DIR: &str = ".m365chat";

/// The credentials file name.
const CREDENTIALS_FILE: &str = "credentials.json";

/// Tokens are treated as expired this many seconds before their recorded
/// expiry, so a request never leaves with a token about to lapse mid-flight.
const EXPIRY_LEEWAY_SECS: i64 = 60;

/// Cached authentication credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Credentials {
    /// OAuth access token presented as the bearer token.
    pub access_token: Option<String>,
    /// OAuth refresh token for obtaining new access tokens.
    pub refresh_token: Option<String>,
    /// Access-token expiry as a Unix timestamp in seconds.
    pub expires_at: Option<i64>,
    /// The signed-in account, for display only.
    pub account: Option<String>,
}

impl Credentials {
    /// Check whether the access token is expired (or has no recorded
    /// expiry, which is treated as expired).
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                OffsetDateTime::now_utc().unix_timestamp() >= expires_at - EXPIRY_LEEWAY_SECS
            }
            None => true,
        }
    }

    /// Check whether the credentials carry a usable, unexpired token.
    pub fn is_valid(&self) -> bool {
        self.access_token.is_some() && !self.is_expired()
    }
}

/// Manages credential storage and retrieval.
#[derive(Debug, Clone)]
pub struct CredentialsStore {
    path: PathBuf,
}

impl CredentialsStore {
    /// Create a store at the default location under the home directory.
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::unknown("Could not determine the home directory"))?;
        Ok(Self {
            path: home.join(CREDENTIALS_DIR).join(CREDENTIALS_FILE),
        })
    }

    /// Create a store at an explicit path.
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// The path of the credentials file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load credentials, returning defaults when the file is missing or
    /// unreadable. A corrupt cache is indistinguishable from being signed
    /// out; the user just signs in again.
    pub fn load(&self) -> Credentials {
        if !self.path.exists() {
            return Credentials::default();
        }
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return Credentials::default(),
        };
        serde_json::from_reader(BufReader::new(file)).unwrap_or_default()
    }

    /// Save credentials, creating the parent directory as needed.
    pub fn save(&self, credentials: &Credentials) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .map_err(|e| Error::io("Failed to create credentials directory", e))?;
        }
        let file = File::create(&self.path)
            .map_err(|e| Error::io("Failed to create credentials file", e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, credentials)?;
        writer
            .flush()
            .map_err(|e| Error::io("Failed to write credentials file", e))?;
        Ok(())
    }

    /// Remove the credentials file. Succeeds when the file does not exist.
    pub fn clear(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        fs::remove_file(&self.path)
            .map_err(|e| Error::io("Failed to remove credentials file", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store(temp: &TempDir) -> CredentialsStore {
        CredentialsStore::with_path(temp.path().join(CREDENTIALS_DIR).join(CREDENTIALS_FILE))
    }

    #[test]
    fn missing_file_loads_defaults() {
        let temp = TempDir::new().unwrap();
        let store = test_store(&temp);
        assert_eq!(store.load(), Credentials::default());
    }

    #[test]
    fn save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = test_store(&temp);
        let creds = Credentials {
            access_token: Some("access-123".to_string()),
            refresh_token: Some("refresh-456".to_string()),
            expires_at: Some(1234567890),
            account: Some("user@example.com".to_string()),
        };
        store.save(&creds).unwrap();
        assert_eq!(store.load(), creds);
    }

    #[test]
    fn save_creates_parent_directory() {
        let temp = TempDir::new().unwrap();
        let store = test_store(&temp);
        assert!(!store.path().parent().unwrap().exists());
        store.save(&Credentials::default()).unwrap();
        assert!(store.path().parent().unwrap().exists());
    }

    #[test]
    fn clear_removes_file_and_tolerates_absence() {
        let temp = TempDir::new().unwrap();
        let store = test_store(&temp);
        store.clear().unwrap();

        store.save(&Credentials::default()).unwrap();
        assert!(store.path().exists());
        store.clear().unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn corrupt_file_loads_defaults() {
        let temp = TempDir::new().unwrap();
        let store = test_store(&temp);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "not valid json").unwrap();
        assert_eq!(store.load(), Credentials::default());
    }

    #[test]
    fn expiry_checks() {
        let mut creds = Credentials::default();
        assert!(creds.is_expired());

        creds.expires_at = Some(0);
        assert!(creds.is_expired());

        creds.expires_at = Some(OffsetDateTime::now_utc().unix_timestamp() + 3600);
        assert!(!creds.is_expired());
        assert!(!creds.is_valid());

        creds.access_token = Some("token".to_string());
        assert!(creds.is_valid());

        // Within the leeway window counts as expired.
        creds.expires_at = Some(OffsetDateTime::now_utc().unix_timestamp() + 10);
        assert!(creds.is_expired());
    }
}
