//! Session credentials and their on-disk cache.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use super::error::PlatformError;

/// Authenticated session token (`user_session` cookie value).
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential(String);

impl SessionCredential {
    /// Wraps a raw session token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token, e.g. for the recorder command line.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.0
    }

    /// Returns the value of the `Cookie` header carrying this session.
    #[must_use]
    pub fn cookie_header(&self) -> String {
        format!("user_session={}", self.0)
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionCredential")
            .field(&"[REDACTED]")
            .finish()
    }
}

/// Account login credentials.
#[derive(Clone)]
pub struct Credentials {
    /// Account e-mail or username.
    pub username: String,
    /// Account password.
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Persists the last good session so runs can skip the login form.
pub trait SessionStore: Send + Sync {
    /// Loads the cached session, `None` when nothing is cached.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::SessionStore`] when the cache exists but cannot be read.
    fn load(&self) -> Result<Option<SessionCredential>, PlatformError>;

    /// Replaces the cached session.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::SessionStore`] when the cache cannot be written.
    fn save(&self, session: &SessionCredential) -> Result<(), PlatformError>;
}

/// Session cache stored as a single-line text file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Creates a store backed by `path` (typically `<data_dir>/session.txt`).
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn load(&self) -> Result<Option<SessionCredential>, PlatformError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                if token.is_empty() {
                    debug!("Session cache is empty");
                    Ok(None)
                } else {
                    Ok(Some(SessionCredential::new(token)))
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PlatformError::session_store(&self.path, e)),
        }
    }

    #[instrument(skip(self, session), fields(path = %self.path.display()))]
    fn save(&self, session: &SessionCredential) -> Result<(), PlatformError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| PlatformError::session_store(parent, e))?;
        }
        fs::write(&self.path, session.token())
            .map_err(|e| PlatformError::session_store(&self.path, e))?;
        debug!("Session cached");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_session_credential_debug_is_redacted() {
        let session = SessionCredential::new("secret_token");
        let debug = format!("{session:?}");
        assert!(!debug.contains("secret_token"));
        assert!(debug.contains("REDACTED"));
        assert_eq!(session.cookie_header(), "user_session=secret_token");
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let credentials = Credentials {
            username: "me@example.com".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{credentials:?}");
        assert!(debug.contains("me@example.com"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_file_session_store_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path().join("session.txt"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_session_store_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path().join("nested").join("session.txt"));
        store.save(&SessionCredential::new("abc_123")).unwrap();
        assert_eq!(
            store.load().unwrap(),
            Some(SessionCredential::new("abc_123"))
        );
    }

    #[test]
    fn test_file_session_store_trims_whitespace() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.txt");
        fs::write(&path, "tok_1\n").unwrap();
        let store = FileSessionStore::new(&path);
        assert_eq!(store.load().unwrap().unwrap().token(), "tok_1");

        fs::write(&path, "  \n").unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
