//! Object storage collaborator boundary.
//!
//! Rows in `case_files` carry only an opaque `storage_path`; everything that
//! touches bytes goes through the `FileStore` trait so the domain logic never
//! knows where objects live. The production implementation is a directory
//! tree on local disk; retrieval for bundling goes through short-lived,
//! single-use signed tokens.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use base64::Engine;
use thiserror::Error;
use uuid::Uuid;

use crate::config::SIGNED_TOKEN_TTL_SECS;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Signed token invalid or expired")]
    TokenInvalid,

    #[error("Storage path escapes the store root: {0}")]
    PathRejected(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A short-lived retrieval credential for one stored object.
#[derive(Debug, Clone)]
pub struct SignedToken(pub String);

/// Byte storage keyed by opaque path. Explicit seam so the lifecycle and
/// bundling logic are testable without a hosted object store.
pub trait FileStore: Send + Sync {
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError>;
    fn fetch(&self, path: &str) -> Result<Vec<u8>, StorageError>;
    fn delete(&self, path: &str) -> Result<(), StorageError>;

    /// Issue a single-use retrieval token for `path`, valid for `ttl`.
    fn issue_token(&self, path: &str, ttl: Duration) -> Result<SignedToken, StorageError>;

    /// Redeem a token for the object's bytes. Consumes the token.
    fn redeem(&self, token: &SignedToken) -> Result<Vec<u8>, StorageError>;
}

/// Build the canonical storage path for a new upload. Paths are unique by
/// construction (uuid prefix) and additionally by DB unique index.
pub fn storage_path_for(case_id: &Uuid, file_name: &str) -> String {
    // File names come from user uploads; keep only a safe basename.
    let base: String = file_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("cases/{case_id}/{}_{base}", Uuid::new_v4())
}

struct TokenEntry {
    path: String,
    expires_at: Instant,
}

/// Directory-backed store rooted at the configured data dir.
pub struct LocalFileStore {
    root: PathBuf,
    tokens: Mutex<HashMap<String, TokenEntry>>,
}

impl LocalFileStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn default_ttl() -> Duration {
        Duration::from_secs(SIGNED_TOKEN_TTL_SECS)
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        if path.split('/').any(|seg| seg == "..") || Path::new(path).is_absolute() {
            return Err(StorageError::PathRejected(path.to_string()));
        }
        Ok(self.root.join(path))
    }

    fn generate_token() -> String {
        let bytes: [u8; 32] = rand::random();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }
}

impl FileStore for LocalFileStore {
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(full, bytes)?;
        Ok(())
    }

    fn fetch(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let full = self.resolve(path)?;
        match fs::read(&full) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        match fs::remove_file(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn issue_token(&self, path: &str, ttl: Duration) -> Result<SignedToken, StorageError> {
        // Tokens for missing objects are refused up front.
        let full = self.resolve(path)?;
        if !full.exists() {
            return Err(StorageError::NotFound(path.to_string()));
        }

        let token = Self::generate_token();
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        // Opportunistic cleanup keeps the map bounded.
        let now = Instant::now();
        tokens.retain(|_, entry| now < entry.expires_at);
        tokens.insert(
            token.clone(),
            TokenEntry {
                path: path.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(SignedToken(token))
    }

    fn redeem(&self, token: &SignedToken) -> Result<Vec<u8>, StorageError> {
        let path = {
            let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
            let entry = tokens.remove(&token.0).ok_or(StorageError::TokenInvalid)?;
            if Instant::now() > entry.expires_at {
                return Err(StorageError::TokenInvalid);
            }
            entry.path
        };
        self.fetch(&path)
    }
}
