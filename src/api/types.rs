//! Shared types for the HTTP API layer.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::enums::UserRole;
use crate::models::Actor;
use crate::notify::Notifier;
use crate::payment::PaymentGateway;
use crate::storage::FileStore;

/// Session lifetime. The identity collaborator re-provisions a session on
/// each login, so expiry here only bounds abandoned tokens.
const SESSION_TTL_SECS: u64 = 12 * 3600;

// ═══════════════════════════════════════════════════════════
// API context — shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes and middleware. Handlers open their
/// own short-lived SQLite connection from `db_path` per request.
#[derive(Clone)]
pub struct ApiContext {
    pub db_path: PathBuf,
    pub store: Arc<dyn FileStore>,
    pub notifier: Arc<Notifier>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub sessions: Arc<Mutex<SessionStore>>,
    pub config: Arc<AppConfig>,
}

impl ApiContext {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn FileStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let notifier = Arc::new(Notifier::new(
            config.email_relay_url.clone(),
            config.ops_webhook_url.clone(),
        ));
        Self {
            db_path: config.db_path(),
            store,
            notifier,
            gateway,
            sessions: Arc::new(Mutex::new(SessionStore::new())),
            config: Arc::new(config),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Session context — injected by auth middleware
// ═══════════════════════════════════════════════════════════

/// Authenticated caller, injected into request extensions by the auth
/// middleware after bearer token validation.
#[derive(Debug, Clone, Copy)]
pub struct SessionContext {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl SessionContext {
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.user_id,
            role: self.role,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Session store — bearer tokens from the identity hand-off
// ═══════════════════════════════════════════════════════════

struct SessionEntry {
    user_id: Uuid,
    role: UserRole,
    expires_at: Instant,
}

/// In-memory bearer session store. Only SHA-256 hashes of tokens are kept;
/// the plaintext token exists exactly once, in the provisioning response.
pub struct SessionStore {
    sessions: HashMap<[u8; 32], SessionEntry>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Issue a fresh session token for a provisioned user.
    pub fn issue(&mut self, user_id: Uuid, role: UserRole) -> String {
        self.cleanup();
        let token = generate_token();
        self.sessions.insert(
            hash_token(&token),
            SessionEntry {
                user_id,
                role,
                expires_at: Instant::now() + Duration::from_secs(SESSION_TTL_SECS),
            },
        );
        token
    }

    /// Resolve a bearer token to its session, if valid and unexpired.
    pub fn validate(&self, token: &str) -> Option<SessionContext> {
        let entry = self.sessions.get(&hash_token(token))?;
        if Instant::now() > entry.expires_at {
            return None;
        }
        Some(SessionContext {
            user_id: entry.user_id,
            role: entry.role,
        })
    }

    /// Revoke every session for one user.
    pub fn revoke_user(&mut self, user_id: &Uuid) {
        self.sessions.retain(|_, entry| entry.user_id != *user_id);
    }

    fn cleanup(&mut self) {
        let now = Instant::now();
        self.sessions.retain(|_, entry| now < entry.expires_at);
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash a bearer token string using SHA-256.
pub fn hash_token(token: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

/// Generate a random bearer token (URL-safe base64, 32 bytes of entropy).
pub fn generate_token() -> String {
    use base64::Engine;
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
