use std::net::SocketAddr;
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Vetconsult";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Files uploaded by the same actor within this window are displayed and
/// downloaded as one batch.
pub const BATCH_WINDOW_SECS: i64 = 60;

/// Per-request upload caps.
pub const MAX_FILES_PER_UPLOAD: usize = 25;
pub const MAX_FILE_BYTES: usize = 1024 * 1024 * 1024;

/// Request-body ceiling for the upload route: a full batch of per-file-cap
/// payloads with base64 expansion, plus envelope slack.
pub const MAX_UPLOAD_BODY_BYTES: usize =
    MAX_FILES_PER_UPLOAD * (MAX_FILE_BYTES / 3 * 4 + 1024) + 64 * 1024;

/// TTL for signed retrieval tokens. They are consumed immediately
/// server-side during bundling, so short is fine.
pub const SIGNED_TOKEN_TTL_SECS: u64 = 60;

pub fn default_log_filter() -> String {
    format!("{}=info,tower_http=info", env!("CARGO_PKG_NAME"))
}

/// Get the application data directory (`~/.vetconsult` unless overridden).
pub fn default_data_dir() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".vetconsult")
}

/// Runtime configuration, resolved once at startup from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub bind_addr: SocketAddr,
    /// Flat consultation fee, in cents, passed to the checkout collaborator.
    pub consult_price_cents: u32,
    pub checkout_base_url: String,
    pub checkout_success_url: String,
    pub checkout_cancel_url: String,
    /// Outbound email relay; `None` disables email delivery (logged only).
    pub email_relay_url: Option<String>,
    /// Chat-ops webhook; `None` disables ops pings.
    pub ops_webhook_url: Option<String>,
    /// Shared secret the identity collaborator presents when provisioning
    /// profiles and sessions.
    pub provisioning_key: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let env = |key: &str| std::env::var(key).ok();
        Self {
            data_dir: env("VETCONSULT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_data_dir),
            bind_addr: env("VETCONSULT_BIND")
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8780))),
            consult_price_cents: env("VETCONSULT_PRICE_CENTS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(14900),
            checkout_base_url: env("VETCONSULT_CHECKOUT_URL")
                .unwrap_or_else(|| "https://pay.example.com/checkout".into()),
            checkout_success_url: env("VETCONSULT_CHECKOUT_SUCCESS_URL")
                .unwrap_or_else(|| "https://app.example.com/cases/payment-success".into()),
            checkout_cancel_url: env("VETCONSULT_CHECKOUT_CANCEL_URL")
                .unwrap_or_else(|| "https://app.example.com/cases/payment-cancelled".into()),
            email_relay_url: env("VETCONSULT_EMAIL_RELAY_URL"),
            ops_webhook_url: env("VETCONSULT_OPS_WEBHOOK_URL"),
            provisioning_key: env("VETCONSULT_PROVISIONING_KEY")
                .unwrap_or_else(|| "dev-provisioning-key".into()),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("vetconsult.db")
    }

    pub fn files_dir(&self) -> PathBuf {
        self.data_dir.join("files")
    }
}

/// Baseline configuration for unit and router tests.
#[cfg(test)]
pub fn test_config() -> AppConfig {
    AppConfig {
        data_dir: PathBuf::from("/tmp/vetconsult-test"),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        consult_price_cents: 14900,
        checkout_base_url: "https://pay.test/checkout".into(),
        checkout_success_url: "https://app.test/success".into(),
        checkout_cancel_url: "https://app.test/cancel".into(),
        email_relay_url: None,
        ops_webhook_url: None,
        provisioning_key: "test-key".into(),
    }
}
