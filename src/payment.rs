//! Payment collaborator boundary.
//!
//! The processor itself is external; our only contract is "case id in →
//! either the case advances via the confirmation callback, or nothing
//! changes". `PaymentGateway` is the seam; the production implementation
//! builds the processor's hosted-checkout redirect URL, and confirmation
//! arrives back through the API's idempotent confirm-payment endpoint.

use thiserror::Error;

use crate::config::AppConfig;
use crate::models::{Case, Profile};

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Checkout session could not be created: {0}")]
    SessionFailed(String),
}

/// A created checkout session the caller should redirect the GP to.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub url: String,
}

pub trait PaymentGateway: Send + Sync {
    fn create_checkout(&self, case: &Case, gp: &Profile) -> Result<CheckoutSession, PaymentError>;
}

/// Hosted-checkout gateway: a fixed line-item price with tax and address
/// collection handled on the processor's page. The redirect URL carries the
/// case id so the success callback can confirm the right case.
pub struct HostedCheckout {
    base_url: String,
    success_url: String,
    cancel_url: String,
    price_cents: u32,
}

impl HostedCheckout {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.checkout_base_url.clone(),
            success_url: config.checkout_success_url.clone(),
            cancel_url: config.checkout_cancel_url.clone(),
            price_cents: config.consult_price_cents,
        }
    }
}

impl PaymentGateway for HostedCheckout {
    fn create_checkout(&self, case: &Case, gp: &Profile) -> Result<CheckoutSession, PaymentError> {
        let url = format!(
            "{}?case_id={}&amount_cents={}&customer_email={}&success_url={}&cancel_url={}",
            self.base_url,
            case.id,
            self.price_cents,
            urlencode(&gp.email),
            urlencode(&self.success_url),
            urlencode(&self.cancel_url),
        );
        Ok(CheckoutSession { url })
    }
}

// Minimal query-component escaping; checkout URLs only carry emails and
// https URLs, never arbitrary binary.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
