//! Outbound notifications — templated email to case participants plus
//! fire-and-forget chat-ops webhook pings.
//!
//! Lifecycle operations return `Notification` descriptors instead of
//! sending anything themselves; the API layer hands them to `Notifier`
//! after the database work has committed. Delivery failures are logged
//! and swallowed — they never block the triggering operation.

use serde::Serialize;

use crate::models::{Case, Profile};

/// One pending outbound notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Email(EmailMessage),
    /// Chat-ops webhook text.
    Ops(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Confirmation to the GP that their case entered the review queue.
pub fn submission_confirmation(gp: &Profile, case: &Case) -> Notification {
    Notification::Email(EmailMessage {
        to: gp.email.clone(),
        subject: format!(
            "Case received: {} ({})",
            case.patient.patient_name, case.patient.species
        ),
        body: format!(
            "Hi {},\n\nYour consultation request for {} has been received and \
             is awaiting a {} specialist. You will hear from us as soon as the \
             case is claimed.\n\nCase reference: {}",
            gp.full_name, case.patient.patient_name, case.specialty_requested, case.id
        ),
    })
}

/// New-case alert to one matching specialist.
pub fn new_case_available(specialist: &Profile, case: &Case) -> Notification {
    Notification::Email(EmailMessage {
        to: specialist.email.clone(),
        subject: format!("New {} case awaiting review", case.specialty_requested),
        body: format!(
            "Hi {},\n\nA new {} consultation ({}, {}) is awaiting assignment. \
             Open your queue to review and claim it.\n\nCase reference: {}",
            specialist.full_name,
            case.specialty_requested,
            case.patient.patient_name,
            case.patient.species,
            case.id
        ),
    })
}

/// Diagnostics round done — assigned specialist can write the final report.
pub fn diagnostics_ready(specialist: &Profile, case: &Case) -> Notification {
    Notification::Email(EmailMessage {
        to: specialist.email.clone(),
        subject: format!("Diagnostics uploaded for {}", case.patient.patient_name),
        body: format!(
            "Hi {},\n\nThe requested diagnostics for {} have been uploaded. \
             The case is ready for your treatment report.\n\nCase reference: {}",
            specialist.full_name, case.patient.patient_name, case.id
        ),
    })
}

/// Final report posted — tell the GP the consultation is complete.
pub fn case_completed(gp: &Profile, case: &Case) -> Notification {
    Notification::Email(EmailMessage {
        to: gp.email.clone(),
        subject: format!("Consultation complete: {}", case.patient.patient_name),
        body: format!(
            "Hi {},\n\nThe specialist has posted the final report for {}. \
             Log in to review the treatment plan and client summary.\n\n\
             Case reference: {}",
            gp.full_name, case.patient.patient_name, case.id
        ),
    })
}

pub fn ops_payment_received(case: &Case) -> Notification {
    Notification::Ops(format!(
        "Payment confirmed for case {} ({} / {})",
        case.id, case.patient.patient_name, case.specialty_requested
    ))
}

pub fn ops_specialists_notified(case: &Case, count: usize) -> Notification {
    Notification::Ops(format!(
        "Case {} queued for {}; {count} specialist(s) notified",
        case.id, case.specialty_requested
    ))
}

/// Delivery client for the email relay and the ops webhook.
pub struct Notifier {
    client: reqwest::Client,
    email_relay_url: Option<String>,
    ops_webhook_url: Option<String>,
}

impl Notifier {
    pub fn new(email_relay_url: Option<String>, ops_webhook_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            email_relay_url,
            ops_webhook_url,
        }
    }

    /// Deliver a set of notifications. Never fails: per-message errors are
    /// logged at warn and dropped.
    pub async fn dispatch(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            match notification {
                Notification::Email(msg) => self.send_email(&msg).await,
                Notification::Ops(text) => self.send_ops(&text).await,
            }
        }
    }

    async fn send_email(&self, msg: &EmailMessage) {
        let Some(url) = &self.email_relay_url else {
            tracing::info!(to = %msg.to, subject = %msg.subject, "Email relay disabled; dropping message");
            return;
        };
        match self.client.post(url).json(msg).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(to = %msg.to, subject = %msg.subject, "Email dispatched");
            }
            Ok(resp) => {
                tracing::warn!(to = %msg.to, status = %resp.status(), "Email relay rejected message");
            }
            Err(e) => {
                tracing::warn!(to = %msg.to, error = %e, "Email relay unreachable");
            }
        }
    }

    async fn send_ops(&self, text: &str) {
        let Some(url) = &self.ops_webhook_url else {
            return;
        };
        let payload = serde_json::json!({ "text": text });
        if let Err(e) = self.client.post(url).json(&payload).send().await {
            tracing::warn!(error = %e, "Ops webhook unreachable");
        }
    }
}
