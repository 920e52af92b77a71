//! Case lifecycle controller — the single authority for the case status
//! state machine and the side effects each transition triggers.
//!
//! draft → pending_assignment → awaiting_phase1 → awaiting_diagnostics
//!       → awaiting_phase2 → completed
//!
//! Every operation takes the connection and the authenticated `Actor`
//! explicitly. State-changing transitions run as single conditional
//! UPDATEs guarded on the current row state, so racing requests (two
//! specialists claiming, a payment webhook retry) resolve to exactly one
//! winner without a read-then-write window. Operations return the
//! notifications they warrant as descriptors; dispatch happens after the
//! database work and never gates success.

use chrono::Utc;
use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::db::repository as repo;
use crate::db::DatabaseError;
use crate::models::enums::{CaseStatus, MessageType, UserRole};
use crate::models::{Actor, Case, CaseDraftFields, CaseMessage, Phase2Report, Profile};
use crate::notify::{self, Notification};
use crate::payment::{PaymentError, PaymentGateway};

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Not permitted for this case")]
    NotAuthorized,

    #[error("Case not found")]
    NotFound,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Case already claimed")]
    AlreadyClaimed,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

fn invalid_state(operation: &str, actual: CaseStatus) -> LifecycleError {
    LifecycleError::InvalidState(format!("{operation} not legal while case is {actual}"))
}

/// Outcome of `submit_case`.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// First-case waiver applied; the case entered the review queue.
    Submitted,
    /// Payment due first — redirect the GP to the checkout session.
    PaymentRequired { checkout_url: String },
}

/// Outcome of `confirm_payment`. Re-confirmation after the case already
/// advanced is a no-op success, not an error.
#[derive(Debug, PartialEq, Eq)]
pub struct PaymentConfirmation {
    pub already_processed: bool,
}

// ── Shared guards ────────────────────────────────────────────

fn require_case(conn: &Connection, case_id: &Uuid) -> Result<Case, LifecycleError> {
    repo::get_case(conn, case_id)?.ok_or(LifecycleError::NotFound)
}

fn require_owning_gp(case: &Case, actor: &Actor) -> Result<(), LifecycleError> {
    if case.gp_id != actor.id {
        return Err(LifecycleError::NotAuthorized);
    }
    Ok(())
}

fn require_assigned_specialist(case: &Case, actor: &Actor) -> Result<(), LifecycleError> {
    if case.specialist_id != Some(actor.id) {
        return Err(LifecycleError::NotAuthorized);
    }
    Ok(())
}

fn require_profile(conn: &Connection, id: &Uuid) -> Result<Profile, LifecycleError> {
    repo::get_profile(conn, id)?.ok_or(LifecycleError::NotFound)
}

/// Read authorization: the owning GP, the assigned specialist, or any
/// specialist while the case is still unassigned.
pub fn can_view_case(case: &Case, actor: &Actor) -> bool {
    if case.gp_id == actor.id {
        return true;
    }
    match case.specialist_id {
        Some(specialist_id) => specialist_id == actor.id,
        None => actor.role == UserRole::Specialist && case.status != CaseStatus::Draft,
    }
}

fn require_field(name: &str, value: &str) -> Result<(), LifecycleError> {
    if value.trim().is_empty() {
        return Err(LifecycleError::Validation(format!("{name} is required")));
    }
    Ok(())
}

fn validate_draft_fields(fields: &CaseDraftFields) -> Result<(), LifecycleError> {
    require_field("specialty_requested", &fields.specialty_requested)?;
    require_field("patient_name", &fields.patient.patient_name)?;
    require_field("species", &fields.patient.species)?;
    require_field("presenting_complaint", &fields.clinical.presenting_complaint)?;
    require_field("gp_question", &fields.clinical.gp_question)?;
    Ok(())
}

// ── GP operations ────────────────────────────────────────────

/// Create a new case in `draft`.
pub fn create_draft(
    conn: &Connection,
    actor: &Actor,
    fields: CaseDraftFields,
) -> Result<Case, LifecycleError> {
    if actor.role != UserRole::Gp {
        return Err(LifecycleError::NotAuthorized);
    }
    validate_draft_fields(&fields)?;

    let now = Utc::now();
    let case = Case {
        id: Uuid::new_v4(),
        gp_id: actor.id,
        specialist_id: None,
        status: CaseStatus::Draft,
        specialty_requested: fields.specialty_requested,
        patient: fields.patient,
        clinical: fields.clinical,
        phase1_plan: None,
        assessment: None,
        treatment_plan: None,
        prognosis: None,
        client_summary: None,
        final_report_path: None,
        submitted_at: None,
        created_at: now,
        updated_at: now,
    };
    repo::insert_case(conn, &case)?;
    tracing::info!(case_id = %case.id, gp_id = %actor.id, "Draft case created");
    Ok(case)
}

/// Edit a draft's fields. Refused once the case has been submitted.
pub fn update_draft(
    conn: &Connection,
    actor: &Actor,
    case_id: &Uuid,
    fields: CaseDraftFields,
) -> Result<Case, LifecycleError> {
    let case = require_case(conn, case_id)?;
    require_owning_gp(&case, actor)?;
    if case.status != CaseStatus::Draft {
        return Err(invalid_state("editing", case.status));
    }
    validate_draft_fields(&fields)?;

    if repo::update_draft_fields(conn, case_id, &fields, Utc::now())? == 0 {
        return Err(invalid_state("editing", case.status));
    }
    require_case(conn, case_id)
}

/// Delete a draft. Returns the storage paths of the draft's files so the
/// caller can clean up the object store after the rows are gone.
pub fn delete_draft(
    conn: &Connection,
    actor: &Actor,
    case_id: &Uuid,
) -> Result<Vec<String>, LifecycleError> {
    let case = require_case(conn, case_id)?;
    require_owning_gp(&case, actor)?;
    if case.status != CaseStatus::Draft {
        return Err(invalid_state("deletion", case.status));
    }

    let paths: Vec<String> = repo::list_all_case_files(conn, case_id)?
        .into_iter()
        .map(|f| f.storage_path)
        .collect();

    if repo::delete_draft(conn, case_id)? == 0 {
        return Err(invalid_state("deletion", case.status));
    }
    tracing::info!(case_id = %case_id, "Draft case deleted");
    Ok(paths)
}

/// Submit a draft for review. A GP's first case waives the fee and enters
/// the queue immediately; otherwise the case stays `draft` and the GP is
/// redirected to the checkout collaborator.
pub fn submit_case(
    conn: &Connection,
    actor: &Actor,
    case_id: &Uuid,
    gateway: &dyn PaymentGateway,
) -> Result<(SubmitOutcome, Vec<Notification>), LifecycleError> {
    let case = require_case(conn, case_id)?;
    require_owning_gp(&case, actor)?;
    if case.status != CaseStatus::Draft {
        return Err(invalid_state("submission", case.status));
    }

    let gp = require_profile(conn, &actor.id)?;
    if repo::count_submitted_cases(conn, &actor.id)? == 0 {
        let notifications = advance_to_queue(conn, case_id, &actor.id, &gp)?;
        return Ok((SubmitOutcome::Submitted, notifications));
    }

    let session = gateway.create_checkout(&case, &gp)?;
    tracing::info!(case_id = %case_id, "Checkout session created; awaiting payment");
    Ok((
        SubmitOutcome::PaymentRequired { checkout_url: session.url },
        Vec::new(),
    ))
}

/// Payment-collaborator callback. Idempotent: the conditional UPDATE only
/// matches while the case is still a draft, so webhook retries and
/// duplicate success navigations are no-ops with no repeat notifications.
pub fn confirm_payment(
    conn: &Connection,
    actor: &Actor,
    case_id: &Uuid,
) -> Result<(PaymentConfirmation, Vec<Notification>), LifecycleError> {
    let case = require_case(conn, case_id)?;
    require_owning_gp(&case, actor)?;

    let gp = require_profile(conn, &actor.id)?;
    if repo::mark_submitted(conn, case_id, &actor.id, Utc::now())? == 0 {
        tracing::info!(case_id = %case_id, "Duplicate payment confirmation ignored");
        return Ok((PaymentConfirmation { already_processed: true }, Vec::new()));
    }

    repo::publish_draft_files(conn, case_id)?;
    let case = require_case(conn, case_id)?;
    let mut notifications = vec![notify::ops_payment_received(&case)];
    notifications.extend(queue_notifications(conn, &case, &gp)?);
    Ok((PaymentConfirmation { already_processed: false }, notifications))
}

/// Shared draft → pending_assignment advance used by the waiver path.
fn advance_to_queue(
    conn: &Connection,
    case_id: &Uuid,
    gp_id: &Uuid,
    gp: &Profile,
) -> Result<Vec<Notification>, LifecycleError> {
    if repo::mark_submitted(conn, case_id, gp_id, Utc::now())? == 0 {
        let actual = require_case(conn, case_id)?.status;
        return Err(invalid_state("submission", actual));
    }
    repo::publish_draft_files(conn, case_id)?;
    let case = require_case(conn, case_id)?;
    queue_notifications(conn, &case, gp)
}

/// Notifications fired whenever a case enters the review queue.
fn queue_notifications(
    conn: &Connection,
    case: &Case,
    gp: &Profile,
) -> Result<Vec<Notification>, LifecycleError> {
    let specialists = repo::list_specialists_matching(conn, &case.specialty_requested)?;
    let mut notifications = Vec::with_capacity(specialists.len() + 2);
    notifications.push(notify::submission_confirmation(gp, case));
    for specialist in &specialists {
        notifications.push(notify::new_case_available(specialist, case));
    }
    notifications.push(notify::ops_specialists_notified(case, specialists.len()));
    tracing::info!(
        case_id = %case.id,
        specialty = %case.specialty_requested,
        specialists = specialists.len(),
        "Case entered review queue"
    );
    Ok(notifications)
}

// ── Specialist operations ────────────────────────────────────

/// Claim an unassigned case. At most one claimant wins; the loser of a
/// race gets `AlreadyClaimed`, never a silent success.
pub fn claim_case(
    conn: &Connection,
    actor: &Actor,
    case_id: &Uuid,
) -> Result<Case, LifecycleError> {
    if actor.role != UserRole::Specialist {
        return Err(LifecycleError::NotAuthorized);
    }
    let case = require_case(conn, case_id)?;

    if repo::claim(conn, case_id, &actor.id, Utc::now())? == 0 {
        // A draft is invisible to specialists; claiming one must not
        // reveal that it exists.
        return if case.status == CaseStatus::Draft {
            Err(LifecycleError::NotFound)
        } else {
            Err(LifecycleError::AlreadyClaimed)
        };
    }
    tracing::info!(case_id = %case_id, specialist_id = %actor.id, "Case claimed");
    require_case(conn, case_id)
}

/// Post the phase-1 diagnostic plan.
pub fn submit_phase1(
    conn: &Connection,
    actor: &Actor,
    case_id: &Uuid,
    plan_text: &str,
) -> Result<Case, LifecycleError> {
    require_field("plan_text", plan_text)?;
    let case = require_case(conn, case_id)?;
    require_assigned_specialist(&case, actor)?;
    if case.status != CaseStatus::AwaitingPhase1 {
        return Err(invalid_state("phase-1 submission", case.status));
    }

    if repo::set_phase1_plan(conn, case_id, plan_text, Utc::now())? == 0 {
        return Err(invalid_state("phase-1 submission", case.status));
    }
    insert_system_message(conn, &case, actor, MessageType::ReportPhase1, plan_text)?;
    tracing::info!(case_id = %case_id, "Phase-1 plan posted");
    require_case(conn, case_id)
}

/// GP marks the diagnostics round complete. Requires at least one
/// diagnostic-results file to have been uploaded for this round.
pub fn submit_diagnostics(
    conn: &Connection,
    actor: &Actor,
    case_id: &Uuid,
    notes: Option<&str>,
) -> Result<(Case, Vec<Notification>), LifecycleError> {
    let case = require_case(conn, case_id)?;
    require_owning_gp(&case, actor)?;
    if case.status != CaseStatus::AwaitingDiagnostics {
        return Err(invalid_state("diagnostics submission", case.status));
    }
    let uploaded = repo::count_files_for_phase(
        conn,
        case_id,
        crate::models::enums::UploadPhase::DiagnosticResults,
    )?;
    if uploaded == 0 {
        return Err(LifecycleError::InvalidState(
            "diagnostics submission requires at least one uploaded file".into(),
        ));
    }

    // Advance first so a lost race cannot strand a notes message.
    if repo::advance_to_phase2(conn, case_id, Utc::now())? == 0 {
        return Err(invalid_state("diagnostics submission", case.status));
    }
    if let Some(notes) = notes.map(str::trim).filter(|n| !n.is_empty()) {
        insert_system_message(conn, &case, actor, MessageType::Text, notes)?;
    }

    let case = require_case(conn, case_id)?;
    let mut notifications = Vec::new();
    if let Some(specialist_id) = case.specialist_id {
        let specialist = require_profile(conn, &specialist_id)?;
        notifications.push(notify::diagnostics_ready(&specialist, &case));
    }
    tracing::info!(case_id = %case_id, files = uploaded, "Diagnostics round submitted");
    Ok((case, notifications))
}

/// Post the phase-2 treatment report and complete the case.
pub fn submit_phase2(
    conn: &Connection,
    actor: &Actor,
    case_id: &Uuid,
    report: &Phase2Report,
    final_report_path: Option<&str>,
) -> Result<(Case, Vec<Notification>), LifecycleError> {
    require_field("assessment", &report.assessment)?;
    require_field("treatment_plan", &report.treatment_plan)?;
    require_field("prognosis", &report.prognosis)?;
    require_field("client_summary", &report.client_summary)?;

    let case = require_case(conn, case_id)?;
    require_assigned_specialist(&case, actor)?;
    if case.status != CaseStatus::AwaitingPhase2 {
        return Err(invalid_state("phase-2 submission", case.status));
    }

    if repo::set_phase2_report(conn, case_id, report, final_report_path, Utc::now())? == 0 {
        return Err(invalid_state("phase-2 submission", case.status));
    }
    insert_system_message(
        conn,
        &case,
        actor,
        MessageType::ReportPhase2,
        "Final treatment report posted",
    )?;
    if final_report_path.is_some() {
        insert_system_message(
            conn,
            &case,
            actor,
            MessageType::ReportFinal,
            "Final report document attached",
        )?;
    }

    let case = require_case(conn, case_id)?;
    let gp = require_profile(conn, &case.gp_id)?;
    let notifications = vec![notify::case_completed(&gp, &case)];
    tracing::info!(case_id = %case_id, "Case completed");
    Ok((case, notifications))
}

// ── Messaging ────────────────────────────────────────────────

/// Append a chat message from a case participant.
pub fn post_message(
    conn: &Connection,
    actor: &Actor,
    case_id: &Uuid,
    content: &str,
) -> Result<CaseMessage, LifecycleError> {
    require_field("content", content)?;
    let case = require_case(conn, case_id)?;
    let is_participant =
        case.gp_id == actor.id || case.specialist_id == Some(actor.id);
    if !is_participant {
        return Err(LifecycleError::NotAuthorized);
    }

    let message = CaseMessage {
        id: Uuid::new_v4(),
        case_id: case.id,
        sender_id: actor.id,
        sender_role: actor.role,
        content: content.trim().to_string(),
        message_type: MessageType::Text,
        is_internal: false,
        created_at: Utc::now(),
    };
    repo::insert_case_message(conn, &message)?;
    Ok(message)
}

fn insert_system_message(
    conn: &Connection,
    case: &Case,
    actor: &Actor,
    message_type: MessageType,
    content: &str,
) -> Result<(), LifecycleError> {
    repo::insert_case_message(
        conn,
        &CaseMessage {
            id: Uuid::new_v4(),
            case_id: case.id,
            sender_id: actor.id,
            sender_role: actor.role,
            content: content.to_string(),
            message_type,
            is_internal: false,
            created_at: Utc::now(),
        },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::case::tests::seed_profile;
    use crate::db::{open_database, open_memory_database};
    use crate::models::enums::UploadPhase;
    use crate::models::{CaseFile, ClinicalFields, PatientFields};
    use crate::payment::CheckoutSession;
    use std::sync::{Arc, Barrier};

    struct FakeGateway;

    impl PaymentGateway for FakeGateway {
        fn create_checkout(
            &self,
            case: &Case,
            _gp: &Profile,
        ) -> Result<CheckoutSession, PaymentError> {
            Ok(CheckoutSession {
                url: format!("https://pay.test/checkout?case_id={}", case.id),
            })
        }
    }

    fn draft_fields() -> CaseDraftFields {
        CaseDraftFields {
            specialty_requested: "Cardiology".into(),
            patient: PatientFields {
                patient_name: "Buddy Smith".into(),
                species: "Canine".into(),
                ..Default::default()
            },
            clinical: ClinicalFields {
                presenting_complaint: "Exercise intolerance".into(),
                gp_question: "Work-up priorities?".into(),
                ..Default::default()
            },
        }
    }

    fn seed_diag_file(conn: &Connection, case_id: Uuid, uploader_id: Uuid) {
        repo::insert_case_file(
            conn,
            &CaseFile {
                id: Uuid::new_v4(),
                case_id,
                uploader_id,
                file_name: "echo.jpg".into(),
                content_type: Some("image/jpeg".into()),
                storage_path: format!("cases/{case_id}/{}", Uuid::new_v4()),
                upload_phase: Some(UploadPhase::DiagnosticResults),
                is_draft: false,
                uploaded_at: Utc::now(),
            },
        )
        .unwrap();
    }

    /// Drive a freshly seeded case to `awaiting_phase1`.
    fn claimed_case(conn: &Connection) -> (Case, Actor, Actor) {
        let gp = Actor::gp(seed_profile(conn, UserRole::Gp, None));
        let spec = Actor::specialist(seed_profile(conn, UserRole::Specialist, Some("Cardiology")));
        let case = create_draft(conn, &gp, draft_fields()).unwrap();
        submit_case(conn, &gp, &case.id, &FakeGateway).unwrap();
        let case = claim_case(conn, &spec, &case.id).unwrap();
        (case, gp, spec)
    }

    #[test]
    fn create_draft_requires_clinical_fields() {
        let conn = open_memory_database().unwrap();
        let gp = Actor::gp(seed_profile(&conn, UserRole::Gp, None));

        let mut fields = draft_fields();
        fields.clinical.gp_question = "  ".into();
        let err = create_draft(&conn, &gp, fields).unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(msg) if msg.contains("gp_question")));
    }

    #[test]
    fn specialists_cannot_create_cases() {
        let conn = open_memory_database().unwrap();
        let spec = Actor::specialist(seed_profile(&conn, UserRole::Specialist, Some("Cardiology")));
        assert!(matches!(
            create_draft(&conn, &spec, draft_fields()),
            Err(LifecycleError::NotAuthorized)
        ));
    }

    #[test]
    fn first_case_waives_payment_and_notifies_specialists() {
        let conn = open_memory_database().unwrap();
        let gp = Actor::gp(seed_profile(&conn, UserRole::Gp, None));
        seed_profile(&conn, UserRole::Specialist, Some("Cardiology"));
        seed_profile(&conn, UserRole::Specialist, Some("Dermatology"));

        let case = create_draft(&conn, &gp, draft_fields()).unwrap();
        let (outcome, notifications) = submit_case(&conn, &gp, &case.id, &FakeGateway).unwrap();

        assert!(matches!(outcome, SubmitOutcome::Submitted));
        let fetched = require_case(&conn, &case.id).unwrap();
        assert_eq!(fetched.status, CaseStatus::PendingAssignment);

        // GP confirmation + one matching specialist + ops ping.
        let emails = notifications
            .iter()
            .filter(|n| matches!(n, Notification::Email(_)))
            .count();
        assert_eq!(emails, 2);
        assert!(notifications
            .iter()
            .any(|n| matches!(n, Notification::Ops(text) if text.contains("1 specialist(s)"))));
    }

    #[test]
    fn second_case_requires_payment_and_stays_draft() {
        let conn = open_memory_database().unwrap();
        let gp = Actor::gp(seed_profile(&conn, UserRole::Gp, None));

        let first = create_draft(&conn, &gp, draft_fields()).unwrap();
        submit_case(&conn, &gp, &first.id, &FakeGateway).unwrap();

        let second = create_draft(&conn, &gp, draft_fields()).unwrap();
        let (outcome, notifications) = submit_case(&conn, &gp, &second.id, &FakeGateway).unwrap();

        match outcome {
            SubmitOutcome::PaymentRequired { checkout_url } => {
                assert!(checkout_url.contains(&second.id.to_string()));
            }
            other => panic!("expected payment redirect, got {other:?}"),
        }
        assert!(notifications.is_empty());
        assert_eq!(require_case(&conn, &second.id).unwrap().status, CaseStatus::Draft);
    }

    #[test]
    fn submit_rejects_foreign_gp_and_missing_case() {
        let conn = open_memory_database().unwrap();
        let gp = Actor::gp(seed_profile(&conn, UserRole::Gp, None));
        let other = Actor::gp(seed_profile(&conn, UserRole::Gp, None));
        let case = create_draft(&conn, &gp, draft_fields()).unwrap();

        assert!(matches!(
            submit_case(&conn, &other, &case.id, &FakeGateway),
            Err(LifecycleError::NotAuthorized)
        ));
        assert!(matches!(
            submit_case(&conn, &gp, &Uuid::new_v4(), &FakeGateway),
            Err(LifecycleError::NotFound)
        ));
    }

    #[test]
    fn confirm_payment_is_idempotent_and_suppresses_duplicate_notifications() {
        let conn = open_memory_database().unwrap();
        let gp = Actor::gp(seed_profile(&conn, UserRole::Gp, None));
        seed_profile(&conn, UserRole::Specialist, Some("Cardiology"));
        let case = create_draft(&conn, &gp, draft_fields()).unwrap();

        let (first, notifications) = confirm_payment(&conn, &gp, &case.id).unwrap();
        assert!(!first.already_processed);
        assert!(!notifications.is_empty());
        assert_eq!(
            require_case(&conn, &case.id).unwrap().status,
            CaseStatus::PendingAssignment
        );

        let (second, notifications) = confirm_payment(&conn, &gp, &case.id).unwrap();
        assert!(second.already_processed);
        assert!(notifications.is_empty(), "no duplicate notifications");
    }

    #[test]
    fn claim_assigns_first_caller_and_rejects_second() {
        let conn = open_memory_database().unwrap();
        let gp = Actor::gp(seed_profile(&conn, UserRole::Gp, None));
        let spec_a = Actor::specialist(seed_profile(&conn, UserRole::Specialist, Some("Cardiology")));
        let spec_b = Actor::specialist(seed_profile(&conn, UserRole::Specialist, Some("Cardiology")));
        let case = create_draft(&conn, &gp, draft_fields()).unwrap();
        submit_case(&conn, &gp, &case.id, &FakeGateway).unwrap();

        let claimed = claim_case(&conn, &spec_a, &case.id).unwrap();
        assert_eq!(claimed.specialist_id, Some(spec_a.id));
        assert_eq!(claimed.status, CaseStatus::AwaitingPhase1);

        assert!(matches!(
            claim_case(&conn, &spec_b, &case.id),
            Err(LifecycleError::AlreadyClaimed)
        ));
    }

    #[test]
    fn claim_refuses_gps_and_hides_unsubmitted_drafts() {
        let conn = open_memory_database().unwrap();
        let gp = Actor::gp(seed_profile(&conn, UserRole::Gp, None));
        let spec = Actor::specialist(seed_profile(&conn, UserRole::Specialist, Some("Cardiology")));
        let case = create_draft(&conn, &gp, draft_fields()).unwrap();

        assert!(matches!(
            claim_case(&conn, &gp, &case.id),
            Err(LifecycleError::NotAuthorized)
        ));
        // Same answer as for a case that does not exist at all.
        assert!(matches!(
            claim_case(&conn, &spec, &case.id),
            Err(LifecycleError::NotFound)
        ));
    }

    #[test]
    fn concurrent_claims_have_exactly_one_winner() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("race.db");

        let (case_id, spec_a, spec_b) = {
            let conn = open_database(&db_path).unwrap();
            let gp = Actor::gp(seed_profile(&conn, UserRole::Gp, None));
            let a = Actor::specialist(seed_profile(&conn, UserRole::Specialist, Some("Cardiology")));
            let b = Actor::specialist(seed_profile(&conn, UserRole::Specialist, Some("Cardiology")));
            let case = create_draft(&conn, &gp, draft_fields()).unwrap();
            submit_case(&conn, &gp, &case.id, &FakeGateway).unwrap();
            (case.id, a, b)
        };

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [spec_a, spec_b]
            .into_iter()
            .map(|actor| {
                let barrier = Arc::clone(&barrier);
                let db_path = db_path.clone();
                std::thread::spawn(move || {
                    let conn = open_database(&db_path).unwrap();
                    barrier.wait();
                    claim_case(&conn, &actor, &case_id).map(|c| c.specialist_id)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
        assert_eq!(winners.len(), 1, "exactly one claim must win: {results:?}");
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(LifecycleError::AlreadyClaimed))));

        let conn = open_database(&db_path).unwrap();
        let final_specialist = require_case(&conn, &case_id).unwrap().specialist_id;
        assert!(final_specialist.is_some());
        assert_eq!(
            winners[0].as_ref().ok().copied().flatten(),
            final_specialist,
            "winner's id must be the persisted specialist"
        );
    }

    #[test]
    fn phase1_validates_plan_author_and_state() {
        let conn = open_memory_database().unwrap();
        let (case, gp, spec) = claimed_case(&conn);

        assert!(matches!(
            submit_phase1(&conn, &spec, &case.id, "  "),
            Err(LifecycleError::Validation(_))
        ));
        assert!(matches!(
            submit_phase1(&conn, &gp, &case.id, "Echo + Holter"),
            Err(LifecycleError::NotAuthorized)
        ));

        let updated = submit_phase1(&conn, &spec, &case.id, "Echo + Holter").unwrap();
        assert_eq!(updated.status, CaseStatus::AwaitingDiagnostics);
        assert_eq!(updated.phase1_plan.as_deref(), Some("Echo + Holter"));

        // The plan is marked on the timeline as a report message.
        let messages = repo::list_case_messages(&conn, &case.id).unwrap();
        assert!(messages
            .iter()
            .any(|m| m.message_type == MessageType::ReportPhase1 && m.content == "Echo + Holter"));

        // Re-submission is out of order now.
        assert!(matches!(
            submit_phase1(&conn, &spec, &case.id, "again"),
            Err(LifecycleError::InvalidState(_))
        ));
    }

    #[test]
    fn diagnostics_require_files_before_advancing() {
        let conn = open_memory_database().unwrap();
        let (case, gp, spec) = claimed_case(&conn);
        submit_phase1(&conn, &spec, &case.id, "Echo + Holter").unwrap();

        assert!(matches!(
            submit_diagnostics(&conn, &gp, &case.id, None),
            Err(LifecycleError::InvalidState(_))
        ));

        seed_diag_file(&conn, case.id, gp.id);
        let (updated, notifications) =
            submit_diagnostics(&conn, &gp, &case.id, Some("Echo attached")).unwrap();
        assert_eq!(updated.status, CaseStatus::AwaitingPhase2);
        assert_eq!(notifications.len(), 1, "assigned specialist notified");
    }

    #[test]
    fn failed_diagnostics_submission_leaves_no_notes_message() {
        let conn = open_memory_database().unwrap();
        let (case, gp, spec) = claimed_case(&conn);
        submit_phase1(&conn, &spec, &case.id, "Echo + Holter").unwrap();
        seed_diag_file(&conn, case.id, gp.id);

        submit_diagnostics(&conn, &gp, &case.id, Some("first round")).unwrap();
        let after_first = repo::list_case_messages(&conn, &case.id).unwrap().len();

        // The round is already closed; the retry must not advance and must
        // not leave its notes behind.
        assert!(matches!(
            submit_diagnostics(&conn, &gp, &case.id, Some("stale retry")),
            Err(LifecycleError::InvalidState(_))
        ));
        let messages = repo::list_case_messages(&conn, &case.id).unwrap();
        assert_eq!(messages.len(), after_first);
        assert!(!messages.iter().any(|m| m.content == "stale retry"));
    }

    #[test]
    fn phase2_requires_all_four_fields_and_completes() {
        let conn = open_memory_database().unwrap();
        let (case, gp, spec) = claimed_case(&conn);
        submit_phase1(&conn, &spec, &case.id, "Echo + Holter").unwrap();
        seed_diag_file(&conn, case.id, gp.id);
        submit_diagnostics(&conn, &gp, &case.id, None).unwrap();

        let incomplete = Phase2Report {
            assessment: "DCM".into(),
            treatment_plan: "Pimobendan".into(),
            prognosis: "".into(),
            client_summary: "Manageable".into(),
        };
        assert!(matches!(
            submit_phase2(&conn, &spec, &case.id, &incomplete, None),
            Err(LifecycleError::Validation(_))
        ));

        let report = Phase2Report { prognosis: "Guarded".into(), ..incomplete };
        let (completed, notifications) =
            submit_phase2(&conn, &spec, &case.id, &report, Some("cases/x/report.pdf")).unwrap();
        assert_eq!(completed.status, CaseStatus::Completed);
        assert_eq!(completed.final_report_path.as_deref(), Some("cases/x/report.pdf"));
        assert_eq!(notifications.len(), 1, "GP notified of completion");

        let messages = repo::list_case_messages(&conn, &case.id).unwrap();
        assert!(messages.iter().any(|m| m.message_type == MessageType::ReportPhase2));
        assert!(messages.iter().any(|m| m.message_type == MessageType::ReportFinal));
    }

    #[test]
    fn out_of_order_transitions_are_rejected() {
        let conn = open_memory_database().unwrap();
        let gp = Actor::gp(seed_profile(&conn, UserRole::Gp, None));
        let spec = Actor::specialist(seed_profile(&conn, UserRole::Specialist, Some("Cardiology")));
        let case = create_draft(&conn, &gp, draft_fields()).unwrap();
        submit_case(&conn, &gp, &case.id, &FakeGateway).unwrap();
        claim_case(&conn, &spec, &case.id).unwrap();

        // Phase 2 straight after claim skips two states.
        let report = Phase2Report {
            assessment: "a".into(),
            treatment_plan: "b".into(),
            prognosis: "c".into(),
            client_summary: "d".into(),
        };
        assert!(matches!(
            submit_phase2(&conn, &spec, &case.id, &report, None),
            Err(LifecycleError::InvalidState(_))
        ));
        // Diagnostics before phase 1 likewise.
        assert!(matches!(
            submit_diagnostics(&conn, &gp, &case.id, None),
            Err(LifecycleError::InvalidState(_))
        ));
    }

    #[test]
    fn delete_draft_returns_paths_then_refuses_after_submit() {
        let conn = open_memory_database().unwrap();
        let gp = Actor::gp(seed_profile(&conn, UserRole::Gp, None));
        let case = create_draft(&conn, &gp, draft_fields()).unwrap();
        repo::insert_case_file(
            &conn,
            &CaseFile {
                id: Uuid::new_v4(),
                case_id: case.id,
                uploader_id: gp.id,
                file_name: "rads.jpg".into(),
                content_type: None,
                storage_path: format!("cases/{}/rads.jpg", case.id),
                upload_phase: Some(UploadPhase::InitialSubmission),
                is_draft: true,
                uploaded_at: Utc::now(),
            },
        )
        .unwrap();

        let paths = delete_draft(&conn, &gp, &case.id).unwrap();
        assert_eq!(paths.len(), 1);
        assert!(matches!(
            require_case(&conn, &case.id),
            Err(LifecycleError::NotFound)
        ));

        let case = create_draft(&conn, &gp, draft_fields()).unwrap();
        submit_case(&conn, &gp, &case.id, &FakeGateway).unwrap();
        assert!(matches!(
            delete_draft(&conn, &gp, &case.id),
            Err(LifecycleError::InvalidState(_))
        ));
    }

    #[test]
    fn view_authorization_covers_browse_and_assignment() {
        let conn = open_memory_database().unwrap();
        let gp = Actor::gp(seed_profile(&conn, UserRole::Gp, None));
        let spec_a = Actor::specialist(seed_profile(&conn, UserRole::Specialist, Some("Cardiology")));
        let spec_b = Actor::specialist(seed_profile(&conn, UserRole::Specialist, Some("Cardiology")));
        let other_gp = Actor::gp(seed_profile(&conn, UserRole::Gp, None));

        let case = create_draft(&conn, &gp, draft_fields()).unwrap();
        let draft = require_case(&conn, &case.id).unwrap();
        assert!(can_view_case(&draft, &gp));
        assert!(!can_view_case(&draft, &spec_a), "drafts are private");

        submit_case(&conn, &gp, &case.id, &FakeGateway).unwrap();
        let pending = require_case(&conn, &case.id).unwrap();
        assert!(can_view_case(&pending, &spec_a), "specialists browse unassigned cases");
        assert!(!can_view_case(&pending, &other_gp));

        claim_case(&conn, &spec_a, &case.id).unwrap();
        let assigned = require_case(&conn, &case.id).unwrap();
        assert!(can_view_case(&assigned, &spec_a));
        assert!(!can_view_case(&assigned, &spec_b), "assignment closes the case");
    }

    #[test]
    fn messages_restricted_to_participants() {
        let conn = open_memory_database().unwrap();
        let (case, gp, spec) = claimed_case(&conn);
        let outsider =
            Actor::specialist(seed_profile(&conn, UserRole::Specialist, Some("Cardiology")));

        assert!(post_message(&conn, &gp, &case.id, "How is it looking?").is_ok());
        assert!(post_message(&conn, &spec, &case.id, "Reviewing now").is_ok());
        assert!(matches!(
            post_message(&conn, &outsider, &case.id, "Let me in"),
            Err(LifecycleError::NotAuthorized)
        ));
    }

    #[test]
    fn no_status_ever_leaves_the_enum() {
        // Walk the full legal sequence and check each persisted status
        // parses back through the enum.
        let conn = open_memory_database().unwrap();
        let (case, gp, spec) = claimed_case(&conn);
        submit_phase1(&conn, &spec, &case.id, "Plan").unwrap();
        seed_diag_file(&conn, case.id, gp.id);
        submit_diagnostics(&conn, &gp, &case.id, None).unwrap();
        let report = Phase2Report {
            assessment: "a".into(),
            treatment_plan: "b".into(),
            prognosis: "c".into(),
            client_summary: "d".into(),
        };
        submit_phase2(&conn, &spec, &case.id, &report, None).unwrap();

        // get_case round-trips status through FromStr; reaching here without
        // an InvalidEnum error is the assertion.
        assert_eq!(require_case(&conn, &case.id).unwrap().status, CaseStatus::Completed);
    }
}
