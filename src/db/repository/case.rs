use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::CaseStatus;
use crate::models::{Case, CaseDraftFields, Phase2Report};

const CASE_COLUMNS: &str = "id, gp_id, specialist_id, status, specialty_requested,
     patient_name, species, breed, age, sex_status, weight,
     presenting_complaint, history, exam_findings, current_medications,
     diagnostics_performed, treatments_attempted, gp_question, financial_constraints,
     phase1_plan, assessment, treatment_plan, prognosis, client_summary,
     final_report_path, submitted_at, created_at, updated_at";

pub fn insert_case(conn: &Connection, case: &Case) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO cases (id, gp_id, specialist_id, status, specialty_requested,
             patient_name, species, breed, age, sex_status, weight,
             presenting_complaint, history, exam_findings, current_medications,
             diagnostics_performed, treatments_attempted, gp_question, financial_constraints,
             submitted_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                 ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
        params![
            case.id.to_string(),
            case.gp_id.to_string(),
            case.specialist_id.map(|id| id.to_string()),
            case.status.as_str(),
            case.specialty_requested,
            case.patient.patient_name,
            case.patient.species,
            case.patient.breed,
            case.patient.age,
            case.patient.sex_status,
            case.patient.weight,
            case.clinical.presenting_complaint,
            case.clinical.history,
            case.clinical.exam_findings,
            case.clinical.current_medications,
            case.clinical.diagnostics_performed,
            case.clinical.treatments_attempted,
            case.clinical.gp_question,
            case.clinical.financial_constraints,
            case.submitted_at,
            case.created_at,
            case.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_case(conn: &Connection, id: &Uuid) -> Result<Option<Case>, DatabaseError> {
    let sql = format!("SELECT {CASE_COLUMNS} FROM cases WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;

    let result = stmt.query_row(params![id.to_string()], case_row);
    match result {
        Ok(row) => Ok(Some(case_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Draft-only field edit. Returns the number of rows changed — zero when the
/// case has already left `draft`.
pub fn update_draft_fields(
    conn: &Connection,
    id: &Uuid,
    fields: &CaseDraftFields,
    now: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE cases SET specialty_requested = ?1,
             patient_name = ?2, species = ?3, breed = ?4, age = ?5,
             sex_status = ?6, weight = ?7,
             presenting_complaint = ?8, history = ?9, exam_findings = ?10,
             current_medications = ?11, diagnostics_performed = ?12,
             treatments_attempted = ?13, gp_question = ?14,
             financial_constraints = ?15, updated_at = ?16
         WHERE id = ?17 AND status = 'draft'",
        params![
            fields.specialty_requested,
            fields.patient.patient_name,
            fields.patient.species,
            fields.patient.breed,
            fields.patient.age,
            fields.patient.sex_status,
            fields.patient.weight,
            fields.clinical.presenting_complaint,
            fields.clinical.history,
            fields.clinical.exam_findings,
            fields.clinical.current_medications,
            fields.clinical.diagnostics_performed,
            fields.clinical.treatments_attempted,
            fields.clinical.gp_question,
            fields.clinical.financial_constraints,
            now,
            id.to_string(),
        ],
    )?;
    Ok(changed)
}

/// Hard delete, permitted only while the row is still a draft.
pub fn delete_draft(conn: &Connection, id: &Uuid) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM cases WHERE id = ?1 AND status = 'draft'",
        params![id.to_string()],
    )?;
    Ok(changed)
}

/// Count of a GP's cases that have left `draft` — the first-case payment
/// waiver check.
pub fn count_submitted_cases(conn: &Connection, gp_id: &Uuid) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM cases WHERE gp_id = ?1 AND status != 'draft'",
        params![gp_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Conditional draft → pending_assignment advance. The guard on both
/// `status` and `gp_id` makes payment confirmation idempotent: a second
/// confirmation matches zero rows.
pub fn mark_submitted(
    conn: &Connection,
    id: &Uuid,
    gp_id: &Uuid,
    now: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE cases SET status = 'pending_assignment', submitted_at = ?1, updated_at = ?1
         WHERE id = ?2 AND gp_id = ?3 AND status = 'draft'",
        params![now, id.to_string(), gp_id.to_string()],
    )?;
    Ok(changed)
}

/// Conditional claim — at most one winner. Both concurrent claimants run
/// this same single UPDATE; SQLite serializes the writes and the loser's
/// predicate no longer matches, so it changes zero rows.
pub fn claim(
    conn: &Connection,
    id: &Uuid,
    specialist_id: &Uuid,
    now: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE cases SET specialist_id = ?1, status = 'awaiting_phase1', updated_at = ?2
         WHERE id = ?3 AND specialist_id IS NULL AND status = 'pending_assignment'",
        params![specialist_id.to_string(), now, id.to_string()],
    )?;
    Ok(changed)
}

/// Persist the phase-1 plan and advance, guarded on current status.
pub fn set_phase1_plan(
    conn: &Connection,
    id: &Uuid,
    plan: &str,
    now: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE cases SET phase1_plan = ?1, status = 'awaiting_diagnostics', updated_at = ?2
         WHERE id = ?3 AND status = 'awaiting_phase1'",
        params![plan, now, id.to_string()],
    )?;
    Ok(changed)
}

/// Diagnostics round complete → awaiting_phase2, guarded on current status.
pub fn advance_to_phase2(
    conn: &Connection,
    id: &Uuid,
    now: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE cases SET status = 'awaiting_phase2', updated_at = ?1
         WHERE id = ?2 AND status = 'awaiting_diagnostics'",
        params![now, id.to_string()],
    )?;
    Ok(changed)
}

/// Persist the phase-2 report and complete the case, guarded on status.
pub fn set_phase2_report(
    conn: &Connection,
    id: &Uuid,
    report: &Phase2Report,
    final_report_path: Option<&str>,
    now: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE cases SET assessment = ?1, treatment_plan = ?2, prognosis = ?3,
             client_summary = ?4, final_report_path = ?5,
             status = 'completed', updated_at = ?6
         WHERE id = ?7 AND status = 'awaiting_phase2'",
        params![
            report.assessment,
            report.treatment_plan,
            report.prognosis,
            report.client_summary,
            final_report_path,
            now,
            id.to_string(),
        ],
    )?;
    Ok(changed)
}

pub fn list_cases_for_gp(conn: &Connection, gp_id: &Uuid) -> Result<Vec<Case>, DatabaseError> {
    let sql = format!(
        "SELECT {CASE_COLUMNS} FROM cases WHERE gp_id = ?1 ORDER BY created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![gp_id.to_string()], case_row)?;
    rows.collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(case_from_row)
        .collect()
}

/// Cases visible to a specialist: those assigned to them plus unassigned
/// pending cases whose requested specialty their declared specialty covers.
pub fn list_cases_for_specialist(
    conn: &Connection,
    specialist_id: &Uuid,
    specialty: Option<&str>,
) -> Result<Vec<Case>, DatabaseError> {
    let sql = format!(
        "SELECT {CASE_COLUMNS} FROM cases
         WHERE specialist_id = ?1
            OR (status = 'pending_assignment' AND specialist_id IS NULL
                AND instr(lower(?2), lower(specialty_requested)) > 0)
         ORDER BY created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![specialist_id.to_string(), specialty.unwrap_or("")],
        case_row,
    )?;
    rows.collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(case_from_row)
        .collect()
}

// Internal row type for Case mapping
struct CaseRow {
    id: String,
    gp_id: String,
    specialist_id: Option<String>,
    status: String,
    specialty_requested: String,
    patient_name: String,
    species: String,
    breed: Option<String>,
    age: Option<String>,
    sex_status: Option<String>,
    weight: Option<String>,
    presenting_complaint: String,
    history: Option<String>,
    exam_findings: Option<String>,
    current_medications: Option<String>,
    diagnostics_performed: Option<String>,
    treatments_attempted: Option<String>,
    gp_question: String,
    financial_constraints: Option<String>,
    phase1_plan: Option<String>,
    assessment: Option<String>,
    treatment_plan: Option<String>,
    prognosis: Option<String>,
    client_summary: Option<String>,
    final_report_path: Option<String>,
    submitted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn case_row(row: &Row<'_>) -> rusqlite::Result<CaseRow> {
    Ok(CaseRow {
        id: row.get("id")?,
        gp_id: row.get("gp_id")?,
        specialist_id: row.get("specialist_id")?,
        status: row.get("status")?,
        specialty_requested: row.get("specialty_requested")?,
        patient_name: row.get("patient_name")?,
        species: row.get("species")?,
        breed: row.get("breed")?,
        age: row.get("age")?,
        sex_status: row.get("sex_status")?,
        weight: row.get("weight")?,
        presenting_complaint: row.get("presenting_complaint")?,
        history: row.get("history")?,
        exam_findings: row.get("exam_findings")?,
        current_medications: row.get("current_medications")?,
        diagnostics_performed: row.get("diagnostics_performed")?,
        treatments_attempted: row.get("treatments_attempted")?,
        gp_question: row.get("gp_question")?,
        financial_constraints: row.get("financial_constraints")?,
        phase1_plan: row.get("phase1_plan")?,
        assessment: row.get("assessment")?,
        treatment_plan: row.get("treatment_plan")?,
        prognosis: row.get("prognosis")?,
        client_summary: row.get("client_summary")?,
        final_report_path: row.get("final_report_path")?,
        submitted_at: row.get("submitted_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn case_from_row(row: CaseRow) -> Result<Case, DatabaseError> {
    let parse_id = |s: &str| {
        Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
    };
    Ok(Case {
        id: parse_id(&row.id)?,
        gp_id: parse_id(&row.gp_id)?,
        specialist_id: row.specialist_id.as_deref().map(parse_id).transpose()?,
        status: CaseStatus::from_str(&row.status)?,
        specialty_requested: row.specialty_requested,
        patient: crate::models::PatientFields {
            patient_name: row.patient_name,
            species: row.species,
            breed: row.breed,
            age: row.age,
            sex_status: row.sex_status,
            weight: row.weight,
        },
        clinical: crate::models::ClinicalFields {
            presenting_complaint: row.presenting_complaint,
            history: row.history,
            exam_findings: row.exam_findings,
            current_medications: row.current_medications,
            diagnostics_performed: row.diagnostics_performed,
            treatments_attempted: row.treatments_attempted,
            gp_question: row.gp_question,
            financial_constraints: row.financial_constraints,
        },
        phase1_plan: row.phase1_plan,
        assessment: row.assessment,
        treatment_plan: row.treatment_plan,
        prognosis: row.prognosis,
        client_summary: row.client_summary,
        final_report_path: row.final_report_path,
        submitted_at: row.submitted_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
