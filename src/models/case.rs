use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::CaseStatus;

/// One consultation request, owned by the submitting GP and (once claimed)
/// assigned to a single specialist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: Uuid,
    pub gp_id: Uuid,
    pub specialist_id: Option<Uuid>,
    pub status: CaseStatus,
    pub specialty_requested: String,

    pub patient: PatientFields,
    pub clinical: ClinicalFields,

    /// Specialist's phase-1 diagnostic plan.
    pub phase1_plan: Option<String>,
    /// Phase-2 report fields, all set together on completion.
    pub assessment: Option<String>,
    pub treatment_plan: Option<String>,
    pub prognosis: Option<String>,
    pub client_summary: Option<String>,
    pub final_report_path: Option<String>,

    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Patient signalment as entered by the GP.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientFields {
    pub patient_name: String,
    pub species: String,
    pub breed: Option<String>,
    pub age: Option<String>,
    pub sex_status: Option<String>,
    pub weight: Option<String>,
}

/// Free-text clinical narrative as entered by the GP.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClinicalFields {
    pub presenting_complaint: String,
    pub history: Option<String>,
    pub exam_findings: Option<String>,
    pub current_medications: Option<String>,
    pub diagnostics_performed: Option<String>,
    pub treatments_attempted: Option<String>,
    pub gp_question: String,
    pub financial_constraints: Option<String>,
}

/// Fields a GP supplies when creating or editing a draft.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseDraftFields {
    pub specialty_requested: String,
    #[serde(flatten)]
    pub patient: PatientFields,
    #[serde(flatten)]
    pub clinical: ClinicalFields,
}

/// Phase-2 report payload — all four narrative fields are required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase2Report {
    pub assessment: String,
    pub treatment_plan: String,
    pub prognosis: String,
    pub client_summary: String,
}
