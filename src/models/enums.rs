use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(UserRole {
    Gp => "gp",
    Specialist => "specialist",
});

str_enum!(CaseStatus {
    Draft => "draft",
    PendingAssignment => "pending_assignment",
    AwaitingPhase1 => "awaiting_phase1",
    AwaitingDiagnostics => "awaiting_diagnostics",
    AwaitingPhase2 => "awaiting_phase2",
    Completed => "completed",
    Cancelled => "cancelled",
});

str_enum!(UploadPhase {
    InitialSubmission => "initial_submission",
    DiagnosticResults => "diagnostic_results",
    SpecialistReport => "specialist_report",
});

str_enum!(MessageType {
    Text => "text",
    System => "system",
    ReportPhase1 => "report_phase1",
    ReportPhase2 => "report_phase2",
    ReportFinal => "report_final",
});
