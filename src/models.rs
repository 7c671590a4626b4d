use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Teacher,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterventionStatus {
    #[default]
    Planned,
    Ongoing,
    Completed,
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

/// Text round-tripping for the enums stored as `TEXT` columns.
macro_rules! text_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl FromStr for $ty {
            type Err = ParseEnumError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($ty::$variant),)+
                    _ => Err(ParseEnumError {
                        kind: $kind,
                        value: value.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(RiskLevel, "risk level", { Low => "low", Medium => "medium", High => "high" });
text_enum!(Role, "role", { Teacher => "teacher", Admin => "admin" });
text_enum!(AttendanceStatus, "attendance status", {
    Present => "present",
    Absent => "absent",
    Late => "late",
});
text_enum!(InterventionStatus, "intervention status", {
    Planned => "planned",
    Ongoing => "ongoing",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl RiskLevel {
    /// Class index used by the trainer's target column.
    pub fn from_class(class: usize) -> Option<Self> {
        match class {
            0 => Some(RiskLevel::Low),
            1 => Some(RiskLevel::Medium),
            2 => Some(RiskLevel::High),
            _ => None,
        }
    }
}

impl InterventionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, InterventionStatus::Planned | InterventionStatus::Ongoing)
    }
}

/// Application-owned row that gates API access for a principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(id: Uuid, email: &str, full_name: &str, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id,
            email: email.to_string(),
            full_name: full_name.to_string(),
            role,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub name: String,
    pub roll_number: String,
    pub email: Option<String>,
    pub program: String,
    pub semester: i32,
    pub current_gpa: Option<f64>,
    pub previous_gpa: Option<f64>,
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub last_prediction_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewStudent {
    pub name: String,
    pub roll_number: String,
    pub email: Option<String>,
    pub program: String,
    pub semester: i32,
    pub current_gpa: Option<f64>,
    pub previous_gpa: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub program: Option<String>,
    pub semester: Option<i32>,
    pub current_gpa: Option<f64>,
    pub previous_gpa: Option<f64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub date: NaiveDate,
    pub subject: String,
    pub status: AttendanceStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAttendance {
    pub date: NaiveDate,
    pub subject: String,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcademicRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub semester: i32,
    pub subject: String,
    pub marks: f64,
    pub max_marks: f64,
    pub grade: Option<String>,
    pub exam_type: String,
    pub exam_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAcademicRecord {
    pub semester: i32,
    pub subject: String,
    pub marks: f64,
    pub max_marks: f64,
    pub grade: Option<String>,
    pub exam_type: String,
    pub exam_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: Uuid,
    pub student_id: Uuid,
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub confidence: Option<f64>,
    pub model_version: Option<String>,
    pub prediction_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPrediction {
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub confidence: Option<f64>,
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    pub id: Uuid,
    pub student_id: Uuid,
    pub intervention_type: String,
    pub description: String,
    pub status: InterventionStatus,
    pub assigned_to: Option<Uuid>,
    pub scheduled_date: Option<NaiveDate>,
    pub outcome: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewIntervention {
    pub intervention_type: String,
    pub description: String,
    #[serde(default)]
    pub status: InterventionStatus,
    pub assigned_to: Option<Uuid>,
    pub scheduled_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InterventionUpdate {
    pub status: Option<InterventionStatus>,
    pub description: Option<String>,
    pub scheduled_date: Option<NaiveDate>,
    pub outcome: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub semester: i32,
    pub fee_amount: f64,
    pub amount_paid: f64,
    pub scholarship_amount: f64,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewFinancialRecord {
    pub semester: i32,
    pub fee_amount: f64,
    pub amount_paid: f64,
    #[serde(default)]
    pub scholarship_amount: f64,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RiskDistribution {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StudentStatistics {
    pub total_students: usize,
    pub active_students: usize,
    pub high_risk_students: usize,
    pub medium_risk_students: usize,
    pub low_risk_students: usize,
    pub average_gpa: f64,
    pub average_risk_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    #[serde(flatten)]
    pub students: StudentStatistics,
    pub recent_predictions: Vec<Prediction>,
    pub active_interventions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_round_trip_through_text() {
        for level in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High] {
            assert_eq!(level.as_str().parse::<RiskLevel>().unwrap(), level);
        }
        assert_eq!("late".parse::<AttendanceStatus>().unwrap(), AttendanceStatus::Late);
        assert!("severe".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn risk_level_serializes_lowercase() {
        let json = serde_json::to_string(&RiskLevel::High).unwrap();
        assert_eq!(json, "\"high\"");
    }

    #[test]
    fn only_planned_and_ongoing_interventions_are_active() {
        assert!(InterventionStatus::Planned.is_active());
        assert!(InterventionStatus::Ongoing.is_active());
        assert!(!InterventionStatus::Completed.is_active());
        assert!(!InterventionStatus::Cancelled.is_active());
    }
}
