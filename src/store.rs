use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    AcademicRecord, AttendanceRecord, FinancialRecord, Intervention, InterventionUpdate,
    NewAcademicRecord, NewAttendance, NewFinancialRecord, NewIntervention, NewPrediction,
    NewStudent, Prediction, Profile, RiskLevel, Student, StudentUpdate,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Profile rows and per-entity record accessors.
///
/// Every method touches one table, except [`Store::save_prediction`], which
/// must also refresh the owning student's risk snapshot in the same unit of
/// work.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_profile(&self, profile: &Profile) -> StoreResult<Profile>;
    async fn upsert_profile(&self, profile: &Profile) -> StoreResult<Profile>;
    async fn get_profile(&self, id: Uuid) -> StoreResult<Option<Profile>>;
    /// Returns whether a row was removed.
    async fn delete_profile(&self, id: Uuid) -> StoreResult<bool>;

    async fn create_student(&self, student: &NewStudent) -> StoreResult<Student>;
    async fn get_student(&self, id: Uuid) -> StoreResult<Option<Student>>;
    async fn get_student_by_roll_number(&self, roll_number: &str) -> StoreResult<Option<Student>>;
    async fn list_students(&self, active_only: bool) -> StoreResult<Vec<Student>>;
    async fn update_student(&self, id: Uuid, update: &StudentUpdate) -> StoreResult<Student>;
    async fn update_student_risk(
        &self,
        id: Uuid,
        risk_level: RiskLevel,
        risk_score: f64,
    ) -> StoreResult<Student>;
    /// Active students at high risk, highest score first.
    async fn high_risk_students(&self) -> StoreResult<Vec<Student>>;

    async fn record_attendance(
        &self,
        student_id: Uuid,
        attendance: &NewAttendance,
    ) -> StoreResult<AttendanceRecord>;
    /// Newest first.
    async fn student_attendance(&self, student_id: Uuid) -> StoreResult<Vec<AttendanceRecord>>;

    async fn add_academic_record(
        &self,
        student_id: Uuid,
        record: &NewAcademicRecord,
    ) -> StoreResult<AcademicRecord>;
    /// Latest semester first.
    async fn student_academic_records(&self, student_id: Uuid)
        -> StoreResult<Vec<AcademicRecord>>;

    async fn save_prediction(
        &self,
        student_id: Uuid,
        prediction: &NewPrediction,
    ) -> StoreResult<Prediction>;
    async fn student_predictions(&self, student_id: Uuid, limit: usize)
        -> StoreResult<Vec<Prediction>>;
    async fn latest_prediction(&self, student_id: Uuid) -> StoreResult<Option<Prediction>>;
    async fn recent_predictions(&self, limit: usize) -> StoreResult<Vec<Prediction>>;

    async fn create_intervention(
        &self,
        student_id: Uuid,
        intervention: &NewIntervention,
    ) -> StoreResult<Intervention>;
    async fn student_interventions(&self, student_id: Uuid) -> StoreResult<Vec<Intervention>>;
    async fn update_intervention(
        &self,
        id: Uuid,
        update: &InterventionUpdate,
    ) -> StoreResult<Intervention>;
    async fn count_active_interventions(&self) -> StoreResult<usize>;

    async fn add_financial_record(
        &self,
        student_id: Uuid,
        record: &NewFinancialRecord,
    ) -> StoreResult<FinancialRecord>;
    async fn student_financial_records(&self, student_id: Uuid)
        -> StoreResult<Vec<FinancialRecord>>;
}

#[derive(Default)]
struct Tables {
    profiles: HashMap<Uuid, Profile>,
    students: HashMap<Uuid, Student>,
    attendance: Vec<AttendanceRecord>,
    academic_records: Vec<AcademicRecord>,
    predictions: Vec<Prediction>,
    interventions: Vec<Intervention>,
    financial_records: Vec<FinancialRecord>,
}

impl Tables {
    fn require_student(&self, id: Uuid) -> StoreResult<()> {
        if self.students.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::NotFound("student"))
        }
    }
}

/// Process-local store behind a single lock, used by `serve --in-memory`
/// and the tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_profile(&self, profile: &Profile) -> StoreResult<Profile> {
        let mut tables = self.tables.write().await;
        if tables.profiles.contains_key(&profile.id) {
            return Err(StoreError::Conflict("profile already exists".to_string()));
        }
        if tables.profiles.values().any(|p| p.email == profile.email) {
            return Err(StoreError::Conflict(format!(
                "email {} is already registered",
                profile.email
            )));
        }
        tables.profiles.insert(profile.id, profile.clone());
        Ok(profile.clone())
    }

    async fn upsert_profile(&self, profile: &Profile) -> StoreResult<Profile> {
        let mut tables = self.tables.write().await;
        let stored = match tables.profiles.get(&profile.id) {
            Some(existing) => Profile {
                created_at: existing.created_at,
                updated_at: Utc::now(),
                ..profile.clone()
            },
            None => profile.clone(),
        };
        tables.profiles.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_profile(&self, id: Uuid) -> StoreResult<Option<Profile>> {
        Ok(self.tables.read().await.profiles.get(&id).cloned())
    }

    async fn delete_profile(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.tables.write().await.profiles.remove(&id).is_some())
    }

    async fn create_student(&self, student: &NewStudent) -> StoreResult<Student> {
        let mut tables = self.tables.write().await;
        if tables
            .students
            .values()
            .any(|s| s.roll_number == student.roll_number)
        {
            return Err(StoreError::Conflict(format!(
                "roll number {} already exists",
                student.roll_number
            )));
        }
        let now = Utc::now();
        let created = Student {
            id: Uuid::new_v4(),
            name: student.name.clone(),
            roll_number: student.roll_number.clone(),
            email: student.email.clone(),
            program: student.program.clone(),
            semester: student.semester,
            current_gpa: student.current_gpa,
            previous_gpa: student.previous_gpa,
            risk_level: RiskLevel::Low,
            risk_score: 0.0,
            last_prediction_date: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        tables.students.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_student(&self, id: Uuid) -> StoreResult<Option<Student>> {
        Ok(self.tables.read().await.students.get(&id).cloned())
    }

    async fn get_student_by_roll_number(&self, roll_number: &str) -> StoreResult<Option<Student>> {
        Ok(self
            .tables
            .read()
            .await
            .students
            .values()
            .find(|s| s.roll_number == roll_number)
            .cloned())
    }

    async fn list_students(&self, active_only: bool) -> StoreResult<Vec<Student>> {
        let tables = self.tables.read().await;
        let mut students: Vec<Student> = tables
            .students
            .values()
            .filter(|s| !active_only || s.is_active)
            .cloned()
            .collect();
        students.sort_by(|a, b| a.roll_number.cmp(&b.roll_number));
        Ok(students)
    }

    async fn update_student(&self, id: Uuid, update: &StudentUpdate) -> StoreResult<Student> {
        let mut tables = self.tables.write().await;
        let student = tables
            .students
            .get_mut(&id)
            .ok_or(StoreError::NotFound("student"))?;
        if let Some(name) = &update.name {
            student.name = name.clone();
        }
        if let Some(email) = &update.email {
            student.email = Some(email.clone());
        }
        if let Some(program) = &update.program {
            student.program = program.clone();
        }
        if let Some(semester) = update.semester {
            student.semester = semester;
        }
        if let Some(gpa) = update.current_gpa {
            student.current_gpa = Some(gpa);
        }
        if let Some(gpa) = update.previous_gpa {
            student.previous_gpa = Some(gpa);
        }
        if let Some(active) = update.is_active {
            student.is_active = active;
        }
        student.updated_at = Utc::now();
        Ok(student.clone())
    }

    async fn update_student_risk(
        &self,
        id: Uuid,
        risk_level: RiskLevel,
        risk_score: f64,
    ) -> StoreResult<Student> {
        let mut tables = self.tables.write().await;
        let student = tables
            .students
            .get_mut(&id)
            .ok_or(StoreError::NotFound("student"))?;
        let now = Utc::now();
        student.risk_level = risk_level;
        student.risk_score = risk_score;
        student.last_prediction_date = Some(now);
        student.updated_at = now;
        Ok(student.clone())
    }

    async fn high_risk_students(&self) -> StoreResult<Vec<Student>> {
        let tables = self.tables.read().await;
        let mut students: Vec<Student> = tables
            .students
            .values()
            .filter(|s| s.is_active && s.risk_level == RiskLevel::High)
            .cloned()
            .collect();
        students.sort_by(|a, b| {
            b.risk_score
                .partial_cmp(&a.risk_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(students)
    }

    async fn record_attendance(
        &self,
        student_id: Uuid,
        attendance: &NewAttendance,
    ) -> StoreResult<AttendanceRecord> {
        let mut tables = self.tables.write().await;
        tables.require_student(student_id)?;
        let duplicate = tables.attendance.iter().any(|a| {
            a.student_id == student_id && a.date == attendance.date && a.subject == attendance.subject
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "attendance for {} on {} already recorded",
                attendance.subject, attendance.date
            )));
        }
        let record = AttendanceRecord {
            id: Uuid::new_v4(),
            student_id,
            date: attendance.date,
            subject: attendance.subject.clone(),
            status: attendance.status,
            created_at: Utc::now(),
        };
        tables.attendance.push(record.clone());
        Ok(record)
    }

    async fn student_attendance(&self, student_id: Uuid) -> StoreResult<Vec<AttendanceRecord>> {
        let tables = self.tables.read().await;
        let mut records: Vec<AttendanceRecord> = tables
            .attendance
            .iter()
            .filter(|a| a.student_id == student_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(records)
    }

    async fn add_academic_record(
        &self,
        student_id: Uuid,
        record: &NewAcademicRecord,
    ) -> StoreResult<AcademicRecord> {
        let mut tables = self.tables.write().await;
        tables.require_student(student_id)?;
        let duplicate = tables.academic_records.iter().any(|r| {
            r.student_id == student_id
                && r.semester == record.semester
                && r.subject == record.subject
                && r.exam_type == record.exam_type
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "{} {} result for semester {} already recorded",
                record.subject, record.exam_type, record.semester
            )));
        }
        let stored = AcademicRecord {
            id: Uuid::new_v4(),
            student_id,
            semester: record.semester,
            subject: record.subject.clone(),
            marks: record.marks,
            max_marks: record.max_marks,
            grade: record.grade.clone(),
            exam_type: record.exam_type.clone(),
            exam_date: record.exam_date,
            created_at: Utc::now(),
        };
        tables.academic_records.push(stored.clone());
        Ok(stored)
    }

    async fn student_academic_records(
        &self,
        student_id: Uuid,
    ) -> StoreResult<Vec<AcademicRecord>> {
        let tables = self.tables.read().await;
        let mut records: Vec<AcademicRecord> = tables
            .academic_records
            .iter()
            .filter(|r| r.student_id == student_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.semester.cmp(&a.semester));
        Ok(records)
    }

    async fn save_prediction(
        &self,
        student_id: Uuid,
        prediction: &NewPrediction,
    ) -> StoreResult<Prediction> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let student = tables
            .students
            .get_mut(&student_id)
            .ok_or(StoreError::NotFound("student"))?;
        student.risk_level = prediction.risk_level;
        student.risk_score = prediction.risk_score;
        student.last_prediction_date = Some(now);
        student.updated_at = now;

        let stored = Prediction {
            id: Uuid::new_v4(),
            student_id,
            risk_level: prediction.risk_level,
            risk_score: prediction.risk_score,
            confidence: prediction.confidence,
            model_version: prediction.model_version.clone(),
            prediction_date: now,
        };
        tables.predictions.push(stored.clone());
        Ok(stored)
    }

    async fn student_predictions(
        &self,
        student_id: Uuid,
        limit: usize,
    ) -> StoreResult<Vec<Prediction>> {
        let tables = self.tables.read().await;
        // Insertion order is chronological.
        Ok(tables
            .predictions
            .iter()
            .rev()
            .filter(|p| p.student_id == student_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn latest_prediction(&self, student_id: Uuid) -> StoreResult<Option<Prediction>> {
        Ok(self
            .student_predictions(student_id, 1)
            .await?
            .into_iter()
            .next())
    }

    async fn recent_predictions(&self, limit: usize) -> StoreResult<Vec<Prediction>> {
        let tables = self.tables.read().await;
        Ok(tables.predictions.iter().rev().take(limit).cloned().collect())
    }

    async fn create_intervention(
        &self,
        student_id: Uuid,
        intervention: &NewIntervention,
    ) -> StoreResult<Intervention> {
        let mut tables = self.tables.write().await;
        tables.require_student(student_id)?;
        let now = Utc::now();
        let stored = Intervention {
            id: Uuid::new_v4(),
            student_id,
            intervention_type: intervention.intervention_type.clone(),
            description: intervention.description.clone(),
            status: intervention.status,
            assigned_to: intervention.assigned_to,
            scheduled_date: intervention.scheduled_date,
            outcome: None,
            created_at: now,
            updated_at: now,
        };
        tables.interventions.push(stored.clone());
        Ok(stored)
    }

    async fn student_interventions(&self, student_id: Uuid) -> StoreResult<Vec<Intervention>> {
        let tables = self.tables.read().await;
        Ok(tables
            .interventions
            .iter()
            .rev()
            .filter(|i| i.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn update_intervention(
        &self,
        id: Uuid,
        update: &InterventionUpdate,
    ) -> StoreResult<Intervention> {
        let mut tables = self.tables.write().await;
        let intervention = tables
            .interventions
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(StoreError::NotFound("intervention"))?;
        if let Some(status) = update.status {
            intervention.status = status;
        }
        if let Some(description) = &update.description {
            intervention.description = description.clone();
        }
        if let Some(date) = update.scheduled_date {
            intervention.scheduled_date = Some(date);
        }
        if let Some(outcome) = &update.outcome {
            intervention.outcome = Some(outcome.clone());
        }
        intervention.updated_at = Utc::now();
        Ok(intervention.clone())
    }

    async fn count_active_interventions(&self) -> StoreResult<usize> {
        let tables = self.tables.read().await;
        Ok(tables
            .interventions
            .iter()
            .filter(|i| i.status.is_active())
            .count())
    }

    async fn add_financial_record(
        &self,
        student_id: Uuid,
        record: &NewFinancialRecord,
    ) -> StoreResult<FinancialRecord> {
        let mut tables = self.tables.write().await;
        tables.require_student(student_id)?;
        let stored = FinancialRecord {
            id: Uuid::new_v4(),
            student_id,
            semester: record.semester,
            fee_amount: record.fee_amount,
            amount_paid: record.amount_paid,
            scholarship_amount: record.scholarship_amount,
            due_date: record.due_date,
            created_at: Utc::now(),
        };
        tables.financial_records.push(stored.clone());
        Ok(stored)
    }

    async fn student_financial_records(
        &self,
        student_id: Uuid,
    ) -> StoreResult<Vec<FinancialRecord>> {
        let tables = self.tables.read().await;
        let mut records: Vec<FinancialRecord> = tables
            .financial_records
            .iter()
            .filter(|r| r.student_id == student_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.semester.cmp(&a.semester));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::AttendanceStatus;

    fn new_student(roll_number: &str) -> NewStudent {
        NewStudent {
            name: "Avery Lee".to_string(),
            roll_number: roll_number.to_string(),
            email: Some("avery.lee@example.edu".to_string()),
            program: "Computer Science".to_string(),
            semester: 3,
            current_gpa: Some(6.8),
            previous_gpa: Some(7.4),
        }
    }

    #[tokio::test]
    async fn duplicate_roll_number_is_a_conflict() {
        let store = MemoryStore::new();
        store.create_student(&new_student("CS2021001")).await.unwrap();

        let err = store
            .create_student(&new_student("CS2021001"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn saving_a_prediction_refreshes_the_student_snapshot() {
        let store = MemoryStore::new();
        let student = store.create_student(&new_student("CS2021002")).await.unwrap();

        let prediction = store
            .save_prediction(
                student.id,
                &NewPrediction {
                    risk_level: RiskLevel::High,
                    risk_score: 0.83,
                    confidence: Some(0.9),
                    model_version: None,
                },
            )
            .await
            .unwrap();

        let refreshed = store.get_student(student.id).await.unwrap().unwrap();
        assert_eq!(refreshed.risk_level, prediction.risk_level);
        assert_eq!(refreshed.risk_score, prediction.risk_score);
        assert_eq!(refreshed.last_prediction_date, Some(prediction.prediction_date));

        let latest = store.latest_prediction(student.id).await.unwrap().unwrap();
        assert_eq!(latest.id, prediction.id);
    }

    #[tokio::test]
    async fn prediction_for_unknown_student_leaves_no_row() {
        let store = MemoryStore::new();
        let err = store
            .save_prediction(
                Uuid::new_v4(),
                &NewPrediction {
                    risk_level: RiskLevel::Medium,
                    risk_score: 0.4,
                    confidence: None,
                    model_version: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound("student")));
        assert!(store.recent_predictions(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn attendance_is_unique_per_day_and_subject() {
        let store = MemoryStore::new();
        let student = store.create_student(&new_student("CS2021003")).await.unwrap();
        let entry = NewAttendance {
            date: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            subject: "Algorithms".to_string(),
            status: AttendanceStatus::Present,
        };

        store.record_attendance(student.id, &entry).await.unwrap();
        let err = store.record_attendance(student.id, &entry).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let other_subject = NewAttendance {
            subject: "Databases".to_string(),
            ..entry
        };
        store.record_attendance(student.id, &other_subject).await.unwrap();
        assert_eq!(store.student_attendance(student.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn high_risk_listing_skips_inactive_students() {
        let store = MemoryStore::new();
        let kept = store.create_student(&new_student("CS2021004")).await.unwrap();
        let dropped = store.create_student(&new_student("CS2021005")).await.unwrap();
        store.update_student_risk(kept.id, RiskLevel::High, 0.7).await.unwrap();
        store.update_student_risk(dropped.id, RiskLevel::High, 0.9).await.unwrap();
        store
            .update_student(
                dropped.id,
                &StudentUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let high = store.high_risk_students().await.unwrap();
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].id, kept.id);
    }

    #[tokio::test]
    async fn deleted_profile_is_gone() {
        let store = MemoryStore::new();
        let profile = Profile::new(Uuid::new_v4(), "t@example.edu", "Tess", Default::default());
        store.create_profile(&profile).await.unwrap();

        assert!(store.delete_profile(profile.id).await.unwrap());
        assert!(store.get_profile(profile.id).await.unwrap().is_none());
        assert!(!store.delete_profile(profile.id).await.unwrap());
    }
}
