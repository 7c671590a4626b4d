use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use tracing::{info, warn};

use crate::error::ApiError;
use crate::models::{
    AcademicRecord, AttendanceRecord, AttendanceStatus, FinancialRecord, Intervention,
    InterventionUpdate, NewAcademicRecord, NewAttendance, NewFinancialRecord, NewIntervention,
    NewPrediction, NewStudent, Prediction, Profile, RiskLevel, Student, StudentUpdate,
};
use crate::records;
use crate::store::{Store, StoreError, StoreResult};

const STUDENT_COLUMNS: &str = "id, name, roll_number, email, program, semester, current_gpa, \
     previous_gpa, risk_level, risk_score, last_prediction_date, is_active, created_at, updated_at";

const PREDICTION_COLUMNS: &str =
    "id, student_id, risk_level, risk_score, confidence, model_version, prediction_date";

const INTERVENTION_COLUMNS: &str = "id, student_id, intervention_type, description, status, \
     assigned_to, scheduled_date, outcome, created_at, updated_at";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed [`Store`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Unique and foreign-key violations surface as conflicts and missing
/// parents; everything else stays a database error.
fn classify(err: sqlx::Error, conflict: impl FnOnce() -> String) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::Conflict(conflict());
        }
        if db_err.is_foreign_key_violation() {
            let entity = match db_err.constraint() {
                Some(name) if name.ends_with("assigned_to_fkey") => "profile",
                _ => "student",
            };
            return StoreError::NotFound(entity);
        }
    }
    StoreError::Database(err)
}

fn parse_column<T: std::str::FromStr>(row: &PgRow, column: &str) -> StoreResult<T>
where
    T::Err: std::fmt::Display,
{
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|e: T::Err| StoreError::Corrupt(format!("{column}: {e}")))
}

fn profile_from_row(row: &PgRow) -> StoreResult<Profile> {
    Ok(Profile {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        full_name: row.try_get("full_name")?,
        role: parse_column(row, "role")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn student_from_row(row: &PgRow) -> StoreResult<Student> {
    Ok(Student {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        roll_number: row.try_get("roll_number")?,
        email: row.try_get("email")?,
        program: row.try_get("program")?,
        semester: row.try_get("semester")?,
        current_gpa: row.try_get("current_gpa")?,
        previous_gpa: row.try_get("previous_gpa")?,
        risk_level: parse_column(row, "risk_level")?,
        risk_score: row.try_get("risk_score")?,
        last_prediction_date: row.try_get("last_prediction_date")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn attendance_from_row(row: &PgRow) -> StoreResult<AttendanceRecord> {
    Ok(AttendanceRecord {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        date: row.try_get("date")?,
        subject: row.try_get("subject")?,
        status: parse_column(row, "status")?,
        created_at: row.try_get("created_at")?,
    })
}

fn academic_from_row(row: &PgRow) -> StoreResult<AcademicRecord> {
    Ok(AcademicRecord {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        semester: row.try_get("semester")?,
        subject: row.try_get("subject")?,
        marks: row.try_get("marks")?,
        max_marks: row.try_get("max_marks")?,
        grade: row.try_get("grade")?,
        exam_type: row.try_get("exam_type")?,
        exam_date: row.try_get("exam_date")?,
        created_at: row.try_get("created_at")?,
    })
}

fn prediction_from_row(row: &PgRow) -> StoreResult<Prediction> {
    Ok(Prediction {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        risk_level: parse_column(row, "risk_level")?,
        risk_score: row.try_get("risk_score")?,
        confidence: row.try_get("confidence")?,
        model_version: row.try_get("model_version")?,
        prediction_date: row.try_get("prediction_date")?,
    })
}

fn intervention_from_row(row: &PgRow) -> StoreResult<Intervention> {
    Ok(Intervention {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        intervention_type: row.try_get("intervention_type")?,
        description: row.try_get("description")?,
        status: parse_column(row, "status")?,
        assigned_to: row.try_get("assigned_to")?,
        scheduled_date: row.try_get("scheduled_date")?,
        outcome: row.try_get("outcome")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn financial_from_row(row: &PgRow) -> StoreResult<FinancialRecord> {
    Ok(FinancialRecord {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        semester: row.try_get("semester")?,
        fee_amount: row.try_get("fee_amount")?,
        amount_paid: row.try_get("amount_paid")?,
        scholarship_amount: row.try_get("scholarship_amount")?,
        due_date: row.try_get("due_date")?,
        created_at: row.try_get("created_at")?,
    })
}

fn collect<T>(rows: &[PgRow], map: fn(&PgRow) -> StoreResult<T>) -> StoreResult<Vec<T>> {
    rows.iter().map(map).collect()
}

#[async_trait]
impl Store for PgStore {
    async fn create_profile(&self, profile: &Profile) -> StoreResult<Profile> {
        let row = sqlx::query(
            r#"
            INSERT INTO teacher_profiles (id, email, full_name, role, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(profile.id)
        .bind(&profile.email)
        .bind(&profile.full_name)
        .bind(profile.role.as_str())
        .bind(profile.is_active)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, || format!("email {} is already registered", profile.email)))?;
        profile_from_row(&row)
    }

    async fn upsert_profile(&self, profile: &Profile) -> StoreResult<Profile> {
        let row = sqlx::query(
            r#"
            INSERT INTO teacher_profiles (id, email, full_name, role, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (id) DO UPDATE
            SET email = EXCLUDED.email,
                full_name = EXCLUDED.full_name,
                role = EXCLUDED.role,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(profile.id)
        .bind(&profile.email)
        .bind(&profile.full_name)
        .bind(profile.role.as_str())
        .bind(profile.is_active)
        .bind(profile.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, || format!("email {} is already registered", profile.email)))?;
        profile_from_row(&row)
    }

    async fn get_profile(&self, id: Uuid) -> StoreResult<Option<Profile>> {
        let row = sqlx::query("SELECT * FROM teacher_profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(profile_from_row).transpose()
    }

    async fn delete_profile(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM teacher_profiles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_student(&self, student: &NewStudent) -> StoreResult<Student> {
        let query = format!(
            r#"
            INSERT INTO students (id, name, roll_number, email, program, semester, current_gpa, previous_gpa)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {STUDENT_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(&student.name)
            .bind(&student.roll_number)
            .bind(&student.email)
            .bind(&student.program)
            .bind(student.semester)
            .bind(student.current_gpa)
            .bind(student.previous_gpa)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                classify(e, || format!("roll number {} already exists", student.roll_number))
            })?;
        student_from_row(&row)
    }

    async fn get_student(&self, id: Uuid) -> StoreResult<Option<Student>> {
        let query = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(student_from_row).transpose()
    }

    async fn get_student_by_roll_number(&self, roll_number: &str) -> StoreResult<Option<Student>> {
        let query = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE roll_number = $1");
        let row = sqlx::query(&query)
            .bind(roll_number)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(student_from_row).transpose()
    }

    async fn list_students(&self, active_only: bool) -> StoreResult<Vec<Student>> {
        let mut query = format!("SELECT {STUDENT_COLUMNS} FROM students");
        if active_only {
            query.push_str(" WHERE is_active");
        }
        query.push_str(" ORDER BY roll_number");

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        collect(&rows, student_from_row)
    }

    async fn update_student(&self, id: Uuid, update: &StudentUpdate) -> StoreResult<Student> {
        let query = format!(
            r#"
            UPDATE students
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                program = COALESCE($4, program),
                semester = COALESCE($5, semester),
                current_gpa = COALESCE($6, current_gpa),
                previous_gpa = COALESCE($7, previous_gpa),
                is_active = COALESCE($8, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {STUDENT_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(&update.name)
            .bind(&update.email)
            .bind(&update.program)
            .bind(update.semester)
            .bind(update.current_gpa)
            .bind(update.previous_gpa)
            .bind(update.is_active)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound("student"))?;
        student_from_row(&row)
    }

    async fn update_student_risk(
        &self,
        id: Uuid,
        risk_level: RiskLevel,
        risk_score: f64,
    ) -> StoreResult<Student> {
        let query = format!(
            r#"
            UPDATE students
            SET risk_level = $2, risk_score = $3, last_prediction_date = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING {STUDENT_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(risk_level.as_str())
            .bind(risk_score)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound("student"))?;
        student_from_row(&row)
    }

    async fn high_risk_students(&self) -> StoreResult<Vec<Student>> {
        let query = format!(
            "SELECT {STUDENT_COLUMNS} FROM students \
             WHERE risk_level = 'high' AND is_active \
             ORDER BY risk_score DESC"
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        collect(&rows, student_from_row)
    }

    async fn record_attendance(
        &self,
        student_id: Uuid,
        attendance: &NewAttendance,
    ) -> StoreResult<AttendanceRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO attendance (id, student_id, date, subject, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, student_id, date, subject, status, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(attendance.date)
        .bind(&attendance.subject)
        .bind(attendance.status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            classify(e, || {
                format!(
                    "attendance for {} on {} already recorded",
                    attendance.subject, attendance.date
                )
            })
        })?;
        attendance_from_row(&row)
    }

    async fn student_attendance(&self, student_id: Uuid) -> StoreResult<Vec<AttendanceRecord>> {
        let rows = sqlx::query(
            "SELECT id, student_id, date, subject, status, created_at \
             FROM attendance WHERE student_id = $1 ORDER BY date DESC",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        collect(&rows, attendance_from_row)
    }

    async fn add_academic_record(
        &self,
        student_id: Uuid,
        record: &NewAcademicRecord,
    ) -> StoreResult<AcademicRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO academic_records
            (id, student_id, semester, subject, marks, max_marks, grade, exam_type, exam_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(record.semester)
        .bind(&record.subject)
        .bind(record.marks)
        .bind(record.max_marks)
        .bind(&record.grade)
        .bind(&record.exam_type)
        .bind(record.exam_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            classify(e, || {
                format!(
                    "{} {} result for semester {} already recorded",
                    record.subject, record.exam_type, record.semester
                )
            })
        })?;
        academic_from_row(&row)
    }

    async fn student_academic_records(
        &self,
        student_id: Uuid,
    ) -> StoreResult<Vec<AcademicRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM academic_records WHERE student_id = $1 ORDER BY semester DESC, exam_date DESC",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        collect(&rows, academic_from_row)
    }

    async fn save_prediction(
        &self,
        student_id: Uuid,
        prediction: &NewPrediction,
    ) -> StoreResult<Prediction> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            r#"
            INSERT INTO predictions (id, student_id, risk_level, risk_score, confidence, model_version)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PREDICTION_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(student_id)
            .bind(prediction.risk_level.as_str())
            .bind(prediction.risk_score)
            .bind(prediction.confidence)
            .bind(&prediction.model_version)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| classify(e, || "prediction already exists".to_string()))?;
        let saved = prediction_from_row(&row)?;

        let updated = sqlx::query(
            r#"
            UPDATE students
            SET risk_level = $2, risk_score = $3, last_prediction_date = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(student_id)
        .bind(saved.risk_level.as_str())
        .bind(saved.risk_score)
        .bind(saved.prediction_date)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound("student"));
        }

        tx.commit().await?;
        Ok(saved)
    }

    async fn student_predictions(
        &self,
        student_id: Uuid,
        limit: usize,
    ) -> StoreResult<Vec<Prediction>> {
        let query = format!(
            "SELECT {PREDICTION_COLUMNS} FROM predictions \
             WHERE student_id = $1 ORDER BY prediction_date DESC LIMIT $2"
        );
        let rows = sqlx::query(&query)
            .bind(student_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        collect(&rows, prediction_from_row)
    }

    async fn latest_prediction(&self, student_id: Uuid) -> StoreResult<Option<Prediction>> {
        Ok(self
            .student_predictions(student_id, 1)
            .await?
            .into_iter()
            .next())
    }

    async fn recent_predictions(&self, limit: usize) -> StoreResult<Vec<Prediction>> {
        let query = format!(
            "SELECT {PREDICTION_COLUMNS} FROM predictions ORDER BY prediction_date DESC LIMIT $1"
        );
        let rows = sqlx::query(&query)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        collect(&rows, prediction_from_row)
    }

    async fn create_intervention(
        &self,
        student_id: Uuid,
        intervention: &NewIntervention,
    ) -> StoreResult<Intervention> {
        let query = format!(
            r#"
            INSERT INTO interventions
            (id, student_id, intervention_type, description, status, assigned_to, scheduled_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {INTERVENTION_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(student_id)
            .bind(&intervention.intervention_type)
            .bind(&intervention.description)
            .bind(intervention.status.as_str())
            .bind(intervention.assigned_to)
            .bind(intervention.scheduled_date)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify(e, || "intervention already exists".to_string()))?;
        intervention_from_row(&row)
    }

    async fn student_interventions(&self, student_id: Uuid) -> StoreResult<Vec<Intervention>> {
        let query = format!(
            "SELECT {INTERVENTION_COLUMNS} FROM interventions \
             WHERE student_id = $1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?;
        collect(&rows, intervention_from_row)
    }

    async fn update_intervention(
        &self,
        id: Uuid,
        update: &InterventionUpdate,
    ) -> StoreResult<Intervention> {
        let query = format!(
            r#"
            UPDATE interventions
            SET status = COALESCE($2, status),
                description = COALESCE($3, description),
                scheduled_date = COALESCE($4, scheduled_date),
                outcome = COALESCE($5, outcome),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {INTERVENTION_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(update.status.map(|s| s.as_str()))
            .bind(&update.description)
            .bind(update.scheduled_date)
            .bind(&update.outcome)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound("intervention"))?;
        intervention_from_row(&row)
    }

    async fn count_active_interventions(&self) -> StoreResult<usize> {
        let count: i64 = sqlx::query(
            "SELECT COUNT(*) AS active FROM interventions WHERE status IN ('planned', 'ongoing')",
        )
        .fetch_one(&self.pool)
        .await?
        .try_get("active")?;
        Ok(count.max(0) as usize)
    }

    async fn add_financial_record(
        &self,
        student_id: Uuid,
        record: &NewFinancialRecord,
    ) -> StoreResult<FinancialRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO financial_records
            (id, student_id, semester, fee_amount, amount_paid, scholarship_amount, due_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(record.semester)
        .bind(record.fee_amount)
        .bind(record.amount_paid)
        .bind(record.scholarship_amount)
        .bind(record.due_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| classify(e, || "financial record already exists".to_string()))?;
        financial_from_row(&row)
    }

    async fn student_financial_records(
        &self,
        student_id: Uuid,
    ) -> StoreResult<Vec<FinancialRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM financial_records WHERE student_id = $1 ORDER BY semester DESC",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        collect(&rows, financial_from_row)
    }
}

const SUBJECTS: [&str; 5] = [
    "Data Structures",
    "Algorithms",
    "Database Systems",
    "Computer Networks",
    "Operating Systems",
];

fn letter_grade(marks: f64) -> &'static str {
    if marks >= 90.0 {
        "A"
    } else if marks >= 80.0 {
        "B"
    } else if marks >= 70.0 {
        "C"
    } else {
        "D"
    }
}

/// Five sample students with a month of attendance and two semesters of
/// midterm and final results each. Safe to rerun.
pub async fn seed(store: &dyn Store) -> anyhow::Result<usize> {
    let term_start = NaiveDate::from_ymd_opt(2026, 9, 1).context("invalid date")?;
    let mut created = 0usize;

    for i in 0..5i32 {
        let roll_number = format!("2025CS{}", 10001 + i);
        if store.get_student_by_roll_number(&roll_number).await?.is_some() {
            continue;
        }

        let student = store
            .create_student(&NewStudent {
                name: format!("Student {}", i + 1),
                roll_number,
                email: Some(format!("student{}@example.edu", i + 1)),
                program: "Computer Science".to_string(),
                semester: 3,
                current_gpa: Some(6.0 + f64::from(i) * 0.5),
                previous_gpa: Some(6.5 + f64::from(i) * 0.4),
            })
            .await?;
        created += 1;

        for day in 0..29i64 {
            let date = term_start + Duration::days(day);
            for subject in SUBJECTS {
                let status = if (i64::from(i) + day + 1) % 10 == 0 {
                    AttendanceStatus::Absent
                } else {
                    AttendanceStatus::Present
                };
                store
                    .record_attendance(
                        student.id,
                        &NewAttendance {
                            date,
                            subject: subject.to_string(),
                            status,
                        },
                    )
                    .await?;
            }
        }

        for semester in 1..=2i32 {
            for subject in SUBJECTS {
                let midterm = f64::from((70 + i * 2 + semester * 3).min(95));
                let final_exam = f64::from((75 + i * 2 + semester * 2).min(98));
                for (exam_type, marks, month) in
                    [("midterm", midterm, semester), ("final", final_exam, semester + 2)]
                {
                    let exam_date = NaiveDate::from_ymd_opt(2026, month as u32, 15)
                        .context("invalid date")?;
                    store
                        .add_academic_record(
                            student.id,
                            &NewAcademicRecord {
                                semester,
                                subject: subject.to_string(),
                                marks,
                                max_marks: 100.0,
                                grade: Some(letter_grade(marks).to_string()),
                                exam_type: exam_type.to_string(),
                                exam_date,
                            },
                        )
                        .await?;
                }
            }
        }
    }

    Ok(created)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub skipped: usize,
    pub rejected: usize,
}

/// Imports students from CSV through the same validation as the API.
/// Rows with a known roll number are skipped and invalid rows are logged
/// and left out. Optional `risk_level` and `risk_score` columns carry an
/// earlier assessment onto the new student.
pub async fn import_csv(store: &dyn Store, csv_path: &std::path::Path) -> anyhow::Result<ImportSummary> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        name: String,
        roll_number: String,
        email: Option<String>,
        program: String,
        semester: i32,
        current_gpa: Option<f64>,
        previous_gpa: Option<f64>,
        #[serde(default)]
        risk_level: Option<String>,
        #[serde(default)]
        risk_score: Option<f64>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut summary = ImportSummary::default();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("line {line}: unreadable row"))?;

        let assessment = match (row.risk_level.as_deref().map(str::trim), row.risk_score) {
            (None | Some(""), None) => None,
            (Some(level), Some(score)) if (0.0..=1.0).contains(&score) => {
                match level.parse::<RiskLevel>() {
                    Ok(level) => Some((level, score)),
                    Err(e) => {
                        warn!(line, "rejected row: {e}");
                        summary.rejected += 1;
                        continue;
                    }
                }
            }
            _ => {
                warn!(line, "rejected row: risk_level and risk_score (0 to 1) go together");
                summary.rejected += 1;
                continue;
            }
        };

        let new_student = NewStudent {
            name: row.name,
            roll_number: row.roll_number,
            email: row.email.filter(|e| !e.is_empty()),
            program: row.program,
            semester: row.semester,
            current_gpa: row.current_gpa,
            previous_gpa: row.previous_gpa,
        };
        let student = match records::create_student(store, new_student).await {
            Ok(student) => student,
            Err(ApiError::Conflict(_)) => {
                summary.skipped += 1;
                continue;
            }
            Err(ApiError::BadRequest(message)) => {
                warn!(line, "rejected row: {message}");
                summary.rejected += 1;
                continue;
            }
            Err(e) => return Err(anyhow::anyhow!("line {line}: {e}")),
        };

        if let Some((level, score)) = assessment {
            store.update_student_risk(student.id, level, score).await?;
        }
        summary.inserted += 1;
    }

    info!(
        inserted = summary.inserted,
        skipped = summary.skipped,
        rejected = summary.rejected,
        "import finished"
    );
    Ok(summary)
}
