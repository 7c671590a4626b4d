use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{
    AcademicRecord, AttendanceRecord, FinancialRecord, Intervention, NewAcademicRecord,
    NewAttendance, NewFinancialRecord, NewIntervention, NewPrediction, NewStudent, Prediction,
    Student, StudentUpdate,
};
use crate::store::Store;

const MAX_GPA: f64 = 10.0;

fn bad(message: impl Into<String>) -> ApiError {
    ApiError::BadRequest(message.into())
}

fn require_text(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        Err(bad(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

fn check_gpa(field: &str, value: Option<f64>) -> Result<(), ApiError> {
    match value {
        Some(gpa) if !(0.0..=MAX_GPA).contains(&gpa) => {
            Err(bad(format!("{field} must be between 0 and {MAX_GPA}")))
        }
        _ => Ok(()),
    }
}

fn check_unit(field: &str, value: f64) -> Result<(), ApiError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(bad(format!("{field} must be between 0 and 1")))
    }
}

fn check_semester(semester: i32) -> Result<(), ApiError> {
    if semester >= 1 {
        Ok(())
    } else {
        Err(bad("semester must be at least 1"))
    }
}

pub async fn require_student(store: &dyn Store, id: Uuid) -> Result<Student, ApiError> {
    store
        .get_student(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("student not found".to_string()))
}

/// Rejects a taken roll number before inserting; the unique constraint
/// still catches a concurrent insert.
pub async fn create_student(store: &dyn Store, student: NewStudent) -> Result<Student, ApiError> {
    require_text("name", &student.name)?;
    require_text("roll_number", &student.roll_number)?;
    require_text("program", &student.program)?;
    check_semester(student.semester)?;
    check_gpa("current_gpa", student.current_gpa)?;
    check_gpa("previous_gpa", student.previous_gpa)?;

    let student = NewStudent {
        roll_number: student.roll_number.trim().to_string(),
        ..student
    };
    if store
        .get_student_by_roll_number(&student.roll_number)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict(format!(
            "Student with roll number {} already exists",
            student.roll_number
        )));
    }

    Ok(store.create_student(&student).await?)
}

pub async fn update_student(
    store: &dyn Store,
    id: Uuid,
    update: StudentUpdate,
) -> Result<Student, ApiError> {
    if let Some(name) = &update.name {
        require_text("name", name)?;
    }
    if let Some(semester) = update.semester {
        check_semester(semester)?;
    }
    check_gpa("current_gpa", update.current_gpa)?;
    check_gpa("previous_gpa", update.previous_gpa)?;
    Ok(store.update_student(id, &update).await?)
}

pub async fn record_attendance(
    store: &dyn Store,
    student_id: Uuid,
    attendance: NewAttendance,
) -> Result<AttendanceRecord, ApiError> {
    require_text("subject", &attendance.subject)?;
    require_student(store, student_id).await?;
    Ok(store.record_attendance(student_id, &attendance).await?)
}

pub async fn add_academic_record(
    store: &dyn Store,
    student_id: Uuid,
    record: NewAcademicRecord,
) -> Result<AcademicRecord, ApiError> {
    require_text("subject", &record.subject)?;
    require_text("exam_type", &record.exam_type)?;
    check_semester(record.semester)?;
    if record.max_marks <= 0.0 {
        return Err(bad("max_marks must be positive"));
    }
    if record.marks < 0.0 || record.marks > record.max_marks {
        return Err(bad("marks must be between 0 and max_marks"));
    }
    require_student(store, student_id).await?;
    Ok(store.add_academic_record(student_id, &record).await?)
}

/// Stores the prediction and the student's matching risk snapshot together.
pub async fn save_prediction(
    store: &dyn Store,
    student_id: Uuid,
    prediction: NewPrediction,
) -> Result<Prediction, ApiError> {
    check_unit("risk_score", prediction.risk_score)?;
    if let Some(confidence) = prediction.confidence {
        check_unit("confidence", confidence)?;
    }
    Ok(store.save_prediction(student_id, &prediction).await?)
}

pub async fn create_intervention(
    store: &dyn Store,
    student_id: Uuid,
    intervention: NewIntervention,
) -> Result<Intervention, ApiError> {
    require_text("intervention_type", &intervention.intervention_type)?;
    require_text("description", &intervention.description)?;
    require_student(store, student_id).await?;
    Ok(store.create_intervention(student_id, &intervention).await?)
}

pub async fn add_financial_record(
    store: &dyn Store,
    student_id: Uuid,
    record: NewFinancialRecord,
) -> Result<FinancialRecord, ApiError> {
    check_semester(record.semester)?;
    let amounts = [record.fee_amount, record.amount_paid, record.scholarship_amount];
    if amounts.iter().any(|amount| *amount < 0.0 || !amount.is_finite()) {
        return Err(bad("amounts must be non-negative"));
    }
    require_student(store, student_id).await?;
    Ok(store.add_financial_record(student_id, &record).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskLevel;
    use crate::store::MemoryStore;

    fn new_student(roll_number: &str) -> NewStudent {
        NewStudent {
            name: "Jules Moreno".to_string(),
            roll_number: roll_number.to_string(),
            email: None,
            program: "Mathematics".to_string(),
            semester: 1,
            current_gpa: Some(7.0),
            previous_gpa: None,
        }
    }

    #[tokio::test]
    async fn roll_number_is_checked_before_insert() {
        let store = MemoryStore::new();
        create_student(&store, new_student("MA001")).await.unwrap();

        let err = create_student(&store, new_student(" MA001 ")).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(store.list_students(false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn out_of_range_gpa_is_rejected() {
        let store = MemoryStore::new();
        let student = NewStudent {
            current_gpa: Some(11.0),
            ..new_student("MA002")
        };
        assert!(matches!(
            create_student(&store, student).await,
            Err(ApiError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn prediction_score_must_be_a_probability() {
        let store = MemoryStore::new();
        let student = create_student(&store, new_student("MA003")).await.unwrap();
        let prediction = NewPrediction {
            risk_level: RiskLevel::High,
            risk_score: 1.4,
            confidence: None,
            model_version: None,
        };

        let err = save_prediction(&store, student.id, prediction).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        let unchanged = store.get_student(student.id).await.unwrap().unwrap();
        assert_eq!(unchanged.risk_level, RiskLevel::Low);
    }

    #[tokio::test]
    async fn marks_cannot_exceed_max_marks() {
        let store = MemoryStore::new();
        let student = create_student(&store, new_student("MA004")).await.unwrap();
        let record = NewAcademicRecord {
            semester: 1,
            subject: "Calculus".to_string(),
            marks: 105.0,
            max_marks: 100.0,
            grade: None,
            exam_type: "final".to_string(),
            exam_date: chrono::NaiveDate::from_ymd_opt(2026, 3, 30).unwrap(),
        };
        assert!(add_academic_record(&store, student.id, record).await.is_err());
    }
}
