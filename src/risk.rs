use serde::Serialize;

use crate::models::{
    AcademicRecord, AttendanceRecord, AttendanceStatus, RiskDistribution, RiskLevel, Student,
    StudentStatistics,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttendanceSummary {
    pub total_classes: usize,
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    /// Present or late, as a percentage of recorded classes.
    pub attendance_percentage: f64,
}

pub fn summarize_students(students: &[Student]) -> StudentStatistics {
    let active: Vec<&Student> = students.iter().filter(|s| s.is_active).collect();
    let distribution = risk_distribution(students);

    let gpas: Vec<f64> = active.iter().filter_map(|s| s.current_gpa).collect();
    let average_gpa = mean(&gpas);
    let scores: Vec<f64> = active.iter().map(|s| s.risk_score).collect();
    let average_risk_score = mean(&scores);

    StudentStatistics {
        total_students: students.len(),
        active_students: active.len(),
        high_risk_students: distribution.high,
        medium_risk_students: distribution.medium,
        low_risk_students: distribution.low,
        average_gpa: round2(average_gpa),
        average_risk_score: round2(average_risk_score),
    }
}

/// Counts active students per risk level.
pub fn risk_distribution(students: &[Student]) -> RiskDistribution {
    let mut distribution = RiskDistribution::default();
    for student in students.iter().filter(|s| s.is_active) {
        match student.risk_level {
            RiskLevel::Low => distribution.low += 1,
            RiskLevel::Medium => distribution.medium += 1,
            RiskLevel::High => distribution.high += 1,
        }
    }
    distribution
}

pub fn summarize_attendance(records: &[AttendanceRecord]) -> AttendanceSummary {
    let mut summary = AttendanceSummary {
        total_classes: records.len(),
        ..Default::default()
    };
    for record in records {
        match record.status {
            AttendanceStatus::Present => summary.present += 1,
            AttendanceStatus::Absent => summary.absent += 1,
            AttendanceStatus::Late => summary.late += 1,
        }
    }
    if summary.total_classes > 0 {
        let attended = (summary.present + summary.late) as f64;
        summary.attendance_percentage = round2(attended * 100.0 / summary.total_classes as f64);
    }
    summary
}

/// Marks over max marks across every exam, as a percentage.
pub fn average_marks_percentage(records: &[AcademicRecord]) -> Option<f64> {
    let max_total: f64 = records.iter().map(|r| r.max_marks).sum();
    if max_total <= 0.0 {
        return None;
    }
    let marks_total: f64 = records.iter().map(|r| r.marks).sum();
    Some(round2(marks_total * 100.0 / max_total))
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    use super::*;

    fn sample_student(risk_level: RiskLevel, risk_score: f64, gpa: Option<f64>) -> Student {
        let now = Utc::now();
        Student {
            id: Uuid::new_v4(),
            name: "Avery Lee".to_string(),
            roll_number: format!("CS{}", Uuid::new_v4().simple()),
            email: None,
            program: "Computer Science".to_string(),
            semester: 2,
            current_gpa: gpa,
            previous_gpa: None,
            risk_level,
            risk_score,
            last_prediction_date: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn attendance(status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord {
            id: Uuid::new_v4(),
            student_id: Uuid::nil(),
            date: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            subject: "Algorithms".to_string(),
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn statistics_count_levels_among_active_students() {
        let mut inactive = sample_student(RiskLevel::High, 0.9, Some(2.0));
        inactive.is_active = false;
        let students = vec![
            sample_student(RiskLevel::High, 0.8, Some(5.0)),
            sample_student(RiskLevel::Medium, 0.5, Some(7.0)),
            sample_student(RiskLevel::Low, 0.2, None),
            inactive,
        ];

        let stats = summarize_students(&students);
        assert_eq!(stats.total_students, 4);
        assert_eq!(stats.active_students, 3);
        assert_eq!(stats.high_risk_students, 1);
        assert_eq!(stats.medium_risk_students, 1);
        assert_eq!(stats.low_risk_students, 1);
        assert!((stats.average_gpa - 6.0).abs() < 1e-9);
        assert!((stats.average_risk_score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn empty_roster_has_zero_averages() {
        let stats = summarize_students(&[]);
        assert_eq!(stats, StudentStatistics::default());
    }

    #[test]
    fn late_counts_as_attended() {
        let records = vec![
            attendance(AttendanceStatus::Present),
            attendance(AttendanceStatus::Late),
            attendance(AttendanceStatus::Absent),
            attendance(AttendanceStatus::Present),
        ];
        let summary = summarize_attendance(&records);
        assert_eq!(summary.total_classes, 4);
        assert_eq!(summary.late, 1);
        assert!((summary.attendance_percentage - 75.0).abs() < 1e-9);
        assert_eq!(summarize_attendance(&[]).attendance_percentage, 0.0);
    }

    #[test]
    fn marks_percentage_weights_by_max_marks() {
        let record = |marks: f64, max_marks: f64| AcademicRecord {
            id: Uuid::new_v4(),
            student_id: Uuid::nil(),
            semester: 1,
            subject: "Algorithms".to_string(),
            marks,
            max_marks,
            grade: None,
            exam_type: "midterm".to_string(),
            exam_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            created_at: Utc::now(),
        };
        let records = vec![record(40.0, 50.0), record(60.0, 100.0)];
        assert_eq!(average_marks_percentage(&records), Some(66.67));
        assert_eq!(average_marks_percentage(&[]), None);
    }
}
