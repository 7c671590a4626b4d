use std::collections::HashMap;
use std::fmt::Write;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{Prediction, RiskLevel, Student};
use crate::risk;

const HIGH_RISK_LIMIT: usize = 10;
const RECENT_PREDICTION_LIMIT: usize = 5;

/// Active high-risk students, highest score first.
pub fn rank_high_risk(students: &[Student]) -> Vec<&Student> {
    let mut ranked: Vec<&Student> = students
        .iter()
        .filter(|s| s.is_active && s.risk_level == RiskLevel::High)
        .collect();
    ranked.sort_by(|a, b| b.risk_score.total_cmp(&a.risk_score));
    ranked
}

pub fn build_report(generated_on: NaiveDate, students: &[Student], predictions: &[Prediction]) -> String {
    let stats = risk::summarize_students(students);
    let distribution = risk::risk_distribution(students);
    let names: HashMap<Uuid, &str> = students.iter().map(|s| (s.id, s.name.as_str())).collect();

    let mut output = String::new();

    let _ = writeln!(output, "# Dropout Risk Report");
    let _ = writeln!(output, "Generated on {generated_on}");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let _ = writeln!(
        output,
        "- {} students on record, {} active",
        stats.total_students, stats.active_students
    );
    let _ = writeln!(output, "- Average GPA {:.2}", stats.average_gpa);
    let _ = writeln!(output, "- Average risk score {:.2}", stats.average_risk_score);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Distribution");
    let _ = writeln!(output, "| Level | Students |");
    let _ = writeln!(output, "| --- | --- |");
    let _ = writeln!(output, "| high | {} |", distribution.high);
    let _ = writeln!(output, "| medium | {} |", distribution.medium);
    let _ = writeln!(output, "| low | {} |", distribution.low);

    let ranked = rank_high_risk(students);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk Students");

    if ranked.is_empty() {
        let _ = writeln!(output, "No active students are currently at high risk.");
    } else {
        for student in ranked.iter().take(HIGH_RISK_LIMIT) {
            let gpa = student
                .current_gpa
                .map(|gpa| format!("{gpa:.2}"))
                .unwrap_or_else(|| "n/a".to_string());
            let _ = writeln!(
                output,
                "- {} ({}, {} semester {}) score {:.2}, GPA {}",
                student.name,
                student.roll_number,
                student.program,
                student.semester,
                student.risk_score,
                gpa
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Predictions");

    if predictions.is_empty() {
        let _ = writeln!(output, "No predictions recorded yet.");
    } else {
        for prediction in predictions.iter().take(RECENT_PREDICTION_LIMIT) {
            let name = names
                .get(&prediction.student_id)
                .copied()
                .unwrap_or("unknown student");
            let _ = writeln!(
                output,
                "- {} on {}: {} ({:.2})",
                name,
                prediction.prediction_date.format("%Y-%m-%d"),
                prediction.risk_level,
                prediction.risk_score
            );
        }
    }

    output
}
