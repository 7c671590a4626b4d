use std::fmt;

use serde::Serialize;

use crate::models::RiskLevel;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassReport {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub accuracy: f64,
    /// `confusion[actual][predicted]`
    pub confusion: Vec<Vec<usize>>,
    pub classes: Vec<ClassReport>,
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

pub fn evaluate(actual: &[usize], predicted: &[usize], n_classes: usize) -> Evaluation {
    let mut confusion = vec![vec![0usize; n_classes]; n_classes];
    for (&a, &p) in actual.iter().zip(predicted) {
        if a < n_classes && p < n_classes {
            confusion[a][p] += 1;
        }
    }

    let total: usize = confusion.iter().flatten().sum();
    let correct: usize = (0..n_classes).map(|c| confusion[c][c]).sum();

    let classes = (0..n_classes)
        .map(|class| {
            let true_positive = confusion[class][class];
            let support: usize = confusion[class].iter().sum();
            let predicted_as: usize = confusion.iter().map(|row| row[class]).sum();

            let precision = ratio(true_positive, predicted_as);
            let recall = ratio(true_positive, support);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            ClassReport {
                label: RiskLevel::from_class(class)
                    .map(|level| level.as_str().to_string())
                    .unwrap_or_else(|| class.to_string()),
                precision,
                recall,
                f1,
                support,
            }
        })
        .collect();

    Evaluation {
        accuracy: ratio(correct, total),
        confusion,
        classes,
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>10} {:>9} {:>9} {:>9} {:>9}", "", "precision", "recall", "f1-score", "support")?;
        for class in &self.classes {
            writeln!(
                f,
                "{:>10} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                class.label,
                class.precision,
                class.recall,
                class.f1,
                class.support
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Confusion matrix (rows actual, columns predicted):")?;
        for row in &self.confusion {
            let cells: Vec<String> = row.iter().map(|c| format!("{c:>6}")).collect();
            writeln!(f, "{}", cells.join(""))?;
        }
        writeln!(f)?;
        write!(f, "Accuracy: {:.4}", self.accuracy)
    }
}
