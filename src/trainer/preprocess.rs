use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::dataset::{feature_index, CATEGORICAL_FEATURES, NUMERIC_FEATURES};

/// Median-imputed, standard-scaled numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericColumn {
    pub name: String,
    pub index: usize,
    pub median: f64,
    pub mean: f64,
    pub scale: f64,
}

/// Mode-imputed, one-hot-encoded categorical column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalColumn {
    pub name: String,
    pub index: usize,
    pub most_frequent: f64,
    pub categories: Vec<f64>,
}

/// Fitted feature pipeline. Output is the scaled numeric columns followed by
/// one indicator per known category of each categorical column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    pub numeric: Vec<NumericColumn>,
    pub categorical: Vec<CategoricalColumn>,
}

fn observed(rows: &[Vec<Option<f64>>], index: usize) -> Vec<f64> {
    rows.iter()
        .filter_map(|row| row.get(index).copied().flatten())
        .filter(|value| value.is_finite())
        .collect()
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Most frequent value; ties go to the smallest.
fn mode(values: &[f64]) -> f64 {
    let mut counts: BTreeMap<u64, (f64, usize)> = BTreeMap::new();
    for value in values {
        counts.entry(value.to_bits()).or_insert((*value, 0)).1 += 1;
    }
    counts
        .into_values()
        .max_by(|(a, a_count), (b, b_count)| a_count.cmp(b_count).then(b.total_cmp(a)))
        .map(|(value, _)| value)
        .unwrap_or(0.0)
}

impl Preprocessor {
    pub fn fit(rows: &[Vec<Option<f64>>]) -> Self {
        let numeric = NUMERIC_FEATURES
            .iter()
            .filter_map(|name| feature_index(name).map(|index| (*name, index)))
            .map(|(name, index)| {
                let values = observed(rows, index);
                let median = median(&values);
                let imputed: Vec<f64> = rows
                    .iter()
                    .map(|row| impute(row.get(index).copied().flatten(), median))
                    .collect();

                let n = imputed.len().max(1) as f64;
                let mean = imputed.iter().sum::<f64>() / n;
                let variance = imputed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                let std_dev = variance.sqrt();

                NumericColumn {
                    name: name.to_string(),
                    index,
                    median,
                    mean,
                    scale: if std_dev > 0.0 { std_dev } else { 1.0 },
                }
            })
            .collect();

        let categorical = CATEGORICAL_FEATURES
            .iter()
            .filter_map(|name| feature_index(name).map(|index| (*name, index)))
            .map(|(name, index)| {
                let values = observed(rows, index);
                let most_frequent = mode(&values);
                let mut categories = values;
                categories.push(most_frequent);
                categories.sort_by(f64::total_cmp);
                categories.dedup();

                CategoricalColumn {
                    name: name.to_string(),
                    index,
                    most_frequent,
                    categories,
                }
            })
            .collect();

        Self {
            numeric,
            categorical,
        }
    }

    pub fn output_width(&self) -> usize {
        self.numeric.len()
            + self
                .categorical
                .iter()
                .map(|column| column.categories.len())
                .sum::<usize>()
    }

    /// Categories unseen at fit time encode as all zeros.
    pub fn transform_row(&self, row: &[Option<f64>]) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.output_width());

        for column in &self.numeric {
            let value = impute(row.get(column.index).copied().flatten(), column.median);
            out.push((value - column.mean) / column.scale);
        }

        for column in &self.categorical {
            let value = impute(row.get(column.index).copied().flatten(), column.most_frequent);
            out.extend(
                column
                    .categories
                    .iter()
                    .map(|category| if *category == value { 1.0 } else { 0.0 }),
            );
        }

        out
    }

    pub fn transform(&self, rows: &[Vec<Option<f64>>]) -> Vec<Vec<f64>> {
        rows.iter().map(|row| self.transform_row(row)).collect()
    }
}

fn impute(value: Option<f64>, fill: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() => v,
        _ => fill,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainer::dataset::FEATURE_COLUMNS;

    fn row(gpa: Option<f64>, gender: Option<f64>) -> Vec<Option<f64>> {
        let mut row = vec![Some(1.0); FEATURE_COLUMNS.len()];
        row[feature_index("gpa").unwrap()] = gpa;
        row[feature_index("gender").unwrap()] = gender;
        row
    }

    fn gender_block(preprocessor: &Preprocessor, encoded: &[f64]) -> Vec<f64> {
        let mut offset = preprocessor.numeric.len();
        for column in &preprocessor.categorical {
            let width = column.categories.len();
            if column.name == "gender" {
                return encoded[offset..offset + width].to_vec();
            }
            offset += width;
        }
        panic!("gender column missing");
    }

    #[test]
    fn numerics_are_median_imputed_then_scaled() {
        let rows = vec![
            row(Some(4.0), Some(0.0)),
            row(Some(6.0), Some(1.0)),
            row(Some(8.0), Some(1.0)),
            row(None, Some(0.0)),
        ];
        let preprocessor = Preprocessor::fit(&rows);
        let gpa = preprocessor
            .numeric
            .iter()
            .find(|column| column.name == "gpa")
            .unwrap();
        assert_eq!(gpa.median, 6.0);
        assert_eq!(gpa.mean, 6.0);

        let output = preprocessor.transform_row(&rows[3]);
        let position = preprocessor
            .numeric
            .iter()
            .position(|column| column.name == "gpa")
            .unwrap();
        assert_eq!(output[position], 0.0);
    }

    #[test]
    fn unknown_categories_encode_as_zeros() {
        let rows = vec![row(Some(5.0), Some(0.0)), row(Some(5.0), Some(1.0))];
        let preprocessor = Preprocessor::fit(&rows);
        assert_eq!(preprocessor.output_width(), 5 + 14 + 1);

        let known = preprocessor.transform_row(&row(Some(5.0), Some(1.0)));
        assert_eq!(gender_block(&preprocessor, &known), vec![0.0, 1.0]);
        let unseen = preprocessor.transform_row(&row(Some(5.0), Some(7.0)));
        assert_eq!(gender_block(&preprocessor, &unseen), vec![0.0, 0.0]);
        assert_eq!(unseen.len(), preprocessor.output_width());
    }

    #[test]
    fn missing_categories_take_the_mode() {
        let rows = vec![
            row(Some(5.0), Some(1.0)),
            row(Some(5.0), Some(1.0)),
            row(Some(5.0), Some(0.0)),
        ];
        let preprocessor = Preprocessor::fit(&rows);
        let encoded = preprocessor.transform_row(&row(Some(5.0), None));
        assert_eq!(gender_block(&preprocessor, &encoded), vec![0.0, 1.0]);
        assert_eq!(mode(&[2.0, 3.0, 3.0, 2.0]), 2.0);
    }
}
