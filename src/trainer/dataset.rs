use std::{collections::HashMap, f64::consts::PI, path::Path};

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

use super::{TrainerError, TrainerResult, RISK_CLASSES};

pub const TARGET_COLUMN: &str = "risk_level";

pub const FEATURE_COLUMNS: [&str; 19] = [
    "attendance_rate",
    "gpa",
    "family_income",
    "parent_education",
    "age",
    "gender",
    "study_hours_per_week",
    "extracurricular_activities",
    "previous_failures",
    "health_status",
    "transport_time",
    "internet_access",
    "family_support",
    "romantic_relationship",
    "free_time",
    "social_activities",
    "alcohol_consumption",
    "stress_level",
    "motivation_level",
];

pub const NUMERIC_FEATURES: [&str; 5] = [
    "attendance_rate",
    "gpa",
    "age",
    "study_hours_per_week",
    "transport_time",
];

pub const CATEGORICAL_FEATURES: [&str; 14] = [
    "family_income",
    "parent_education",
    "gender",
    "extracurricular_activities",
    "previous_failures",
    "health_status",
    "internet_access",
    "family_support",
    "romantic_relationship",
    "free_time",
    "social_activities",
    "alcohol_consumption",
    "stress_level",
    "motivation_level",
];

/// Position of `name` within [`FEATURE_COLUMNS`].
pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_COLUMNS.iter().position(|column| *column == name)
}

/// Feature rows in [`FEATURE_COLUMNS`] order; `None` marks a missing cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub rows: Vec<Vec<Option<f64>>>,
    pub labels: Vec<usize>,
}

fn is_missing(raw: &str) -> bool {
    matches!(raw, "" | "NA" | "NaN" | "nan" | "null")
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Reads a CSV by header name. Extra columns are ignored.
    pub fn load_csv(path: &Path) -> TrainerResult<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers: HashMap<String, usize> = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect();

        let position = |column: &str| {
            headers
                .get(column)
                .copied()
                .ok_or_else(|| TrainerError::MissingColumn(column.to_string()))
        };
        let feature_positions = FEATURE_COLUMNS
            .iter()
            .map(|column| position(column))
            .collect::<TrainerResult<Vec<usize>>>()?;
        let target_position = position(TARGET_COLUMN)?;

        let mut dataset = Dataset::default();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let row_number = line + 1;

            let mut row = Vec::with_capacity(FEATURE_COLUMNS.len());
            for (column, position) in FEATURE_COLUMNS.iter().zip(&feature_positions) {
                let raw = record.get(*position).unwrap_or("").trim();
                if is_missing(raw) {
                    row.push(None);
                    continue;
                }
                let value: f64 = raw.parse().map_err(|_| TrainerError::InvalidValue {
                    row: row_number,
                    column: column.to_string(),
                    value: raw.to_string(),
                })?;
                row.push(Some(value));
            }

            let raw_label = record.get(target_position).unwrap_or("").trim();
            let label = parse_label(raw_label).ok_or_else(|| TrainerError::InvalidLabel {
                row: row_number,
                value: raw_label.to_string(),
            })?;

            dataset.rows.push(row);
            dataset.labels.push(label);
        }

        Ok(dataset)
    }

    pub fn write_csv(&self, path: &Path) -> TrainerResult<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(FEATURE_COLUMNS.iter().chain(std::iter::once(&TARGET_COLUMN)))?;

        for (row, label) in self.rows.iter().zip(&self.labels) {
            let mut fields: Vec<String> = row
                .iter()
                .map(|value| value.map(|v| v.to_string()).unwrap_or_default())
                .collect();
            fields.push(label.to_string());
            writer.write_record(&fields)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Shuffled train/test split, reproducible for a given seed.
    pub fn split(&self, test_fraction: f64, seed: u64) -> (Dataset, Dataset) {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let test_len = ((self.len() as f64) * test_fraction.clamp(0.0, 1.0)).ceil() as usize;
        let test_len = test_len.min(self.len());
        let (test, train) = indices.split_at(test_len);
        (self.select(train), self.select(test))
    }

    fn select(&self, indices: &[usize]) -> Dataset {
        Dataset {
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }
}

fn parse_label(raw: &str) -> Option<usize> {
    let value: f64 = raw.parse().ok()?;
    if value.fract() != 0.0 || value < 0.0 || value >= RISK_CLASSES as f64 {
        return None;
    }
    Some(value as usize)
}

fn normal(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    // Box-Muller; 1 - u keeps the log argument in (0, 1].
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    mean + std_dev * (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

fn uniform_int(rng: &mut StdRng, low: i32, high_exclusive: i32) -> f64 {
    f64::from(rng.gen_range(low..high_exclusive))
}

/// Synthetic students whose risk level follows a weighted linear score
/// plus N(0, 0.1) noise, cut at -0.2 (medium) and 0.2 (high).
pub fn generate(samples: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut dataset = Dataset::default();

    for _ in 0..samples {
        let attendance_rate = normal(&mut rng, 0.85, 0.15).clamp(0.0, 1.0);
        let gpa = normal(&mut rng, 7.0, 1.5).clamp(0.0, 10.0);
        let family_income = uniform_int(&mut rng, 1, 6);
        let parent_education = uniform_int(&mut rng, 1, 5);
        let age = uniform_int(&mut rng, 18, 26);
        let gender = uniform_int(&mut rng, 0, 2);
        let study_hours = normal(&mut rng, 20.0, 8.0).clamp(0.0, 50.0);
        let extracurricular = uniform_int(&mut rng, 0, 4);
        let previous_failures = uniform_int(&mut rng, 0, 4);
        let health_status = uniform_int(&mut rng, 1, 6);
        let transport_time = normal(&mut rng, 30.0, 20.0).clamp(5.0, 120.0);
        let internet_access = uniform_int(&mut rng, 0, 2);
        let family_support = uniform_int(&mut rng, 1, 6);
        let romantic = uniform_int(&mut rng, 0, 2);
        let free_time = uniform_int(&mut rng, 1, 6);
        let social = uniform_int(&mut rng, 1, 6);
        let alcohol = uniform_int(&mut rng, 1, 6);
        let stress = uniform_int(&mut rng, 1, 6);
        let motivation = uniform_int(&mut rng, 1, 6);

        let score = -0.3 * attendance_rate - 0.3 * (gpa / 10.0) - 0.1 * (family_income / 5.0)
            - 0.05 * (parent_education / 4.0)
            + 0.05 * ((age - 18.0) / 8.0)
            - 0.15 * (study_hours / 50.0)
            - 0.05 * (extracurricular / 3.0)
            + 0.2 * (previous_failures / 3.0)
            - 0.05 * (health_status / 5.0)
            + 0.05 * (transport_time / 120.0)
            - 0.05 * internet_access
            - 0.15 * (family_support / 5.0)
            + 0.05 * romantic
            - 0.05 * (free_time / 5.0)
            - 0.05 * (social / 5.0)
            + 0.1 * (alcohol / 5.0)
            + 0.2 * (stress / 5.0)
            - 0.3 * (motivation / 5.0)
            + normal(&mut rng, 0.0, 0.1);

        let label = if score > 0.2 {
            2
        } else if score > -0.2 {
            1
        } else {
            0
        };

        dataset.rows.push(
            [
                attendance_rate,
                gpa,
                family_income,
                parent_education,
                age,
                gender,
                study_hours,
                extracurricular,
                previous_failures,
                health_status,
                transport_time,
                internet_access,
                family_support,
                romantic,
                free_time,
                social,
                alcohol,
                stress,
                motivation,
            ]
            .into_iter()
            .map(Some)
            .collect(),
        );
        dataset.labels.push(label);
    }

    dataset
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn generator_is_reproducible_and_bounded() {
        let first = generate(200, 42);
        assert_eq!(first, generate(200, 42));
        assert_ne!(first, generate(200, 7));

        let gpa = feature_index("gpa").unwrap();
        let age = feature_index("age").unwrap();
        for row in &first.rows {
            let gpa = row[gpa].unwrap();
            let age = row[age].unwrap();
            assert!((0.0..=10.0).contains(&gpa));
            assert!((18.0..26.0).contains(&age));
        }
        assert!(first.labels.iter().all(|label| *label < RISK_CLASSES));
    }

    #[test]
    fn csv_round_trip_keeps_missing_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let mut dataset = generate(5, 1);
        dataset.rows[2][1] = None;
        dataset.write_csv(&path).unwrap();

        let loaded = Dataset::load_csv(&path).unwrap();
        assert_eq!(loaded.labels, dataset.labels);
        assert_eq!(loaded.rows[2][1], None);
        assert_eq!(loaded.rows[0][4], dataset.rows[0][4]);
    }

    #[test]
    fn columns_are_matched_by_header_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shuffled.csv");
        let mut header: Vec<&str> = FEATURE_COLUMNS.iter().rev().copied().collect();
        header.insert(0, TARGET_COLUMN);
        header.push("student_id");
        let values: Vec<String> = (0..FEATURE_COLUMNS.len()).rev().map(|i| i.to_string()).collect();
        let body = format!("{}\n2,{},S-1\n", header.join(","), values.join(","));
        fs::write(&path, body).unwrap();

        let loaded = Dataset::load_csv(&path).unwrap();
        assert_eq!(loaded.labels, vec![2]);
        assert_eq!(loaded.rows[0][0], Some(0.0));
        assert_eq!(loaded.rows[0][18], Some(18.0));
    }

    #[test]
    fn bad_labels_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.csv");
        let values = vec!["1"; FEATURE_COLUMNS.len()].join(",");
        fs::write(
            &path,
            format!("{},{TARGET_COLUMN}\n{values},3\n", FEATURE_COLUMNS.join(",")),
        )
        .unwrap();

        assert!(matches!(
            Dataset::load_csv(&path),
            Err(TrainerError::InvalidLabel { row: 1, .. })
        ));
    }

    #[test]
    fn split_holds_out_a_fifth() {
        let dataset = generate(100, 42);
        let (train, test) = dataset.split(0.2, 42);
        assert_eq!(train.len(), 80);
        assert_eq!(test.len(), 20);
        assert_eq!(dataset.split(0.2, 42), (train, test));
    }
}
