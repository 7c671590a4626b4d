use rand::{rngs::StdRng, seq::index, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{TrainerError, TrainerResult};

const MIN_SAMPLES_SPLIT: usize = 2;

#[derive(Debug, Clone)]
pub struct ForestParams {
    pub trees: usize,
    pub max_depth: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Node {
    Leaf {
        probabilities: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn probabilities(&self, row: &[f64]) -> &[f64] {
        let mut node = self;
        loop {
            match node {
                Node::Leaf { probabilities } => return probabilities,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = row.get(*feature).copied().unwrap_or(0.0);
                    node = if value <= *threshold { left } else { right };
                }
            }
        }
    }
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [usize],
    n_classes: usize,
    max_depth: usize,
    max_features: usize,
    rng: StdRng,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / total;
            p * p
        })
        .sum::<f64>()
}

impl TreeBuilder<'_> {
    fn class_counts(&self, samples: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &i in samples {
            counts[self.y[i]] += 1;
        }
        counts
    }

    fn leaf(counts: &[usize], total: usize) -> Node {
        let total = total.max(1) as f64;
        Node::Leaf {
            probabilities: counts.iter().map(|&c| c as f64 / total).collect(),
        }
    }

    fn build(&mut self, samples: &[usize], depth: usize) -> Node {
        let counts = self.class_counts(samples);
        let impurity = gini(&counts, samples.len());
        if depth >= self.max_depth || samples.len() < MIN_SAMPLES_SPLIT || impurity == 0.0 {
            return Self::leaf(&counts, samples.len());
        }

        let Some(best) = self.best_split(samples, impurity) else {
            return Self::leaf(&counts, samples.len());
        };

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .partition(|&&i| self.x[i][best.feature] <= best.threshold);

        Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(self.build(&left, depth + 1)),
            right: Box::new(self.build(&right, depth + 1)),
        }
    }

    /// Scans a random feature subset for the threshold with the lowest
    /// weighted Gini impurity below `parent_impurity`.
    fn best_split(&mut self, samples: &[usize], parent_impurity: f64) -> Option<BestSplit> {
        let n_features = self.x.first().map_or(0, Vec::len);
        if n_features == 0 {
            return None;
        }
        let features = index::sample(&mut self.rng, n_features, self.max_features.min(n_features));

        let total = samples.len();
        let mut best: Option<BestSplit> = None;

        for feature in features.iter() {
            let mut ordered: Vec<(f64, usize)> = samples
                .iter()
                .map(|&i| (self.x[i][feature], self.y[i]))
                .collect();
            ordered.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = vec![0usize; self.n_classes];
            let mut right = self.class_counts(samples);

            for split in 1..total {
                let (value, label) = ordered[split - 1];
                left[label] += 1;
                right[label] -= 1;

                let next = ordered[split].0;
                if next <= value {
                    continue;
                }

                let impurity = (split as f64 * gini(&left, split)
                    + (total - split) as f64 * gini(&right, total - split))
                    / total as f64;
                let improves = impurity < parent_impurity - f64::EPSILON;
                if improves && best.as_ref().map_or(true, |b| impurity < b.impurity) {
                    best = Some(BestSplit {
                        feature,
                        threshold: value + (next - value) / 2.0,
                        impurity,
                    });
                }
            }
        }

        best
    }
}

/// Bagged CART classifier: bootstrap samples per tree, sqrt(features)
/// candidates per split, averaged leaf probabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_classes: usize,
    pub n_features: usize,
    pub trees: Vec<Node>,
}

impl RandomForest {
    pub fn fit(
        x: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        params: &ForestParams,
    ) -> TrainerResult<Self> {
        if x.is_empty() || x.len() != y.len() {
            return Err(TrainerError::NotEnoughRows(x.len().min(y.len())));
        }
        let n_features = x[0].len();
        let max_features = ((n_features as f64).sqrt().floor() as usize).max(1);

        let mut seeds = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.trees);
        for _ in 0..params.trees.max(1) {
            let mut rng = StdRng::seed_from_u64(seeds.gen());
            let samples: Vec<usize> = (0..x.len()).map(|_| rng.gen_range(0..x.len())).collect();

            let mut builder = TreeBuilder {
                x,
                y,
                n_classes,
                max_depth: params.max_depth,
                max_features,
                rng,
            };
            trees.push(builder.build(&samples, 0));
        }

        Ok(Self {
            n_classes,
            n_features,
            trees,
        })
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn predict_proba(&self, row: &[f64]) -> Vec<f64> {
        let mut totals = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (total, p) in totals.iter_mut().zip(tree.probabilities(row)) {
                *total += p;
            }
        }
        let n = self.trees.len().max(1) as f64;
        totals.iter_mut().for_each(|total| *total /= n);
        totals
    }

    pub fn predict(&self, row: &[f64]) -> usize {
        self.predict_proba(row)
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |best, (class, &p)| if p > best.1 { (class, p) } else { best })
            .0
    }
}
