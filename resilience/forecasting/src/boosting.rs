use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance below which a split is not worth making.
const MIN_SPLIT_GAIN: f64 = 1e-12;

/// Hyper-parameters of the boosted ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    /// Number of trees.
    pub n_estimators: usize,
    /// Shrinkage applied to every leaf weight.
    pub learning_rate: f64,
    /// Maximum tree depth (root has depth 0).
    pub max_depth: usize,
    /// L2 penalty on leaf weights.
    pub lambda: f64,
    /// Minimum hessian sum per child.
    pub min_child_weight: f64,
    /// Minimum loss reduction required to split.
    pub gamma: f64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 6,
            lambda: 1.0,
            min_child_weight: 1.0,
            gamma: 0.0,
        }
    }
}

impl BoostingParams {
    /// Rejects parameters that cannot produce a model.
    pub fn validate(&self) -> Result<(), TrainingError> {
        if self.n_estimators == 0 {
            return Err(TrainingError::InvalidParameter("n_estimators must be > 0".into()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(TrainingError::InvalidParameter(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.lambda.is_finite() && self.lambda >= 0.0) {
            return Err(TrainingError::InvalidParameter("lambda must be >= 0".into()));
        }
        if !(self.min_child_weight.is_finite() && self.min_child_weight >= 0.0) {
            return Err(TrainingError::InvalidParameter(
                "min_child_weight must be >= 0".into(),
            ));
        }
        if !(self.gamma.is_finite() && self.gamma >= 0.0) {
            return Err(TrainingError::InvalidParameter("gamma must be >= 0".into()));
        }
        Ok(())
    }
}

/// Errors raised while fitting or applying the regressor.
#[derive(Debug, Error, PartialEq)]
pub enum TrainingError {
    /// No rows to learn from.
    #[error("training set is empty")]
    EmptyTrainingSet,
    /// Rows carry no feature columns.
    #[error("feature matrix has no columns")]
    NoFeatures,
    /// Feature rows and targets disagree in length.
    #[error("{rows} feature rows but {targets} targets")]
    ShapeMismatch {
        /// Feature rows.
        rows: usize,
        /// Target values.
        targets: usize,
    },
    /// NaN or infinite input.
    #[error("non-finite value at row {row}, column {column}")]
    NonFiniteValue {
        /// Zero-based row.
        row: usize,
        /// Zero-based column; equals the feature count for the target.
        column: usize,
    },
    /// Prediction input with the wrong number of features.
    #[error("expected {expected} features, got {actual}")]
    FeatureWidth {
        /// Width seen at training time.
        expected: usize,
        /// Width supplied.
        actual: usize,
    },
    /// Rejected hyper-parameter.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Series rows are not in strictly increasing date order.
    #[error("series is not in chronological order at row {row}")]
    UnorderedSeries {
        /// First offending row.
        row: usize,
    },
    /// The chronological split left one side without rows.
    #[error("split of {rows} rows at ratio {ratio} leaves an empty partition")]
    DegenerateSplit {
        /// Rows in the table.
        rows: usize,
        /// Requested test ratio.
        ratio: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        weight: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Single regression tree stored as a flat node list; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf { weight } => return weight,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => idx = if row[feature] < threshold { left } else { right },
            }
        }
    }

    /// Number of leaves.
    #[must_use]
    pub fn leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, Node::Leaf { .. }))
            .count()
    }

    /// Depth of the deepest leaf.
    #[must_use]
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

// The design matrix outlives every round; gradients are rebuilt per tree.
struct TreeGrower<'x, 'g> {
    x: ArrayView2<'x, f64>,
    grad: &'g [f64],
    hess: &'g [f64],
    params: &'g BoostingParams,
    nodes: Vec<Node>,
}

impl TreeGrower<'_, '_> {
    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.lambda)
    }

    fn leaf_weight(&self, g: f64, h: f64) -> f64 {
        -g / (h + self.params.lambda) * self.params.learning_rate
    }

    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let g: f64 = indices.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = indices.iter().map(|&i| self.hess[i]).sum();
        let slot = self.nodes.len();
        self.nodes.push(Node::Leaf {
            weight: self.leaf_weight(g, h),
        });
        if depth >= self.params.max_depth || indices.len() < 2 {
            return slot;
        }
        if let Some(split) = self.best_split(&indices, g, h) {
            let left = self.grow(split.left, depth + 1);
            let right = self.grow(split.right, depth + 1);
            self.nodes[slot] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };
        }
        slot
    }

    fn best_split(&self, indices: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let parent = self.score(g, h);
        let mut best: Option<(usize, f64, f64)> = None;
        let mut sorted = indices.to_vec();
        for feature in 0..self.x.ncols() {
            sorted.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));
            let (mut gl, mut hl) = (0.0, 0.0);
            for pos in 1..sorted.len() {
                let prev = sorted[pos - 1];
                gl += self.grad[prev];
                hl += self.hess[prev];
                let lo = self.x[[prev, feature]];
                let hi = self.x[[sorted[pos], feature]];
                if lo >= hi {
                    continue;
                }
                let (gr, hr) = (g - gl, h - hl);
                if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
                    continue;
                }
                let gain = 0.5 * (self.score(gl, hl) + self.score(gr, hr) - parent)
                    - self.params.gamma;
                if gain > MIN_SPLIT_GAIN && best.map_or(true, |(_, _, b)| gain > b) {
                    best = Some((feature, lo + (hi - lo) / 2.0, gain));
                }
            }
        }
        let (feature, threshold, _) = best?;
        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.x[[i, feature]] < threshold);
        Some(SplitCandidate {
            feature,
            threshold,
            left,
            right,
        })
    }
}

/// Gradient-boosted regression trees with a squared-error objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedRegressor {
    base_score: f64,
    n_features: usize,
    params: BoostingParams,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedRegressor {
    /// Fits the ensemble, failing on empty, ragged or non-finite input.
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        params: &BoostingParams,
    ) -> Result<Self, TrainingError> {
        params.validate()?;
        let (rows, cols) = x.dim();
        if rows == 0 {
            return Err(TrainingError::EmptyTrainingSet);
        }
        if cols == 0 {
            return Err(TrainingError::NoFeatures);
        }
        if y.len() != rows {
            return Err(TrainingError::ShapeMismatch {
                rows,
                targets: y.len(),
            });
        }
        for ((row, column), value) in x.indexed_iter() {
            if !value.is_finite() {
                return Err(TrainingError::NonFiniteValue { row, column });
            }
        }
        if let Some(row) = y.iter().position(|v| !v.is_finite()) {
            return Err(TrainingError::NonFiniteValue { row, column: cols });
        }

        #[allow(clippy::cast_precision_loss)]
        let base_score = y.sum() / rows as f64;
        let mut predictions = vec![base_score; rows];
        let hess = vec![1.0; rows];
        let mut trees = Vec::with_capacity(params.n_estimators);
        for _ in 0..params.n_estimators {
            let grad: Vec<f64> = predictions
                .iter()
                .zip(y.iter())
                .map(|(pred, target)| pred - target)
                .collect();
            let mut grower = TreeGrower {
                x: x.reborrow(),
                grad: &grad,
                hess: &hess,
                params,
                nodes: Vec::new(),
            };
            grower.grow((0..rows).collect(), 0);
            let tree = RegressionTree {
                nodes: grower.nodes,
            };
            for (row, pred) in predictions.iter_mut().enumerate() {
                let sample = x.row(row).to_vec();
                *pred += tree.predict(&sample);
            }
            trees.push(tree);
        }

        Ok(Self {
            base_score,
            n_features: cols,
            params: *params,
            trees,
        })
    }

    /// Predicts a single feature vector.
    pub fn predict_row(&self, row: &[f64]) -> Result<f64, TrainingError> {
        if row.len() != self.n_features {
            return Err(TrainingError::FeatureWidth {
                expected: self.n_features,
                actual: row.len(),
            });
        }
        Ok(self.base_score + self.trees.iter().map(|tree| tree.predict(row)).sum::<f64>())
    }

    /// Predicts every row of a matrix.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, TrainingError> {
        x.rows()
            .into_iter()
            .map(|row| self.predict_row(&row.to_vec()))
            .collect()
    }

    /// Fitted trees.
    #[must_use]
    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    /// Mean target of the training set, the ensemble's starting prediction.
    #[must_use]
    pub const fn base_score(&self) -> f64 {
        self.base_score
    }

    /// Parameters the model was trained with.
    #[must_use]
    pub const fn params(&self) -> &BoostingParams {
        &self.params
    }
}
