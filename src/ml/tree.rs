use nalgebra::DMatrix;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// How candidate thresholds are chosen at each node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    /// Exhaustive scan over midpoints between sorted feature values.
    Best,
    /// One uniform threshold per feature between the node's min and max.
    Random,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// L2 penalty on leaf weights; zero gives plain leaf means.
    pub lambda: f64,
    pub strategy: SplitStrategy,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            lambda: 0.0,
            strategy: SplitStrategy::Best,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Squared-error regression tree stored as a flat node arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct Grower<'a, R: Rng> {
    x: &'a DMatrix<f64>,
    y: &'a [f64],
    features: &'a [usize],
    params: &'a TreeParams,
    rng: &'a mut R,
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Grows a tree on the given sample rows, considering only `features`.
    pub fn fit<R: Rng>(
        x: &DMatrix<f64>,
        y: &[f64],
        rows: &[usize],
        features: &[usize],
        params: &TreeParams,
        rng: &mut R,
    ) -> Self {
        let mut grower = Grower {
            x,
            y,
            features,
            params,
            rng,
            nodes: Vec::new(),
        };
        grower.grow(rows.to_vec(), 0);
        Self {
            nodes: grower.nodes,
        }
    }

    pub fn predict_row(&self, x: &DMatrix<f64>, row: usize) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x[(row, *feature)] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }
}

impl<'a, R: Rng> Grower<'a, R> {
    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let idx = self.nodes.len();
        let sum: f64 = rows.iter().map(|&i| self.y[i]).sum();
        let value = if rows.is_empty() {
            0.0
        } else {
            sum / (rows.len() as f64 + self.params.lambda)
        };
        self.nodes.push(Node::Leaf { value });

        if !self.can_split(&rows, depth) {
            return idx;
        }

        let candidate = match self.params.strategy {
            SplitStrategy::Best => self.best_split(&rows, sum),
            SplitStrategy::Random => self.random_split(&rows, sum),
        };
        let Some(candidate) = candidate else {
            return idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&i| self.x[(i, candidate.feature)] <= candidate.threshold);

        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: candidate.feature,
            threshold: candidate.threshold,
            left,
            right,
        };
        idx
    }

    fn can_split(&self, rows: &[usize], depth: usize) -> bool {
        if rows.len() < self.params.min_samples_split.max(2) {
            return false;
        }
        if rows.len() < 2 * self.params.min_samples_leaf.max(1) {
            return false;
        }
        if self.params.max_depth.is_some_and(|max| depth >= max) {
            return false;
        }
        // Pure node
        let first = self.y[rows[0]];
        rows.iter().any(|&i| self.y[i] != first)
    }

    fn score(&self, sum: f64, count: usize) -> f64 {
        sum * sum / (count as f64 + self.params.lambda)
    }

    fn best_split(&self, rows: &[usize], total: f64) -> Option<Candidate> {
        let n = rows.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let parent = self.score(total, n);
        let mut best: Option<Candidate> = None;

        for &feature in self.features {
            let mut sorted = rows.to_vec();
            sorted.sort_by(|&a, &b| self.x[(a, feature)].total_cmp(&self.x[(b, feature)]));

            let mut left_sum = 0.0;
            for k in 1..n {
                left_sum += self.y[sorted[k - 1]];
                if k < min_leaf || n - k < min_leaf {
                    continue;
                }
                let lo = self.x[(sorted[k - 1], feature)];
                let hi = self.x[(sorted[k], feature)];
                if lo >= hi {
                    continue;
                }
                let gain = self.score(left_sum, k) + self.score(total - left_sum, n - k) - parent;
                if gain > 0.0 && best.map_or(true, |b| gain > b.gain) {
                    best = Some(Candidate {
                        feature,
                        threshold: lo + (hi - lo) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }

    fn random_split(&mut self, rows: &[usize], total: f64) -> Option<Candidate> {
        let n = rows.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let parent = self.score(total, n);
        let mut best: Option<Candidate> = None;

        for &feature in self.features {
            let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                let v = self.x[(i, feature)];
                (lo.min(v), hi.max(v))
            });
            if !(hi > lo) {
                continue;
            }

            let threshold = self.rng.gen_range(lo..hi);
            let (mut left_sum, mut left_count) = (0.0, 0usize);
            for &i in rows {
                if self.x[(i, feature)] <= threshold {
                    left_sum += self.y[i];
                    left_count += 1;
                }
            }
            if left_count < min_leaf || n - left_count < min_leaf {
                continue;
            }

            let gain = self.score(left_sum, left_count)
                + self.score(total - left_sum, n - left_count)
                - parent;
            if best.map_or(true, |b| gain > b.gain) {
                best = Some(Candidate {
                    feature,
                    threshold,
                    gain,
                });
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn step_data() -> (DMatrix<f64>, Vec<f64>) {
        let x = DMatrix::from_row_slice(
            6,
            2,
            &[1.0, 10.0, 2.0, 20.0, 3.0, 30.0, 4.0, 40.0, 5.0, 50.0, 6.0, 60.0],
        );
        let y = vec![1.0, 1.0, 1.0, 9.0, 9.0, 9.0];
        (x, y)
    }

    #[test]
    fn best_split_finds_the_step() {
        let (x, y) = step_data();
        let rows: Vec<usize> = (0..6).collect();
        let params = TreeParams {
            max_depth: Some(1),
            ..TreeParams::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        let tree = RegressionTree::fit(&x, &y, &rows, &[0, 1], &params, &mut rng);

        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.node_count(), 3);
        for row in 0..6 {
            assert_eq!(tree.predict_row(&x, row), y[row]);
        }
    }

    #[test]
    fn lambda_shrinks_leaves() {
        let (x, y) = step_data();
        let rows: Vec<usize> = (0..6).collect();
        let params = TreeParams {
            max_depth: Some(1),
            lambda: 1.0,
            ..TreeParams::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        let tree = RegressionTree::fit(&x, &y, &rows, &[0], &params, &mut rng);

        // 3 samples of 9.0 with lambda 1 -> 27 / 4
        assert!((tree.predict_row(&x, 5) - 6.75).abs() < 1e-12);
    }

    #[test]
    fn random_trees_grow_until_pure() {
        let x = DMatrix::from_fn(12, 2, |i, j| (i * (j + 1)) as f64);
        let y: Vec<f64> = (0..12).map(|i| (i * i) as f64).collect();
        let rows: Vec<usize> = (0..12).collect();
        let params = TreeParams {
            strategy: SplitStrategy::Random,
            ..TreeParams::default()
        };
        let mut rng = StdRng::seed_from_u64(42);
        let tree = RegressionTree::fit(&x, &y, &rows, &[0, 1], &params, &mut rng);

        for row in 0..12 {
            assert_eq!(tree.predict_row(&x, row), y[row]);
        }
    }

    #[test]
    fn constant_target_is_a_single_leaf() {
        let x = DMatrix::from_fn(5, 2, |i, j| (i + j) as f64);
        let y = vec![4.0; 5];
        let rows: Vec<usize> = (0..5).collect();
        let mut rng = StdRng::seed_from_u64(1);
        let tree = RegressionTree::fit(&x, &y, &rows, &[0, 1], &TreeParams::default(), &mut rng);

        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.predict_row(&x, 2), 4.0);
    }
}
