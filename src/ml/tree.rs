//! CART regression tree
//!
//! Splits minimise the summed squared error of the two children. Every
//! feature is considered at every node. Nodes live in one flat vector so the
//! tree serializes as plain data.

use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Stopping rules shared by every tree of a forest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct Candidate {
    feature: usize,
    threshold: f64,
    score: f64,
}

impl RegressionTree {
    /// Fit on the given sample rows of `x`. `rows` may repeat indices, as a
    /// bootstrap sample does.
    pub fn fit(x: ArrayView2<'_, f64>, y: &[f64], rows: &[usize], params: &TreeParams) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(x, y, rows.to_vec(), 0, params);
        tree
    }

    /// Build the subtree for `rows` and return its node index.
    fn grow(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: &[f64],
        rows: Vec<usize>,
        depth: usize,
        params: &TreeParams,
    ) -> usize {
        let index = self.nodes.len();
        let value = mean(y, &rows);
        self.nodes.push(Node::Leaf { value });

        let depth_left = params.max_depth.is_none_or(|max| depth < max);
        let splittable = rows.len() >= params.min_samples_split.max(2)
            && rows.len() >= 2 * params.min_samples_leaf.max(1);
        if !depth_left || !splittable || is_constant(y, &rows) {
            return index;
        }

        let Some(best) = best_split(x, y, &rows, params.min_samples_leaf.max(1)) else {
            return index;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&r| x[[r, best.feature]] <= best.threshold);

        let left = self.grow(x, y, left_rows, depth + 1, params);
        let right = self.grow(x, y, right_rows, depth + 1, params);
        self.nodes[index] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        index
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], index: usize) -> usize {
            match &nodes[index] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }
}

fn mean(y: &[f64], rows: &[usize]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    rows.iter().map(|&r| y[r]).sum::<f64>() / rows.len() as f64
}

fn is_constant(y: &[f64], rows: &[usize]) -> bool {
    let first = y[rows[0]];
    rows.iter().all(|&r| y[r] == first)
}

/// Best split over all features, scored by `sum_l²/n_l + sum_r²/n_r`, which
/// grows as the children's squared error shrinks. Ties keep the first
/// feature and the lowest threshold.
fn best_split(
    x: ArrayView2<'_, f64>,
    y: &[f64],
    rows: &[usize],
    min_leaf: usize,
) -> Option<Candidate> {
    let n = rows.len();
    let total: f64 = rows.iter().map(|&r| y[r]).sum();
    let parent_score = total * total / n as f64;

    let mut best: Option<Candidate> = None;
    let mut sorted = rows.to_vec();

    for feature in 0..x.ncols() {
        sorted.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

        let mut left_sum = 0.0;
        for i in 1..n {
            left_sum += y[sorted[i - 1]];
            let (lo, hi) = (x[[sorted[i - 1], feature]], x[[sorted[i], feature]]);
            if lo == hi || i < min_leaf || n - i < min_leaf {
                continue;
            }

            let right_sum = total - left_sum;
            let score = left_sum * left_sum / i as f64 + right_sum * right_sum / (n - i) as f64;
            let improves = score > parent_score + 1e-12 * parent_score.abs().max(1.0);
            if improves && best.as_ref().is_none_or(|b| score > b.score) {
                best = Some(Candidate {
                    feature,
                    threshold: lo + (hi - lo) / 2.0,
                    score,
                });
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::{Array2, array};

    use super::*;

    fn params(max_depth: Option<usize>) -> TreeParams {
        TreeParams {
            max_depth,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }

    fn all_rows(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    #[test]
    fn test_fits_step_function_exactly() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let y = [5.0, 5.0, 5.0, 20.0, 20.0, 20.0];

        let tree = RegressionTree::fit(x.view(), &y, &all_rows(6), &params(None));

        assert_eq!(tree.depth(), 1);
        assert_relative_eq!(tree.predict_row(array![2.5].view()), 5.0);
        assert_relative_eq!(tree.predict_row(array![11.5].view()), 20.0);
        // threshold sits midway between 3 and 10
        assert_relative_eq!(tree.predict_row(array![6.4].view()), 5.0);
        assert_relative_eq!(tree.predict_row(array![6.6].view()), 20.0);
    }

    #[test]
    fn test_depth_zero_is_mean() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = [1.0, 2.0, 6.0];

        let tree = RegressionTree::fit(x.view(), &y, &all_rows(3), &params(Some(0)));
        assert_eq!(tree.n_leaves(), 1);
        assert_relative_eq!(tree.predict_row(array![100.0].view()), 3.0);
    }

    #[test]
    fn test_min_samples_leaf_respected() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = [0.0, 0.0, 0.0, 100.0];
        let params = TreeParams {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 2,
        };

        let tree = RegressionTree::fit(x.view(), &y, &all_rows(4), &params);
        // Only the 2/2 split is allowed
        assert_relative_eq!(tree.predict_row(array![4.0].view()), 50.0);
    }

    #[test]
    fn test_picks_informative_feature() {
        // Feature 0 is noise, feature 1 separates the targets
        let x = array![[3.0, 0.0], [1.0, 0.0], [2.0, 1.0], [0.0, 1.0]];
        let y = [1.0, 1.0, 9.0, 9.0];

        let tree = RegressionTree::fit(x.view(), &y, &all_rows(4), &params(Some(1)));
        assert_relative_eq!(tree.predict_row(array![3.0, 1.0].view()), 9.0);
        assert_relative_eq!(tree.predict_row(array![0.0, 0.0].view()), 1.0);
    }

    #[test]
    fn test_constant_features_make_a_leaf() {
        let x = Array2::<f64>::ones((5, 2));
        let y = [1.0, 2.0, 3.0, 4.0, 5.0];

        let tree = RegressionTree::fit(x.view(), &y, &all_rows(5), &params(None));
        assert_eq!(tree.n_leaves(), 1);
    }

    #[test]
    fn test_bootstrap_rows_with_repeats() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = [10.0, 20.0, 30.0];

        let tree = RegressionTree::fit(x.view(), &y, &[0, 0, 2], &params(None));
        assert_relative_eq!(tree.predict_row(array![1.0].view()), 10.0);
        assert_relative_eq!(tree.predict_row(array![3.0].view()), 30.0);
    }
}
