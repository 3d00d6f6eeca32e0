//! CART regression trees grown on gradient statistics.
//!
//! Every tree-based model in the roster goes through this builder. A tree is
//! fitted to per-row gradients `g` and hessians `h`; with `g = prediction -
//! target` and `h = 1` and no regularization this reduces to a plain
//! least-squares tree whose leaves hold mean residuals.
//!
//! Nodes live in a flat vector and refer to their children by index.

use ndarray::{Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Smallest split gain treated as an improvement.
const MIN_GAIN: f64 = 1e-12;

/// Order in which nodes are expanded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Growth {
    /// Expand every splittable node until the depth limit.
    DepthWise,
    /// Repeatedly split the leaf with the largest gain until `max_leaves`.
    LeafWise { max_leaves: usize },
}

/// Tree-growing parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Minimum hessian sum in each child.
    pub min_child_weight: f64,
    pub reg_lambda: f64,
    pub reg_alpha: f64,
    /// Minimum loss reduction required to split.
    pub gamma: f64,
    /// Features considered at each split; `None` means all allowed features.
    pub max_features: Option<usize>,
    pub growth: Growth,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            min_child_weight: 0.0,
            reg_lambda: 0.0,
            reg_alpha: 0.0,
            gamma: 0.0,
            max_features: None,
            growth: Growth::DepthWise,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// A fitted regression tree; rows with `x[feature] <= threshold` go left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

/// Gradient statistics for one tree fit.
pub struct GradientTarget<'a> {
    pub grad: &'a [f64],
    pub hess: &'a [f64],
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct Grower<'a> {
    x: &'a Array2<f64>,
    target: &'a GradientTarget<'a>,
    features: &'a [usize],
    params: &'a TreeParams,
    nodes: Vec<TreeNode>,
}

struct Pending {
    node: usize,
    rows: Vec<usize>,
    depth: usize,
    split: Option<SplitCandidate>,
}

impl RegressionTree {
    /// Fit a tree on `rows` of `x`, choosing splits among `features`.
    pub fn fit(
        x: &Array2<f64>,
        target: &GradientTarget<'_>,
        rows: &[usize],
        features: &[usize],
        params: &TreeParams,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let mut grower = Grower {
            x,
            target,
            features,
            params,
            nodes: Vec::new(),
        };
        match params.growth {
            Growth::DepthWise => grower.grow_depth_wise(rows.to_vec(), rng),
            Growth::LeafWise { max_leaves } => {
                grower.grow_leaf_wise(rows.to_vec(), max_leaves.max(2), rng)
            }
        }
        Self {
            nodes: grower.nodes,
        }
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
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

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], index: usize) -> usize {
            match &nodes[index] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }
}

impl Grower<'_> {
    fn grow_depth_wise(&mut self, rows: Vec<usize>, rng: &mut ChaCha8Rng) {
        let root = self.push_placeholder();
        let mut stack = vec![(root, rows, 0usize)];
        while let Some((node, rows, depth)) = stack.pop() {
            let split = if self.can_split(rows.len(), depth) {
                self.best_split(&rows, rng)
            } else {
                None
            };
            match split {
                Some(split) => {
                    let (left_rows, right_rows) = self.partition(&rows, &split);
                    let left = self.push_placeholder();
                    let right = self.push_placeholder();
                    self.nodes[node] = TreeNode::Split {
                        feature: split.feature,
                        threshold: split.threshold,
                        left,
                        right,
                    };
                    stack.push((right, right_rows, depth + 1));
                    stack.push((left, left_rows, depth + 1));
                }
                None => self.nodes[node] = self.leaf(&rows),
            }
        }
    }

    fn grow_leaf_wise(&mut self, rows: Vec<usize>, max_leaves: usize, rng: &mut ChaCha8Rng) {
        let root = self.push_placeholder();
        let mut frontier = vec![self.pending(root, rows, 0, rng)];

        while frontier.len() < max_leaves {
            let best = frontier
                .iter()
                .enumerate()
                .filter_map(|(i, p)| p.split.map(|s| (i, s)))
                .max_by(|a, b| a.1.gain.total_cmp(&b.1.gain));
            let Some((index, split)) = best else { break };

            let pending = frontier.swap_remove(index);
            let (left_rows, right_rows) = self.partition(&pending.rows, &split);
            let left = self.push_placeholder();
            let right = self.push_placeholder();
            self.nodes[pending.node] = TreeNode::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };
            let depth = pending.depth + 1;
            frontier.push(self.pending(left, left_rows, depth, rng));
            frontier.push(self.pending(right, right_rows, depth, rng));
        }

        for pending in frontier {
            self.nodes[pending.node] = self.leaf(&pending.rows);
        }
    }

    fn pending(
        &self,
        node: usize,
        rows: Vec<usize>,
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> Pending {
        let split = if self.can_split(rows.len(), depth) {
            self.best_split(&rows, rng)
        } else {
            None
        };
        Pending {
            node,
            rows,
            depth,
            split,
        }
    }

    fn push_placeholder(&mut self) -> usize {
        self.nodes.push(TreeNode::Leaf { value: 0.0 });
        self.nodes.len() - 1
    }

    fn can_split(&self, n_rows: usize, depth: usize) -> bool {
        let p = self.params;
        depth < p.max_depth.unwrap_or(usize::MAX)
            && n_rows >= p.min_samples_split.max(2)
            && n_rows >= 2 * p.min_samples_leaf.max(1)
    }

    fn sums(&self, rows: &[usize]) -> (f64, f64) {
        rows.iter().fold((0.0, 0.0), |(g, h), &r| {
            (g + self.target.grad[r], h + self.target.hess[r])
        })
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        let denom = h + self.params.reg_lambda;
        if denom <= 0.0 {
            return 0.0;
        }
        let t = soft_threshold(g, self.params.reg_alpha);
        t * t / denom
    }

    fn leaf(&self, rows: &[usize]) -> TreeNode {
        let (g, h) = self.sums(rows);
        let denom = h + self.params.reg_lambda;
        let value = if denom <= 0.0 {
            0.0
        } else {
            -soft_threshold(g, self.params.reg_alpha) / denom
        };
        TreeNode::Leaf { value }
    }

    fn best_split(&self, rows: &[usize], rng: &mut ChaCha8Rng) -> Option<SplitCandidate> {
        let p = self.params;
        let candidates: Vec<usize> = match p.max_features {
            Some(k) if k < self.features.len() => {
                let mut chosen: Vec<usize> =
                    self.features.choose_multiple(rng, k.max(1)).copied().collect();
                chosen.sort_unstable();
                chosen
            }
            _ => self.features.to_vec(),
        };

        let (g_total, h_total) = self.sums(rows);
        let parent = self.score(g_total, h_total);
        let min_leaf = p.min_samples_leaf.max(1);
        let mut best: Option<SplitCandidate> = None;
        let mut order = rows.to_vec();

        for &feature in &candidates {
            order.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));
            let (mut g_left, mut h_left) = (0.0, 0.0);
            for i in 0..order.len() - 1 {
                let r = order[i];
                g_left += self.target.grad[r];
                h_left += self.target.hess[r];

                let n_left = i + 1;
                let n_right = order.len() - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }
                let here = self.x[[r, feature]];
                let next = self.x[[order[i + 1], feature]];
                if here == next {
                    continue;
                }
                let (g_right, h_right) = (g_total - g_left, h_total - h_left);
                if h_left < p.min_child_weight || h_right < p.min_child_weight {
                    continue;
                }
                let gain = 0.5
                    * (self.score(g_left, h_left) + self.score(g_right, h_right) - parent)
                    - p.gamma;
                if gain > MIN_GAIN && best.is_none_or(|b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: midpoint(here, next),
                        gain,
                    });
                }
            }
        }
        best
    }

    fn partition(&self, rows: &[usize], split: &SplitCandidate) -> (Vec<usize>, Vec<usize>) {
        rows.iter()
            .partition(|&&r| self.x[[r, split.feature]] <= split.threshold)
    }
}

fn soft_threshold(g: f64, alpha: f64) -> f64 {
    if g > alpha {
        g - alpha
    } else if g < -alpha {
        g + alpha
    } else {
        0.0
    }
}

/// A threshold strictly below `next` that keeps `here` on the left.
fn midpoint(here: f64, next: f64) -> f64 {
    let mid = here + (next - here) / 2.0;
    if mid < next { mid } else { here }
}
