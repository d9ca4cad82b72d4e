//! Oblique survival tree growth.
//!
//! [`TreeGrower`] turns one tree's in-bag sample into a [`SurvivalTree`].
//! Growth is depth-first over a worklist of pending nodes. Children of a
//! split are appended as a contiguous `(left, left + 1)` pair, so every child
//! index is greater than its parent's.
//!
//! Per node:
//! 1. Check that the node holds enough events and observations to split.
//! 2. Keep the columns that vary among the node's event rows.
//! 3. Draw `mtry` of them, fit a linear combination, and search its cuts.
//! 4. On failure retry with a fresh draw; once retries run out, sprout a leaf.

use ndarray::{Array2, ArrayView1, ArrayView2};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::explainability::ImportanceCounts;
use crate::repr::{LEAF_SENTINEL, LeafCurve, SurvivalTree};

use super::lincomb::{LinearComboParams, NodeData};
use super::sampling::{RowSample, safe_mtry, sample_columns};
use super::scorer::SplitRule;
use super::split::{LeafBounds, find_all_cuts, find_best_cut, sample_cuts};

// =============================================================================
// GrowerParams
// =============================================================================

/// Parameters for growing one tree.
///
/// Event and observation counts are weighted.
#[derive(Clone, Debug)]
pub struct GrowerParams {
    /// Minimum observations in a leaf.
    pub leaf_min_obs: f64,
    /// Minimum events in a leaf.
    pub leaf_min_events: f64,
    /// Minimum observations in a node to attempt a split.
    pub split_min_obs: f64,
    /// Minimum events in a node to attempt a split.
    pub split_min_events: f64,
    /// Minimum split statistic for a cut to be accepted.
    pub split_min_stat: f64,
    /// Maximum cuts scored per attempt.
    pub split_max_cuts: usize,
    /// Extra attempts after the first one fails.
    pub split_max_retry: usize,
    /// Columns drawn per attempt.
    pub mtry: usize,
    pub split_rule: SplitRule,
    pub linear_combo: LinearComboParams,
    /// Collect per-column significance counts while growing.
    pub track_anova: bool,
    /// P-value below which a column counts as significant.
    pub vi_max_pvalue: f64,
}

impl Default for GrowerParams {
    fn default() -> Self {
        Self {
            leaf_min_obs: 5.0,
            leaf_min_events: 1.0,
            split_min_obs: 10.0,
            split_min_events: 5.0,
            split_min_stat: 3.841459,
            split_max_cuts: 5,
            split_max_retry: 3,
            mtry: 1,
            split_rule: SplitRule::default(),
            linear_combo: LinearComboParams::default(),
            track_anova: false,
            vi_max_pvalue: 0.01,
        }
    }
}

impl GrowerParams {
    /// Whether a node with these weighted totals may be split.
    ///
    /// Both children need room for a full leaf, and the node itself must
    /// meet the split minimums.
    #[inline]
    pub fn is_node_splittable(&self, n_obs: f64, n_events: f64) -> bool {
        n_events >= 2.0 * self.leaf_min_events
            && n_obs >= 2.0 * self.leaf_min_obs
            && n_events >= self.split_min_events
            && n_obs >= self.split_min_obs
    }

    /// Upper bound on the number of leaves a tree over these totals can have.
    pub fn max_leaves(&self, n_obs: f64, n_events: f64) -> usize {
        let bounds = [
            n_obs / self.leaf_min_obs,
            n_events / self.leaf_min_events,
            n_obs / (self.split_min_obs - 1.0),
            n_events / (self.split_min_events - 1.0),
        ];
        let max = bounds
            .into_iter()
            .filter(|b| b.is_finite())
            .fold(1.0, f64::max);
        max.ceil() as usize
    }

    fn leaf_bounds(&self) -> LeafBounds {
        LeafBounds {
            min_events: self.leaf_min_events,
            min_obs: self.leaf_min_obs,
        }
    }
}

// =============================================================================
// Output
// =============================================================================

/// A grown tree plus by-products of growing it.
#[derive(Debug, Clone)]
pub struct GrownTree {
    pub tree: SurvivalTree,
    /// Present when [`GrowerParams::track_anova`] is set.
    pub anova: Option<ImportanceCounts>,
    /// Attempts that produced no usable split.
    pub n_failed_fits: usize,
}

// =============================================================================
// TreeGrower
// =============================================================================

/// In-bag rows in ascending time order with their effective weights.
struct Bag {
    rows: Vec<u32>,
    time: Vec<f64>,
    status: Vec<f64>,
    weight: Vec<f64>,
}

/// Flat node arrays under construction.
struct NodeArrays {
    cutpoint: Vec<f64>,
    child_left: Vec<u32>,
    coef_values: Vec<Vec<f64>>,
    coef_indices: Vec<Vec<u32>>,
    leaf_summary: Vec<f64>,
    leaf_curves: Vec<LeafCurve>,
}

impl NodeArrays {
    fn with_capacity(n: usize) -> Self {
        Self {
            cutpoint: Vec::with_capacity(n),
            child_left: Vec::with_capacity(n),
            coef_values: Vec::with_capacity(n),
            coef_indices: Vec::with_capacity(n),
            leaf_summary: Vec::with_capacity(n),
            leaf_curves: Vec::with_capacity(n),
        }
    }

    /// Append a blank node and return its id.
    fn push(&mut self) -> u32 {
        let id = self.child_left.len() as u32;
        self.cutpoint.push(0.0);
        self.child_left.push(LEAF_SENTINEL);
        self.coef_values.push(Vec::new());
        self.coef_indices.push(Vec::new());
        self.leaf_summary.push(0.0);
        self.leaf_curves.push(LeafCurve::empty());
        id
    }
}

/// Accepted split of one node.
struct NodeSplit {
    cutpoint: f64,
    coef_values: Vec<f64>,
    coef_indices: Vec<u32>,
    left: Vec<usize>,
    right: Vec<usize>,
}

/// Grows survival trees over shared, read-only training data.
pub struct TreeGrower<'a> {
    x: ArrayView2<'a, f64>,
    time: ArrayView1<'a, f64>,
    status: ArrayView1<'a, f64>,
    weights: &'a [f64],
    unique_event_times: &'a [f64],
    params: &'a GrowerParams,
}

impl<'a> TreeGrower<'a> {
    pub fn new(
        x: ArrayView2<'a, f64>,
        time: ArrayView1<'a, f64>,
        status: ArrayView1<'a, f64>,
        weights: &'a [f64],
        unique_event_times: &'a [f64],
        params: &'a GrowerParams,
    ) -> Self {
        Self {
            x,
            time,
            status,
            weights,
            unique_event_times,
            params,
        }
    }

    /// Grow one tree from its row sample.
    pub fn grow(&self, sample: RowSample, rng: &mut Xoshiro256PlusPlus) -> GrownTree {
        let bag = self.build_bag(&sample);
        let n_obs: f64 = bag.weight.iter().sum();
        let n_events: f64 = bag.weight.iter().zip(&bag.status).map(|(w, s)| w * s).sum();
        let max_leaves = self.params.max_leaves(n_obs, n_events);

        let mut nodes = NodeArrays::with_capacity(2 * max_leaves - 1);
        let mut anova = self
            .params
            .track_anova
            .then(|| ImportanceCounts::new(self.x.ncols()));
        let mut n_failed_fits = 0;

        let root = nodes.push();
        let mut pending: Vec<(u32, Vec<usize>)> = vec![(root, (0..bag.rows.len()).collect())];

        while let Some((node, members)) = pending.pop() {
            match self.try_split(&bag, &members, rng, anova.as_mut(), &mut n_failed_fits) {
                Some(split) => {
                    let left = nodes.push();
                    nodes.push();
                    let i = node as usize;
                    nodes.child_left[i] = left;
                    nodes.cutpoint[i] = split.cutpoint;
                    nodes.coef_values[i] = split.coef_values;
                    nodes.coef_indices[i] = split.coef_indices;
                    pending.push((left + 1, split.right));
                    pending.push((left, split.left));
                }
                None => {
                    let (curve, summary) = self.sprout_leaf(&bag, &members);
                    nodes.leaf_curves[node as usize] = curve;
                    nodes.leaf_summary[node as usize] = summary;
                }
            }
        }

        let tree = SurvivalTree::from_grown(
            nodes.cutpoint,
            nodes.child_left,
            nodes.coef_values,
            nodes.coef_indices,
            nodes.leaf_summary,
            nodes.leaf_curves,
            sample.oobag,
            sample.inbag,
        );
        GrownTree {
            tree,
            anova,
            n_failed_fits,
        }
    }

    fn build_bag(&self, sample: &RowSample) -> Bag {
        let mut order: Vec<usize> = (0..sample.inbag.len()).collect();
        order.sort_by(|&a, &b| {
            let (ra, rb) = (sample.inbag[a] as usize, sample.inbag[b] as usize);
            self.time[ra].total_cmp(&self.time[rb]).then(ra.cmp(&rb))
        });

        let mut bag = Bag {
            rows: Vec::with_capacity(order.len()),
            time: Vec::with_capacity(order.len()),
            status: Vec::with_capacity(order.len()),
            weight: Vec::with_capacity(order.len()),
        };
        for k in order {
            let row = sample.inbag[k];
            let r = row as usize;
            bag.rows.push(row);
            bag.time.push(self.time[r]);
            bag.status.push(self.status[r]);
            bag.weight.push(self.weights[r] * sample.multiplicity[k]);
        }
        bag
    }

    /// Whether column `col` takes two different values among event rows.
    fn is_col_splittable(&self, bag: &Bag, members: &[usize], col: usize) -> bool {
        let mut first: Option<f64> = None;
        for &i in members {
            if bag.status[i] != 1.0 {
                continue;
            }
            let v = self.x[[bag.rows[i] as usize, col]];
            match first {
                None => first = Some(v),
                Some(f) if f != v => return true,
                Some(_) => {}
            }
        }
        false
    }

    fn try_split(
        &self,
        bag: &Bag,
        members: &[usize],
        rng: &mut Xoshiro256PlusPlus,
        mut anova: Option<&mut ImportanceCounts>,
        n_failed_fits: &mut usize,
    ) -> Option<NodeSplit> {
        let p = self.params;

        let mut n_obs = 0.0;
        let mut n_events = 0.0;
        for &i in members {
            n_obs += bag.weight[i];
            n_events += bag.weight[i] * bag.status[i];
        }
        if !p.is_node_splittable(n_obs, n_events) {
            return None;
        }

        let candidates: Vec<u32> = (0..self.x.ncols())
            .filter(|&c| self.is_col_splittable(bag, members, c))
            .map(|c| c as u32)
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let mut mtry = p.mtry.clamp(1, candidates.len());
        if p.linear_combo.solver.needs_safe_mtry() {
            let n_events_unweighted = members.iter().filter(|&&i| bag.status[i] == 1.0).count();
            mtry = safe_mtry(mtry, n_events_unweighted);
        }

        let time: Vec<f64> = members.iter().map(|&i| bag.time[i]).collect();
        let status: Vec<f64> = members.iter().map(|&i| bag.status[i]).collect();
        let weight: Vec<f64> = members.iter().map(|&i| bag.weight[i]).collect();

        for _ in 0..=p.split_max_retry {
            let cols = sample_columns(&candidates, mtry, rng);
            let x_node = Array2::from_shape_fn((members.len(), cols.len()), |(i, j)| {
                self.x[[bag.rows[members[i]] as usize, cols[j] as usize]]
            });
            let node = NodeData {
                x: x_node.view(),
                time: &time,
                status: &status,
                weights: &weight,
            };

            let Ok(fit) = p.linear_combo.fit(&node, rng) else {
                *n_failed_fits += 1;
                continue;
            };

            // Same accumulation order as `SurvivalTree::leaf_of`.
            let lincomb: Vec<f64> = x_node
                .rows()
                .into_iter()
                .map(|row| {
                    let mut score = 0.0;
                    for (c, v) in fit.coefficients.iter().zip(row) {
                        if *c != 0.0 {
                            score += c * v;
                        }
                    }
                    score
                })
                .collect();

            let mut order: Vec<usize> = (0..members.len()).collect();
            order.sort_by(|&a, &b| lincomb[a].total_cmp(&lincomb[b]));
            let sorted: Vec<f64> = order.iter().map(|&i| lincomb[i]).collect();
            let events_sorted: Vec<f64> = order.iter().map(|&i| status[i] * weight[i]).collect();
            let weight_sorted: Vec<f64> = order.iter().map(|&i| weight[i]).collect();

            let cuts = find_all_cuts(&sorted, &events_sorted, &weight_sorted, p.leaf_bounds());
            let cuts = sample_cuts(cuts, p.split_max_cuts, rng);
            let best = find_best_cut(&sorted, &order, &cuts, &time, &status, &weight, &p.split_rule)
                .filter(|b| b.stat >= p.split_min_stat);

            if let Some(acc) = anova.as_deref_mut() {
                acc.record_fit(&cols, &fit, best.is_some(), p.vi_max_pvalue);
            }

            let Some(best) = best else {
                *n_failed_fits += 1;
                continue;
            };

            let mut left = Vec::new();
            let mut right = Vec::new();
            for (k, &i) in members.iter().enumerate() {
                if lincomb[k] <= best.cutpoint {
                    left.push(i);
                } else {
                    right.push(i);
                }
            }
            debug_assert!(!left.is_empty() && !right.is_empty());

            let (coef_values, coef_indices): (Vec<f64>, Vec<u32>) = fit
                .coefficients
                .iter()
                .zip(&cols)
                .filter(|(c, _)| **c != 0.0)
                .map(|(&c, &j)| (c, j))
                .unzip();

            return Some(NodeSplit {
                cutpoint: best.cutpoint,
                coef_values,
                coef_indices,
                left,
                right,
            });
        }

        None
    }

    fn sprout_leaf(&self, bag: &Bag, members: &[usize]) -> (LeafCurve, f64) {
        let time: Vec<f64> = members.iter().map(|&i| bag.time[i]).collect();
        let status: Vec<f64> = members.iter().map(|&i| bag.status[i]).collect();
        let weight: Vec<f64> = members.iter().map(|&i| bag.weight[i]).collect();
        let curve = LeafCurve::estimate_sorted(&time, &status, &weight);
        let summary = curve.mortality(self.unique_event_times);
        (curve, summary)
    }
}
