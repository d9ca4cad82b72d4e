//! Cut-point search along a linear combination.
//!
//! Rows are ordered by their linear-combination score. A cut at sorted
//! position `j` sends positions `0..=j` left (score `<=` cutpoint) and the
//! rest right, so a cut is only admissible between two different scores and
//! where both sides keep the minimum leaf events and observations.

use rand_xoshiro::Xoshiro256PlusPlus;

use super::sampling::sample_without_replacement;
use super::scorer::{SplitRule, SplitScorer};

/// Minimum leaf sizes that every admissible cut must leave on both sides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeafBounds {
    pub min_events: f64,
    pub min_obs: f64,
}

/// Admissible cut positions, ascending.
///
/// `lincomb` is sorted ascending; `events[p]` and `weights[p]` are the
/// weighted event indicator and weight at sorted position `p`.
pub fn find_all_cuts(lincomb: &[f64], events: &[f64], weights: &[f64], bounds: LeafBounds) -> Vec<usize> {
    let n = lincomb.len();
    if n < 2 {
        return Vec::new();
    }

    // Lower bound: first position with enough on the left and a score change after it.
    let mut n_events = 0.0;
    let mut n_obs = 0.0;
    let mut lower = None;
    for p in 0..n - 1 {
        n_events += events[p];
        n_obs += weights[p];
        if lincomb[p] != lincomb[p + 1] && n_events >= bounds.min_events && n_obs >= bounds.min_obs {
            lower = Some(p);
            break;
        }
    }
    let Some(lower) = lower else {
        return Vec::new();
    };

    // Upper bound: mirror walk from the top, then one step down since the
    // cut value itself goes left.
    n_events = 0.0;
    n_obs = 0.0;
    let mut upper = None;
    for p in (1..n).rev() {
        n_events += events[p];
        n_obs += weights[p];
        if lincomb[p] != lincomb[p - 1] && n_events >= bounds.min_events && n_obs >= bounds.min_obs {
            upper = Some(p - 1);
            break;
        }
    }
    let Some(upper) = upper else {
        return Vec::new();
    };

    if lower > upper {
        return Vec::new();
    }
    if lower == upper {
        return vec![lower];
    }

    let mut cuts = vec![lower];
    cuts.extend((lower + 1..upper).filter(|&p| lincomb[p] != lincomb[p + 1]));
    cuts.push(upper);
    cuts
}

/// Keep at most `max_cuts` cuts, drawn uniformly without replacement.
pub fn sample_cuts(cuts: Vec<usize>, max_cuts: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
    if cuts.len() <= max_cuts {
        return cuts;
    }
    let mut picked: Vec<usize> = sample_without_replacement(cuts.len(), max_cuts, rng)
        .into_iter()
        .map(|i| cuts[i as usize])
        .collect();
    picked.sort_unstable();
    picked
}

/// Winning cut of a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestCut {
    /// Sorted position of the cut.
    pub position: usize,
    /// Score value at the cut; rows `<=` it go left.
    pub cutpoint: f64,
    /// Split statistic.
    pub stat: f64,
}

/// Score every candidate cut and return the best.
///
/// `order[p]` is the node position (in time order) of the row at sorted
/// position `p`; `time`, `status` and `weights` are in node (time) order.
/// `cuts` must be ascending. The first maximum wins ties.
pub fn find_best_cut(
    lincomb_sorted: &[f64],
    order: &[usize],
    cuts: &[usize],
    time: &[f64],
    status: &[f64],
    weights: &[f64],
    rule: &SplitRule,
) -> Option<BestCut> {
    let mut group = vec![true; order.len()];
    let mut moved = 0;
    let mut best: Option<BestCut> = None;

    for &cut in cuts {
        while moved <= cut {
            group[order[moved]] = false;
            moved += 1;
        }
        let stat = rule.score(time, status, weights, &group);
        if !stat.is_finite() {
            continue;
        }
        if best.is_none_or(|b| stat > b.stat) {
            best = Some(BestCut {
                position: cut,
                cutpoint: lincomb_sorted[cut],
                stat,
            });
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn bounds(min_events: f64, min_obs: f64) -> LeafBounds {
        LeafBounds {
            min_events,
            min_obs,
        }
    }

    #[test]
    fn test_lower_bound_waits_for_score_change() {
        // Cumulative events 0,1,1,2,2,3,3,4; the count reaches 2 at p = 3 but
        // scores 3 and 4 tie, so the first admissible cut is p = 4.
        let lincomb = [1.0, 2.0, 3.0, 4.0, 4.0, 5.0, 6.0, 7.0];
        let events = [0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        let weights = [1.0; 8];
        let cuts = find_all_cuts(&lincomb, &events, &weights, bounds(2.0, 1.0));
        assert_eq!(cuts.first(), Some(&4));
    }

    #[test]
    fn test_bounds_and_interior_cuts() {
        let lincomb = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let events = [1.0; 6];
        let weights = [1.0; 6];
        // Lower at p = 1 (two rows left), upper at p = 3 (two rows right).
        let cuts = find_all_cuts(&lincomb, &events, &weights, bounds(2.0, 2.0));
        assert_eq!(cuts, vec![1, 2, 3]);
    }

    #[test]
    fn test_single_admissible_cut() {
        let lincomb = [1.0, 2.0, 3.0, 4.0];
        let events = [1.0; 4];
        let weights = [1.0; 4];
        assert_eq!(find_all_cuts(&lincomb, &events, &weights, bounds(2.0, 2.0)), vec![1]);
    }

    #[test]
    fn test_no_admissible_cut() {
        let lincomb = [1.0, 2.0, 3.0];
        let events = [1.0; 3];
        let weights = [1.0; 3];
        assert!(find_all_cuts(&lincomb, &events, &weights, bounds(2.0, 2.0)).is_empty());

        let flat = [2.0; 5];
        assert!(find_all_cuts(&flat, &[1.0; 5], &[1.0; 5], bounds(1.0, 1.0)).is_empty());
    }

    #[test]
    fn test_cuts_never_split_ties() {
        let lincomb = [1.0, 1.0, 2.0, 2.0, 2.0, 3.0, 4.0, 4.0];
        let events = [1.0; 8];
        let weights = [1.0; 8];
        let cuts = find_all_cuts(&lincomb, &events, &weights, bounds(1.0, 1.0));
        assert_eq!(cuts, vec![1, 4, 5]);
        for &c in &cuts {
            assert!(lincomb[c] < lincomb[c + 1]);
        }
    }

    #[test]
    fn test_sample_cuts_subset_sorted() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(9);
        let cuts: Vec<usize> = (0..20).collect();
        let picked = sample_cuts(cuts, 5, &mut rng);
        assert_eq!(picked.len(), 5);
        assert!(picked.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(sample_cuts(vec![1, 2], 5, &mut rng), vec![1, 2]);
    }

    #[test]
    fn test_best_cut_separates_early_and_late() {
        // Time order: rows 0..6; scores put the early deaths at the top.
        let time = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let status = [1.0; 6];
        let weights = [1.0; 6];
        let score_by_row: [f64; 6] = [6.0, 5.0, 4.0, 3.0, 2.0, 1.0];
        let mut order: Vec<usize> = (0..6).collect();
        order.sort_by(|&a, &b| score_by_row[a].total_cmp(&score_by_row[b]));
        let sorted: Vec<f64> = order.iter().map(|&i| score_by_row[i]).collect();

        let best = find_best_cut(
            &sorted,
            &order,
            &[1, 2, 3],
            &time,
            &status,
            &weights,
            &SplitRule::logrank(),
        )
        .unwrap();
        // Log-rank: 3.86 at cut 1, 5.05 at cut 2, 5.63 at cut 3.
        assert_eq!(best.position, 3);
        assert_eq!(best.cutpoint, 4.0);
        assert!(best.stat > 5.0);
    }
}
