//! Shared survival statistics.
//!
//! Weighted two-sample log-rank and weighted Harrell's concordance. Both are
//! used for split scoring and for out-of-bag evaluation.

/// Weighted two-sample log-rank chi-square statistic.
///
/// Rows must be sorted by ascending `time`. `group[i]` marks membership in
/// the second sample. Returns 0 when the variance is zero.
pub fn logrank(time: &[f64], status: &[f64], weights: &[f64], group: &[bool]) -> f64 {
    debug_assert_eq!(time.len(), status.len());
    debug_assert_eq!(time.len(), weights.len());
    debug_assert_eq!(time.len(), group.len());

    let mut n_risk: f64 = weights.iter().sum();
    let mut n_risk_g: f64 = weights
        .iter()
        .zip(group)
        .filter(|(_, g)| **g)
        .map(|(w, _)| *w)
        .sum();

    let mut observed = 0.0;
    let mut expected = 0.0;
    let mut variance = 0.0;

    let n = time.len();
    let mut i = 0;
    while i < n {
        let t = time[i];
        let mut events = 0.0;
        let mut events_g = 0.0;
        let mut removed = 0.0;
        let mut removed_g = 0.0;

        while i < n && time[i] == t {
            let w = weights[i];
            let d = w * status[i];
            events += d;
            removed += w;
            if group[i] {
                events_g += d;
                removed_g += w;
            }
            i += 1;
        }

        if events > 0.0 && n_risk > 0.0 {
            let share = n_risk_g / n_risk;
            observed += events_g;
            expected += events * share;
            if n_risk > 1.0 {
                variance += events * share * (1.0 - share) * (n_risk - events) / (n_risk - 1.0);
            }
        }

        n_risk -= removed;
        n_risk_g -= removed_g;
    }

    if variance <= 0.0 {
        return 0.0;
    }
    let diff = observed - expected;
    diff * diff / variance
}

/// Weighted Harrell's concordance.
///
/// A pair `(i, j)` is comparable when row `i` has an event and either
/// `time[j] > time[i]`, or the times are equal and row `j` is censored. Each
/// comparable pair carries weight `weights[i]`. When `risk_like` is true a
/// higher prediction should mean an earlier event; otherwise the opposite.
/// Prediction ties count one half. Returns 0.5 with no comparable pairs.
pub fn concordance(
    time: &[f64],
    status: &[f64],
    weights: &[f64],
    pred: &[f64],
    risk_like: bool,
) -> f64 {
    debug_assert_eq!(time.len(), pred.len());

    let mut concordant = 0.0;
    let mut total = 0.0;

    for i in 0..time.len() {
        if status[i] != 1.0 {
            continue;
        }
        let w = weights[i];
        if w == 0.0 {
            continue;
        }
        for j in 0..time.len() {
            if j == i || weights[j] == 0.0 {
                continue;
            }
            let comparable = time[j] > time[i] || (time[j] == time[i] && status[j] == 0.0);
            if !comparable {
                continue;
            }
            total += w;
            let (hi, lo) = if risk_like {
                (pred[i], pred[j])
            } else {
                (pred[j], pred[i])
            };
            if hi > lo {
                concordant += w;
            } else if hi == lo {
                concordant += 0.5 * w;
            }
        }
    }

    if total == 0.0 {
        0.5
    } else {
        concordant / total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_logrank_identical_groups_is_zero() {
        let time = [1.0, 1.0, 2.0, 2.0];
        let status = [1.0, 1.0, 1.0, 1.0];
        let w = [1.0; 4];
        let group = [false, true, false, true];
        assert_abs_diff_eq!(logrank(&time, &status, &w, &group), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_logrank_hand_computed() {
        // t=1: n=4, n_g=2, d=1 (group 0). E=0.5, V=0.25*3/3=0.25
        // t=2: n=3, n_g=2, d=1 (group 1). E=2/3, V=(2/3)(1/3)(2)/2=2/9
        // t=3: n=2, n_g=1, d=1 (group 1). E=0.5, V=0.25*1/1=0.25
        // t=4: n=1, d=0
        let time = [1.0, 2.0, 3.0, 4.0];
        let status = [1.0, 1.0, 1.0, 0.0];
        let w = [1.0; 4];
        let group = [false, true, true, false];
        let o = 2.0;
        let e = 0.5 + 2.0 / 3.0 + 0.5;
        let v = 0.25 + 2.0 / 9.0 + 0.25;
        let expected = (o - e) * (o - e) / v;
        assert_abs_diff_eq!(logrank(&time, &status, &w, &group), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_logrank_no_events_is_zero() {
        let time = [1.0, 2.0];
        let status = [0.0, 0.0];
        let w = [1.0, 1.0];
        assert_eq!(logrank(&time, &status, &w, &[false, true]), 0.0);
    }

    #[test]
    fn test_concordance_perfect_and_reversed() {
        let time = [1.0, 2.0, 3.0, 4.0];
        let status = [1.0, 1.0, 1.0, 1.0];
        let w = [1.0; 4];
        let risk = [4.0, 3.0, 2.0, 1.0];
        assert_abs_diff_eq!(concordance(&time, &status, &w, &risk, true), 1.0);
        assert_abs_diff_eq!(concordance(&time, &status, &w, &risk, false), 0.0);
    }

    #[test]
    fn test_concordance_ties_count_half() {
        let time = [1.0, 2.0];
        let status = [1.0, 0.0];
        let w = [1.0, 1.0];
        assert_abs_diff_eq!(concordance(&time, &status, &w, &[0.3, 0.3], true), 0.5);
    }

    #[test]
    fn test_concordance_tied_time_censored_partner() {
        // Row 0 event at t=2, row 1 censored at t=2: comparable.
        let time = [2.0, 2.0];
        let status = [1.0, 0.0];
        let w = [1.0, 1.0];
        assert_abs_diff_eq!(concordance(&time, &status, &w, &[0.9, 0.1], true), 1.0);
    }

    #[test]
    fn test_concordance_no_pairs() {
        let time = [1.0, 2.0];
        let status = [0.0, 0.0];
        let w = [1.0, 1.0];
        assert_eq!(concordance(&time, &status, &w, &[0.1, 0.2], true), 0.5);
    }
}
