use itertools::izip;

/// Normalized importance weights of a particle population.
///
/// Weights always sum to one except transiently inside an update. The set
/// tracks the effective sample size of the current weights and a running
/// estimate of the log normalizing constant ratio, updated on every rescale.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WeightSet {
    weight: Vec<f64>,
    log_weight: Vec<f64>,
    ess: f64,
    zconst: f64,
    resampled: bool,
}

impl WeightSet {
    pub fn new(n: usize) -> Self {
        let mut set = Self {
            weight: vec![0f64; n],
            log_weight: vec![0f64; n],
            ess: 0f64,
            zconst: 0f64,
            resampled: false,
        };
        set.set_equal_weight();
        set
    }

    pub fn len(&self) -> usize {
        self.weight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weight.is_empty()
    }

    /// Normalized weights, summing to one.
    pub fn weights(&self) -> &[f64] {
        &self.weight
    }

    /// Log weights, rebased so the mean of their exponentials is one.
    pub fn log_weights(&self) -> &[f64] {
        &self.log_weight
    }

    /// Effective sample size `1 / sum(w_i^2)` of the current weights.
    ///
    /// Equals `n` for uniform weights and approaches one as the weights
    /// degenerate onto a single particle.
    pub fn ess(&self) -> f64 {
        self.ess
    }

    /// Running estimate of the log ratio of normalizing constants.
    pub fn zconst(&self) -> f64 {
        self.zconst
    }

    pub fn reset_zconst(&mut self) {
        self.zconst = 0f64;
    }

    /// Whether the latest resampling step actually replicated particles.
    pub fn resampled(&self) -> bool {
        self.resampled
    }

    pub(crate) fn set_resampled(&mut self, resampled: bool) {
        self.resampled = resampled;
    }

    /// True iff the effective sample size fell below `threshold`, given as an
    /// absolute particle count.
    pub fn resample_indicator(&self, threshold: f64) -> bool {
        self.ess < threshold
    }

    /// Reset to uniform weights without touching the zconst estimate.
    pub fn set_equal_weight(&mut self) {
        let n = self.weight.len();
        if n == 0 {
            self.ess = 0f64;
            return;
        }
        self.weight.fill(1f64 / n as f64);
        self.log_weight.fill(0f64);
        self.ess = n as f64;
    }

    /// Replace the log weights and renormalize.
    pub fn set_log_weight(&mut self, log_weight: &[f64]) {
        assert!(log_weight.len() == self.log_weight.len());
        self.log_weight.copy_from_slice(log_weight);
        self.normalize();
    }

    /// Add log-weight increments to the current log weights and renormalize.
    pub fn add_log_weight(&mut self, increments: &[f64]) {
        assert!(increments.len() == self.log_weight.len());
        for (logw, inc) in izip!(self.log_weight.iter_mut(), increments.iter()) {
            *logw += inc;
        }
        self.normalize();
    }

    // Subtract the max log weight before exponentiating, then rescale to sum
    // one. The pre-rescale mean of exponentials contributes
    // `max + ln(mean)` to the running zconst estimate, and the stored log
    // weights are rebased by that same shift so the mean of their
    // exponentials is one again. Without the rebase the next increment would
    // double-count the current mean.
    fn normalize(&mut self) {
        let n = self.log_weight.len();
        if n == 0 {
            return;
        }

        let max = self
            .log_weight
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);

        if !max.is_finite() {
            // All weights vanished (or went non-finite). Keep the population
            // alive with uniform weights; there is no meaningful zconst
            // increment to record.
            self.set_equal_weight();
            return;
        }

        let mut sum = 0f64;
        for (weight, logw) in izip!(self.weight.iter_mut(), self.log_weight.iter_mut()) {
            *logw -= max;
            *weight = logw.exp();
            sum += *weight;
        }

        if sum <= 0f64 || !sum.is_finite() {
            self.set_equal_weight();
            return;
        }

        let log_mean = (sum / n as f64).ln();
        self.zconst += max + log_mean;

        let mut ess_denom = 0f64;
        for (weight, logw) in izip!(self.weight.iter_mut(), self.log_weight.iter_mut()) {
            *weight /= sum;
            *logw -= log_mean;
            ess_denom += *weight * *weight;
        }
        self.ess = 1f64 / ess_denom;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_ulps_eq};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn uniform_weights_have_full_ess() {
        let set = WeightSet::new(100);
        assert_eq!(set.ess(), 100.0);
        assert!(set.weights().iter().all(|&w| w == 0.01));
    }

    #[test]
    fn degenerate_weight_collapses_ess() {
        let mut set = WeightSet::new(10);
        let mut logw = vec![0f64; 10];
        logw[3] = 100.0;
        set.set_log_weight(&logw);
        assert_abs_diff_eq!(set.ess(), 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(set.weights()[3], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn increments_accumulate() {
        let mut set = WeightSet::new(4);
        set.add_log_weight(&[0.0, 0.0, 2.0f64.ln(), 0.0]);
        // Weights 1:1:2:1.
        assert_ulps_eq!(set.weights()[2], 0.4);
        assert_ulps_eq!(set.weights()[0], 0.2);
    }

    #[test]
    fn zconst_tracks_mean_of_increments() {
        let mut set = WeightSet::new(2);
        let c = 3.0f64;
        set.add_log_weight(&[c, c]);
        // Constant increment c on uniform weights shifts zconst by exactly c.
        assert_ulps_eq!(set.zconst(), c);
        assert_eq!(set.ess(), 2.0);
    }

    #[test]
    fn zero_increment_leaves_zconst_unchanged() {
        let mut set = WeightSet::new(2);
        set.add_log_weight(&[2f64.ln(), 0.0]);
        let after_first = set.zconst();
        assert_ulps_eq!(after_first, 1.5f64.ln());
        set.add_log_weight(&[0.0, 0.0]);
        assert_abs_diff_eq!(set.zconst(), after_first, epsilon = 1e-12);
    }

    #[test]
    fn constant_increments_accumulate_linearly() {
        let mut set = WeightSet::new(8);
        let c = 0.7f64;
        for _ in 0..5 {
            set.add_log_weight(&[c; 8]);
        }
        assert_abs_diff_eq!(set.zconst(), 5.0 * c, epsilon = 1e-12);
        assert_eq!(set.ess(), 8.0);
    }

    #[test]
    fn all_zero_weights_fall_back_to_uniform() {
        let mut set = WeightSet::new(5);
        set.set_log_weight(&[f64::NEG_INFINITY; 5]);
        assert_eq!(set.ess(), 5.0);
        assert!(set.weights().iter().all(|&w| w == 0.2));
    }

    proptest! {
        #[test]
        fn ess_stays_within_bounds(logw in prop::collection::vec(-50f64..50f64, 1..200)) {
            let mut set = WeightSet::new(logw.len());
            set.set_log_weight(&logw);
            let n = logw.len() as f64;
            prop_assert!(set.ess() >= 1.0 - 1e-9);
            prop_assert!(set.ess() <= n + 1e-9);
            let total: f64 = set.weights().iter().sum();
            prop_assert!((total - 1.0).abs() < 1e-9);
            let mean_exp = set.log_weights().iter().map(|l| l.exp()).sum::<f64>() / n;
            prop_assert!((mean_exp - 1.0).abs() < 1e-9);
        }
    }
}
