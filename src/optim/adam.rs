//! Base adaptive-gradient rule

use ndarray::Array1;

/// Adam-style moment estimation producing a raw per-parameter update.
///
/// The rule only turns a gradient into an update direction
/// `m_hat / (sqrt(v_hat) + epsilon)`; learning rate, decay, layer adaptation,
/// and scheduling are layered on top by the composed optimizer.
///
/// Bias correction is a toggle and defaults to off: the update-step counter
/// it would correct against counts optimizer updates, not accumulation
/// sub-steps, and the system this rule serves runs without the correction.
pub struct AdamRule {
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    bias_correction: bool,
    m: Vec<Option<Array1<f32>>>, // First moment
    v: Vec<Option<Array1<f32>>>, // Second moment
}

impl AdamRule {
    /// Create a new rule
    pub fn new(beta1: f32, beta2: f32, epsilon: f32, bias_correction: bool) -> Self {
        Self { beta1, beta2, epsilon, bias_correction, m: Vec::new(), v: Vec::new() }
    }

    /// Standard hyperparameters, bias correction off
    pub fn default_params() -> Self {
        Self::new(0.9, 0.999, 1e-8, false)
    }

    /// Whether bias correction is applied
    #[must_use]
    pub fn bias_correction(&self) -> bool {
        self.bias_correction
    }

    fn ensure_slots(&mut self, count: usize) {
        if self.m.len() < count {
            self.m.resize(count, None);
            self.v.resize(count, None);
        }
    }

    /// Compute the raw update for parameter `index` at update step `step`
    /// (1-based), folding `grad` into the moment estimates.
    pub fn raw_update(&mut self, index: usize, grad: &Array1<f32>, step: u64) -> Array1<f32> {
        self.ensure_slots(index + 1);

        // m_t = β1 m + (1 - β1) g
        let m_t = match &self.m[index] {
            Some(m) => m * self.beta1 + grad * (1.0 - self.beta1),
            None => grad * (1.0 - self.beta1),
        };

        // v_t = β2 v + (1 - β2) g²
        let grad_sq = grad * grad;
        let v_t = match &self.v[index] {
            Some(v) => v * self.beta2 + &grad_sq * (1.0 - self.beta2),
            None => grad_sq * (1.0 - self.beta2),
        };

        let update = if self.bias_correction {
            let m_hat = &m_t / (1.0 - self.beta1.powi(step as i32));
            let v_hat = &v_t / (1.0 - self.beta2.powi(step as i32));
            &m_hat / &(v_hat.mapv(f32::sqrt) + self.epsilon)
        } else {
            &m_t / &(v_t.mapv(f32::sqrt) + self.epsilon)
        };

        self.m[index] = Some(m_t);
        self.v[index] = Some(v_t);

        update
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_update_points_along_gradient() {
        let mut rule = AdamRule::default_params();
        let grad = Array1::from(vec![1.0, -1.0]);
        let update = rule.raw_update(0, &grad, 1);
        assert!(update[0] > 0.0);
        assert!(update[1] < 0.0);
    }

    #[test]
    fn test_zero_gradient_zero_update() {
        let mut rule = AdamRule::default_params();
        let grad = Array1::zeros(3);
        let update = rule.raw_update(0, &grad, 1);
        assert!(update.iter().all(|&u| u == 0.0));
    }

    #[test]
    fn test_bias_correction_rescales_first_step() {
        let grad = Array1::from(vec![1.0]);

        let mut corrected = AdamRule::new(0.9, 0.999, 1e-8, true);
        let u_corrected = corrected.raw_update(0, &grad, 1);

        let mut plain = AdamRule::new(0.9, 0.999, 1e-8, false);
        let u_plain = plain.raw_update(0, &grad, 1);

        // With correction the first step recovers unit magnitude. Without it
        // the square root inflates the raw ratio: m/sqrt(v) = 0.1/sqrt(0.001).
        assert_abs_diff_eq!(u_corrected[0], 1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(u_plain[0], 0.1 / 0.001f32.sqrt(), epsilon = 1e-3);
        assert!(u_plain[0] > u_corrected[0]);
    }

    #[test]
    fn test_moments_persist_across_steps() {
        let mut rule = AdamRule::default_params();
        let grad = Array1::from(vec![1.0]);
        let first = rule.raw_update(0, &grad, 1);
        let second = rule.raw_update(0, &grad, 2);
        // Moment accumulation grows the update toward the sign of the gradient.
        assert!(second[0] > first[0]);
    }

    #[test]
    fn test_update_finite_for_extreme_gradients() {
        let mut rule = AdamRule::default_params();
        let grad = Array1::from(vec![1e12, -1e12, 1e-12]);
        let update = rule.raw_update(0, &grad, 1);
        assert!(update.iter().all(|u| u.is_finite()));
    }

    #[test]
    fn test_independent_parameter_slots() {
        let mut rule = AdamRule::default_params();
        let g0 = Array1::from(vec![1.0]);
        let g1 = Array1::from(vec![-2.0]);
        let u0 = rule.raw_update(0, &g0, 1);
        let u1 = rule.raw_update(1, &g1, 1);
        assert!(u0[0] > 0.0);
        assert!(u1[0] < 0.0);
    }

    #[test]
    fn test_second_moment_non_negative() {
        let mut rule = AdamRule::default_params();
        for step in 1..=50u64 {
            let grad = Array1::from(vec![((step as f32) * 0.37).sin() * 5.0]);
            rule.raw_update(0, &grad, step);
        }
        for v in rule.v.iter().flatten() {
            assert!(v.iter().all(|&x| x >= 0.0));
        }
    }
}
