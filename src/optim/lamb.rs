//! Layer-wise adaptation

use ndarray::Array1;

/// Trust ratio rescaling a parameter's update by the ratio of parameter norm
/// to update norm.
///
/// A single global learning rate then behaves sensibly across layers of very
/// different scale. The ratio falls back to 1.0 when either norm is zero
/// (fresh zero-initialized parameters, or an all-zero update).
///
/// The ratio must be computed on the update *after* weight decay has been
/// folded in, so the rescale reflects the decayed direction.
pub fn trust_ratio(param: &Array1<f32>, update: &Array1<f32>) -> f32 {
    let param_norm = param.dot(param).sqrt();
    let update_norm = update.dot(update).sqrt();
    if param_norm > 0.0 && update_norm > 0.0 {
        param_norm / update_norm
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_ratio_of_norms() {
        let param = Array1::from(vec![3.0, 4.0]); // norm 5
        let update = Array1::from(vec![1.0, 0.0]); // norm 1
        assert_abs_diff_eq!(trust_ratio(&param, &update), 5.0, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_param_norm_falls_back() {
        let param = Array1::zeros(4);
        let update = Array1::from(vec![1.0, 1.0, 1.0, 1.0]);
        assert_eq!(trust_ratio(&param, &update), 1.0);
    }

    #[test]
    fn test_zero_update_norm_falls_back() {
        let param = Array1::from(vec![1.0, 2.0]);
        let update = Array1::zeros(2);
        assert_eq!(trust_ratio(&param, &update), 1.0);
    }

    #[test]
    fn test_scale_invariance_of_direction() {
        let param = Array1::from(vec![2.0, 2.0]);
        let update = Array1::from(vec![0.1, 0.1]);
        let scaled = &update * 10.0;
        // Rescaled step has the same magnitude whatever the raw update scale.
        let step_a = trust_ratio(&param, &update) * update.dot(&update).sqrt();
        let step_b = trust_ratio(&param, &scaled) * scaled.dot(&scaled).sqrt();
        assert_abs_diff_eq!(step_a, step_b, epsilon = 1e-5);
    }
}
