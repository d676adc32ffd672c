//! Weight decay with name-pattern exclusions

use crate::error::{Error, Result};
use ndarray::Array1;

/// Decoupled weight decay folded into the raw update.
///
/// A parameter is exempt iff its name contains any exclusion pattern as a
/// substring, so `"bias"` exempts `"LayerNorm.bias"` while `"dense.kernel"`
/// receives the full `rate * param` contribution.
#[derive(Debug, Clone)]
pub struct WeightDecay {
    rate: f32,
    exclude: Vec<String>,
}

impl WeightDecay {
    /// Create a decay policy.
    ///
    /// Fails on a non-finite or negative rate, or on an empty exclusion
    /// pattern (which would exempt every parameter).
    pub fn new(rate: f32, exclude: Vec<String>) -> Result<Self> {
        if !rate.is_finite() || rate < 0.0 {
            return Err(Error::Config(format!("weight decay rate must be non-negative, got {rate}")));
        }
        if exclude.iter().any(String::is_empty) {
            return Err(Error::Config("empty weight-decay exclusion pattern".into()));
        }
        Ok(Self { rate, exclude })
    }

    /// Decay rate
    #[must_use]
    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Whether the named parameter is exempt from decay
    pub fn is_excluded(&self, name: &str) -> bool {
        self.exclude.iter().any(|pattern| name.contains(pattern))
    }

    /// Fold the decay contribution for `name` into `update`
    pub fn apply(&self, name: &str, param: &Array1<f32>, update: &mut Array1<f32>) {
        if self.rate == 0.0 || self.is_excluded(name) {
            return;
        }
        *update = &*update + &(param * self.rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matching() {
        let decay = WeightDecay::new(0.01, vec!["Norm".into(), "bias".into()]).unwrap();
        assert!(decay.is_excluded("LayerNorm.bias"));
        assert!(decay.is_excluded("encoder.LayerNorm.gamma"));
        assert!(decay.is_excluded("output.bias"));
        assert!(!decay.is_excluded("dense.kernel"));
        assert!(!decay.is_excluded("embedding.weight"));
    }

    #[test]
    fn test_excluded_parameter_untouched() {
        let decay = WeightDecay::new(0.01, vec!["bias".into()]).unwrap();
        let param = Array1::from(vec![2.0, -2.0]);
        let mut update = Array1::zeros(2);
        decay.apply("LayerNorm.bias", &param, &mut update);
        assert!(update.iter().all(|&u| u == 0.0));
    }

    #[test]
    fn test_decayed_parameter_full_contribution() {
        let decay = WeightDecay::new(0.01, vec!["bias".into()]).unwrap();
        let param = Array1::from(vec![2.0, -2.0]);
        let mut update = Array1::zeros(2);
        decay.apply("dense.kernel", &param, &mut update);
        assert_eq!(update[0], 0.02);
        assert_eq!(update[1], -0.02);
    }

    #[test]
    fn test_zero_rate_is_noop() {
        let decay = WeightDecay::new(0.0, vec![]).unwrap();
        let param = Array1::from(vec![5.0]);
        let mut update = Array1::zeros(1);
        decay.apply("dense.kernel", &param, &mut update);
        assert_eq!(update[0], 0.0);
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert!(WeightDecay::new(0.01, vec!["".into()]).is_err());
    }

    #[test]
    fn test_negative_rate_rejected() {
        assert!(WeightDecay::new(-0.01, vec![]).is_err());
    }

    #[test]
    fn test_nan_rate_rejected() {
        assert!(WeightDecay::new(f32::NAN, vec![]).is_err());
    }
}
