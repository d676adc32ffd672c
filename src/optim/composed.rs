//! The composed update rule and its builder

use super::adam::AdamRule;
use super::decay::WeightDecay;
use super::lamb::trust_ratio;
use super::schedule::PiecewiseLinearSchedule;
use crate::autograd::Tensor;
use crate::error::{Error, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Which update rule drives parameter steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerVariant {
    /// Base adaptive rule with weight decay
    #[default]
    Adam,
    /// Adds layer-wise adaptation on top of the decayed update
    Lamb,
}

/// A single stateful update rule layering weight decay, optional layer
/// adaptation, a piecewise-linear schedule, and gradient accumulation on top
/// of the base adaptive rule.
///
/// Stage order is fixed: the base rule turns the mean accumulated gradient
/// into a raw update, decay folds in `rate * param` for non-excluded
/// parameters, layer adaptation (the `Lamb` variant) rescales that decayed
/// direction by the parameter/update norm ratio, and the schedule multiplier
/// scales the effective learning rate for the step.
///
/// Gradients are harvested from the parameters' grad cells on every call;
/// parameters mutate only on the final call of each accumulation cycle, and
/// the update counter advances only then.
pub struct ComposedOptimizer {
    lr: f32,
    rule: AdamRule,
    decay: WeightDecay,
    layer_adaptation: bool,
    schedule: PiecewiseLinearSchedule,
    grad_accum_steps: u64,
    accum: Vec<Option<Array1<f32>>>,
    cycle_pos: u64,
    batches_seen: u64,
    updates: u64,
}

impl ComposedOptimizer {
    /// Consume one batch worth of gradients; apply a parameter update when
    /// the accumulation cycle completes.
    ///
    /// Returns `true` iff parameters were mutated by this call.
    pub fn step(&mut self, params: &mut [(String, Tensor)]) -> bool {
        if self.accum.len() < params.len() {
            self.accum.resize(params.len(), None);
        }

        for (i, (_, tensor)) in params.iter().enumerate() {
            if let Some(grad) = tensor.grad() {
                match &mut self.accum[i] {
                    Some(sum) => *sum = &*sum + &grad,
                    None => self.accum[i] = Some(grad),
                }
                tensor.zero_grad();
            }
        }

        self.batches_seen += 1;
        self.cycle_pos += 1;
        if self.cycle_pos < self.grad_accum_steps {
            return false;
        }
        self.cycle_pos = 0;
        self.updates += 1;

        let lr_step = self.lr * self.schedule_multiplier();
        let mean_scale = 1.0 / self.grad_accum_steps as f32;

        for (i, (name, tensor)) in params.iter_mut().enumerate() {
            let Some(sum) = self.accum[i].take() else { continue };
            let grad = sum * mean_scale;

            let mut update = self.rule.raw_update(i, &grad, self.updates);
            let param_snapshot = tensor.data().clone();
            self.decay.apply(name, &param_snapshot, &mut update);

            let ratio = if self.layer_adaptation {
                trust_ratio(&param_snapshot, &update)
            } else {
                1.0
            };

            let delta = update * (lr_step * ratio);
            let mut data = tensor.data_mut();
            *data = &*data - &delta;
        }

        true
    }

    /// Schedule multiplier at the current update count. The anchors use
    /// batch units, so the update counter is scaled by the accumulation
    /// factor before lookup.
    pub fn schedule_multiplier(&self) -> f32 {
        self.schedule.multiplier(self.updates * self.grad_accum_steps)
    }

    /// Effective learning rate at the current update count
    pub fn current_lr(&self) -> f32 {
        self.lr * self.schedule_multiplier()
    }

    /// Base learning rate
    pub fn lr(&self) -> f32 {
        self.lr
    }

    /// Replace the base learning rate
    pub fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    /// Optimizer updates applied so far
    #[must_use]
    pub fn update_count(&self) -> u64 {
        self.updates
    }

    /// Batches consumed so far (accumulation sub-steps included)
    #[must_use]
    pub fn batches_consumed(&self) -> u64 {
        self.batches_seen
    }

    /// Accumulation factor
    #[must_use]
    pub fn grad_accum_steps(&self) -> u64 {
        self.grad_accum_steps
    }
}

/// Builder assembling a [`ComposedOptimizer`], validating the configuration
/// before any training state exists.
pub struct OptimizerBuilder {
    variant: OptimizerVariant,
    learning_rate: f32,
    weight_decay_rate: f32,
    exclude: Vec<String>,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    bias_correction: bool,
    anchors: Option<Vec<(u64, f32)>>,
    grad_accum_steps: u64,
}

impl OptimizerBuilder {
    /// Start a builder for the given variant and base learning rate
    pub fn new(variant: OptimizerVariant, learning_rate: f32) -> Self {
        Self {
            variant,
            learning_rate,
            weight_decay_rate: 0.0,
            exclude: Vec::new(),
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            bias_correction: false,
            anchors: None,
            grad_accum_steps: 1,
        }
    }

    /// Set the decay rate and exclusion patterns
    pub fn with_weight_decay(mut self, rate: f32, exclude: Vec<String>) -> Self {
        self.weight_decay_rate = rate;
        self.exclude = exclude;
        self
    }

    /// Set the moment coefficients
    pub fn with_betas(mut self, beta1: f32, beta2: f32) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    /// Set the denominator stabilizer
    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Toggle bias correction on the base rule
    pub fn with_bias_correction(mut self, enabled: bool) -> Self {
        self.bias_correction = enabled;
        self
    }

    /// Set explicit schedule anchors (batch units)
    pub fn with_schedule(mut self, anchors: Vec<(u64, f32)>) -> Self {
        self.anchors = Some(anchors);
        self
    }

    /// Set the accumulation factor
    pub fn with_grad_accum_steps(mut self, steps: u64) -> Self {
        self.grad_accum_steps = steps;
        self
    }

    /// Validate and build the composed rule
    pub fn build(self) -> Result<ComposedOptimizer> {
        if self.grad_accum_steps == 0 {
            return Err(Error::Config("gradient accumulation factor must be positive".into()));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(Error::Config(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }

        let decay = WeightDecay::new(self.weight_decay_rate, self.exclude)?;
        let schedule = match self.anchors {
            Some(anchors) => PiecewiseLinearSchedule::new(anchors)?,
            None => PiecewiseLinearSchedule::constant(),
        };

        Ok(ComposedOptimizer {
            lr: self.learning_rate,
            rule: AdamRule::new(self.beta1, self.beta2, self.epsilon, self.bias_correction),
            decay,
            layer_adaptation: self.variant == OptimizerVariant::Lamb,
            schedule,
            grad_accum_steps: self.grad_accum_steps,
            accum: Vec::new(),
            cycle_pos: 0,
            batches_seen: 0,
            updates: 0,
        })
    }
}
