//! Masked language modeling objective
//!
//! Computes the masked cross-entropy loss and the masked prediction accuracy
//! over a batch of logits. Only positions flagged in the batch's mask
//! contribute; the reduction is stabilized so a batch with zero masked
//! positions yields exact zeros rather than NaN.

use crate::autograd::{BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Stabilizer added to the masked-position count in both reductions
pub const EPSILON: f32 = 1e-7;

/// Loss and accuracy signals for one batch.
///
/// `loss` carries the gradient tape; `accuracy` is a plain float and can
/// never influence optimization.
pub struct MlmSignals {
    /// Mean masked cross-entropy, differentiable
    pub loss: Tensor,
    /// Mean masked argmax accuracy, detached
    pub accuracy: f32,
}

/// Masked-token objective head.
///
/// The loss is
/// `sum(ce(position) * mask(position)) / (sum(mask) + EPSILON)`
/// with per-position cross-entropy from a max-subtracted softmax, and the
/// accuracy is the identical reduction with a 0/1 argmax-correctness
/// indicator in place of cross-entropy.
pub struct MaskedLmObjective {
    vocab_size: usize,
}

impl MaskedLmObjective {
    /// Create an objective head for the given vocabulary size
    pub fn new(vocab_size: usize) -> Self {
        Self { vocab_size }
    }

    /// Compute softmax for a single position
    fn softmax(logits: &[f32]) -> Vec<f32> {
        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exp_vals: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
        let sum: f32 = exp_vals.iter().sum();
        exp_vals.iter().map(|&x| x / sum).collect()
    }

    /// Evaluate loss and accuracy for one batch of logits.
    ///
    /// `logits` must be `targets.len() * vocab_size` long. The returned loss
    /// chains into the logits' tape, distributing
    /// `(softmax - one_hot) * mask / (sum(mask) + EPSILON)` to each masked
    /// position and exactly zero elsewhere.
    pub fn forward(&self, logits: &Tensor, targets: &[u32], mask: &[bool]) -> MlmSignals {
        let positions = targets.len();
        let vocab_size = self.vocab_size;

        assert_eq!(
            logits.len(),
            positions * vocab_size,
            "logits must be positions * vocab_size"
        );
        assert_eq!(mask.len(), positions, "mask must cover every position");

        let mask_sum: f32 = mask.iter().filter(|&&m| m).count() as f32;
        let denom = mask_sum + EPSILON;

        let logits_data = logits.data();
        let logits_slice = logits_data.as_slice().expect("logits must be contiguous");

        let mut loss_sum = 0.0;
        let mut correct_sum = 0.0;
        let mut grads = vec![0.0f32; positions * vocab_size];

        for pos in 0..positions {
            if !mask[pos] {
                continue;
            }
            let start = pos * vocab_size;
            let row = &logits_slice[start..start + vocab_size];
            let probs = Self::softmax(row);

            let target_idx = targets[pos] as usize;
            if target_idx >= vocab_size {
                continue;
            }

            let prob = probs[target_idx].max(1e-10);
            loss_sum -= prob.ln();

            let argmax = row
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(i, _)| i)
                .unwrap_or(0);
            if argmax == target_idx {
                correct_sum += 1.0;
            }

            for (i, &p) in probs.iter().enumerate() {
                let indicator = if i == target_idx { 1.0 } else { 0.0 };
                grads[start + i] = (p - indicator) / denom;
            }
        }
        drop(logits_data);

        let loss_value = loss_sum / denom;
        let accuracy = correct_sum / denom;

        let mut loss = Tensor::from_vec(vec![loss_value], true);

        struct MaskedLmBackward {
            logits_grad_cell: Rc<RefCell<Option<Array1<f32>>>>,
            logits_backward_op: Option<Rc<dyn BackwardOp>>,
            grad: Array1<f32>,
        }

        impl BackwardOp for MaskedLmBackward {
            fn backward(&self) {
                let mut cell = self.logits_grad_cell.borrow_mut();
                match cell.as_mut() {
                    Some(existing) => *existing = &*existing + &self.grad,
                    None => *cell = Some(self.grad.clone()),
                }
                drop(cell); // release borrow before recursing

                if let Some(ref op) = self.logits_backward_op {
                    op.backward();
                }
            }
        }

        if logits.requires_grad() {
            loss.set_backward_op(Rc::new(MaskedLmBackward {
                logits_grad_cell: logits.grad_cell(),
                logits_backward_op: logits.backward_op(),
                grad: Array1::from(grads),
            }));
        }

        MlmSignals { loss, accuracy }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Loss stays finite and non-negative, accuracy stays in [0, 1],
        /// for arbitrary logits and masks.
        #[test]
        fn signals_stay_bounded(
            vocab in 2usize..8,
            positions in 1usize..6,
            scale in 0.1f32..50.0,
            seed in 0u32..500,
        ) {
            let data: Vec<f32> = (0..positions * vocab)
                .map(|i| ((i as f32 + seed as f32) * 0.37).sin() * scale)
                .collect();
            let logits = Tensor::from_vec(data, true);
            let targets: Vec<u32> = (0..positions).map(|i| (i % vocab) as u32).collect();
            let mask: Vec<bool> = (0..positions).map(|i| (i + seed as usize) % 3 != 0).collect();

            let head = MaskedLmObjective::new(vocab);
            let signals = head.forward(&logits, &targets, &mask);

            prop_assert!(signals.loss.item().is_finite());
            prop_assert!(signals.loss.item() >= 0.0);
            prop_assert!((0.0..=1.0).contains(&signals.accuracy));
        }

        /// The gradient is finite everywhere and zero at unmasked positions
        #[test]
        fn gradient_respects_mask(
            vocab in 2usize..6,
            positions in 1usize..5,
            seed in 0u32..500,
        ) {
            let data: Vec<f32> = (0..positions * vocab)
                .map(|i| ((i as f32 + seed as f32) * 0.73).cos() * 5.0)
                .collect();
            let logits = Tensor::from_vec(data, true);
            let targets: Vec<u32> = (0..positions).map(|i| (i % vocab) as u32).collect();
            let mask: Vec<bool> = (0..positions).map(|i| i % 2 == 0).collect();

            let head = MaskedLmObjective::new(vocab);
            let signals = head.forward(&logits, &targets, &mask);
            signals.loss.backward();

            let grad = logits.grad().unwrap();
            for (pos, &m) in mask.iter().enumerate() {
                for v in 0..vocab {
                    let g = grad[pos * vocab + v];
                    prop_assert!(g.is_finite());
                    if !m {
                        prop_assert_eq!(g, 0.0);
                    }
                }
            }
        }
    }
}
