//! Consumed backbone boundary
//!
//! The encoder's internal architecture belongs to a collaborator crate; the
//! controller only needs a forward pass producing per-position vocabulary
//! logits, named parameter handles for the optimizer and checkpointing, and
//! a way to load pretrained weights. [`TokenTableBackbone`] is a minimal
//! reference implementation used by the binary's smoke configuration and the
//! integration tests.

use crate::autograd::{BackwardOp, Tensor};
use crate::checkpoint;
use crate::data::MlmBatch;
use crate::error::Result;
use ndarray::Array1;
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

/// A trainable MLM encoder as seen by the controller.
///
/// `parameters` returns shared handles: mutations by the optimizer are
/// visible to subsequent forward passes, and checkpoint restores are visible
/// without rebuilding the model.
pub trait Backbone {
    /// Per-position logits for a batch, `num_positions * vocab_size` long
    fn forward(&self, batch: &MlmBatch) -> Tensor;

    /// Named parameter handles, in a stable order
    fn parameters(&self) -> Vec<(String, Tensor)>;

    /// Output vocabulary size
    fn vocab_size(&self) -> usize;

    /// Load weights from a named-tensor snapshot
    fn load_weights(&mut self, path: &Path) -> Result<()>;

    /// Total number of trainable scalars
    fn parameter_count(&self) -> usize {
        self.parameters().iter().map(|(_, t)| t.len()).sum()
    }
}

/// Reference backbone: a per-token logit table plus an output bias.
///
/// Each input token indexes a row of vocabulary logits. There is no context
/// mixing, which keeps the model tiny while still exercising every part of
/// the controller: masked positions carry the mask token, so the table must
/// learn the output distribution under the masking policy.
pub struct TokenTableBackbone {
    table: Tensor,
    bias: Tensor,
    vocab_size: usize,
}

impl TokenTableBackbone {
    /// Create a backbone with deterministic small-valued initialization
    pub fn new(vocab_size: usize) -> Self {
        let scale = (1.0 / vocab_size as f32).sqrt();
        let table = Tensor::from_vec(
            (0..vocab_size * vocab_size).map(|i| (i as f32 * 0.111).sin() * scale).collect(),
            true,
        );
        let bias = Tensor::zeros(vocab_size, true);
        Self { table, bias, vocab_size }
    }
}

struct TokenTableBackward {
    logits_grad_cell: Rc<RefCell<Option<Array1<f32>>>>,
    table: Tensor,
    bias: Tensor,
    input_ids: Vec<u32>,
    vocab_size: usize,
}

impl BackwardOp for TokenTableBackward {
    fn backward(&self) {
        let cell = self.logits_grad_cell.borrow();
        let Some(grad) = cell.as_ref() else { return };

        let vocab = self.vocab_size;
        let mut table_grad = Array1::<f32>::zeros(vocab * vocab);
        let mut bias_grad = Array1::<f32>::zeros(vocab);

        for (pos, &token) in self.input_ids.iter().enumerate() {
            let row = token as usize;
            if row >= vocab {
                continue;
            }
            for v in 0..vocab {
                let g = grad[pos * vocab + v];
                table_grad[row * vocab + v] += g;
                bias_grad[v] += g;
            }
        }
        drop(cell);

        self.table.accumulate_grad(table_grad);
        self.bias.accumulate_grad(bias_grad);
    }
}

impl Backbone for TokenTableBackbone {
    fn forward(&self, batch: &MlmBatch) -> Tensor {
        let vocab = self.vocab_size;
        let table = self.table.data();
        let bias = self.bias.data();

        let mut out = Vec::with_capacity(batch.input_ids.len() * vocab);
        for &token in &batch.input_ids {
            let row = token as usize;
            if row >= vocab {
                out.extend(std::iter::repeat(0.0).take(vocab));
                continue;
            }
            let start = row * vocab;
            for v in 0..vocab {
                out.push(table[start + v] + bias[v]);
            }
        }
        drop(table);
        drop(bias);

        let mut logits = Tensor::from_vec(out, true);
        logits.set_backward_op(Rc::new(TokenTableBackward {
            logits_grad_cell: logits.grad_cell(),
            table: self.table.clone(),
            bias: self.bias.clone(),
            input_ids: batch.input_ids.clone(),
            vocab_size: vocab,
        }));
        logits
    }

    fn parameters(&self) -> Vec<(String, Tensor)> {
        vec![
            ("token_table.kernel".to_string(), self.table.clone()),
            ("token_table.bias".to_string(), self.bias.clone()),
        ]
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn load_weights(&mut self, path: &Path) -> Result<()> {
        let snapshot = checkpoint::load_snapshot(path)?;
        checkpoint::restore_into(&snapshot, &self.parameters())
    }
}
