//! Tape-based autograd substrate
//!
//! Provides the shared-storage [`Tensor`] handle and the [`BackwardOp`] tape
//! node trait. Differentiable computations build a chain of backward ops;
//! calling [`Tensor::backward`] on a scalar result seeds the gradient and
//! walks the chain, accumulating gradients into each leaf tensor's grad cell.

mod backward;
mod tensor;

pub use backward::BackwardOp;
pub use tensor::Tensor;
