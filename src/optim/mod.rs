//! Composed optimizer for pretraining
//!
//! The update rule is assembled as an explicit pipeline over a base adaptive
//! rule: weight decay (with name-pattern exclusions), optional layer-wise
//! adaptation, a piecewise-linear learning-rate schedule, and gradient
//! accumulation. Construction goes through [`OptimizerBuilder`], which
//! validates the configuration up front.

mod adam;
mod composed;
mod decay;
mod lamb;
mod schedule;

pub use adam::AdamRule;
pub use composed::{ComposedOptimizer, OptimizerBuilder, OptimizerVariant};
pub use decay::WeightDecay;
pub use lamb::trust_ratio;
pub use schedule::PiecewiseLinearSchedule;
