//! # preentrenar
//!
//! A distributed pretraining controller for masked-language-model encoders.
//!
//! The crate assembles a trainable model around a backbone, selects a
//! parallel-execution strategy, composes a decorated optimizer (weight
//! decay, layer-wise adaptation, piecewise-linear schedule, gradient
//! accumulation), and drives a checkpointed training loop over a sharded
//! token-stream corpus.
//!
//! # Example
//!
//! ```no_run
//! use preentrenar::backbone::TokenTableBackbone;
//! use preentrenar::data::{MaskingConfig, ShardCorpus};
//! use preentrenar::optim::{OptimizerBuilder, OptimizerVariant};
//! use preentrenar::train::{PretrainDriver, TrainPlan};
//!
//! # fn main() -> preentrenar::Result<()> {
//! let backbone = TokenTableBackbone::new(32_000);
//! let optimizer = OptimizerBuilder::new(OptimizerVariant::Lamb, 1.76e-3)
//!     .with_weight_decay(0.01, vec!["Norm".into(), "bias".into()])
//!     .with_schedule(vec![(3125 * 16, 1.0), (125_000 * 16, 0.0)])
//!     .with_grad_accum_steps(16)
//!     .build()?;
//!
//! let masking = MaskingConfig::new(31_999, 32_000);
//! let mut corpus = ShardCorpus::load(&[], 512, 256, masking, 42)?;
//!
//! let mut driver = PretrainDriver::new(Box::new(backbone), optimizer);
//! let plan = TrainPlan::new(125_000, 16, 2000)?;
//! let summary = driver.fit(&mut corpus, &plan)?;
//! println!("final loss: {}", summary.final_loss);
//! # Ok(())
//! # }
//! ```

pub mod autograd;
pub mod backbone;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod data;
pub mod distrib;
pub mod error;
pub mod objective;
pub mod optim;
pub mod train;

pub use autograd::Tensor;
pub use error::{Error, Result};
