//! The pretraining driver
//!
//! Consumes batches at the corpus's natural rate, runs the replica
//! forward/backward passes, lets the composed optimizer decide when a
//! parameter update happens, and fires callbacks at epoch boundaries.

use super::callback::{CallbackAction, CallbackContext, CallbackManager, TrainerCallback};
use super::metrics::MetricsTracker;
use crate::autograd::Tensor;
use crate::backbone::Backbone;
use crate::data::{CorpusReader, MlmBatch};
use crate::distrib::{Collective, LocalCollective};
use crate::error::{Error, Result};
use crate::objective::MaskedLmObjective;
use crate::optim::ComposedOptimizer;

/// Step accounting for a training run.
///
/// `num_train_steps` counts optimizer updates; `steps_per_epoch` counts
/// batches. Under accumulation one epoch of `steps_per_epoch` batches
/// therefore contains `steps_per_epoch / grad_accum_steps` optimizer
/// updates.
#[derive(Debug, Clone, Copy)]
pub struct TrainPlan {
    /// Total optimizer updates for the run
    pub num_train_steps: u64,
    /// Batches contributing to each update
    pub grad_accum_steps: u64,
    /// Batches per epoch
    pub steps_per_epoch: u64,
}

impl TrainPlan {
    /// Create a plan; every count must be positive
    pub fn new(num_train_steps: u64, grad_accum_steps: u64, steps_per_epoch: u64) -> Result<Self> {
        if num_train_steps == 0 || grad_accum_steps == 0 || steps_per_epoch == 0 {
            return Err(Error::Config(
                "train steps, accumulation factor, and steps per epoch must be positive".into(),
            ));
        }
        Ok(Self { num_train_steps, grad_accum_steps, steps_per_epoch })
    }

    /// Number of epochs the run spans:
    /// `num_train_steps * grad_accum_steps / steps_per_epoch`
    pub fn epochs(&self) -> u64 {
        self.num_train_steps * self.grad_accum_steps / self.steps_per_epoch
    }
}

/// Final state of a completed (or stopped) run
#[derive(Debug, Clone)]
pub struct TrainSummary {
    /// Epochs actually run
    pub epochs_run: u64,
    /// Mean masked loss of the final epoch
    pub final_loss: f32,
    /// Best epoch loss observed
    pub best_loss: Option<f32>,
    /// Optimizer updates applied
    pub optimizer_steps: u64,
    /// Batches consumed
    pub batches_consumed: u64,
    /// Whether a callback requested an early stop
    pub stopped_early: bool,
}

/// Orchestrates the pretraining loop.
///
/// The driver owns the corpus iteration and the parameter handles; the
/// composed optimizer is the only component that mutates parameters.
pub struct PretrainDriver {
    backbone: Box<dyn Backbone>,
    objective: MaskedLmObjective,
    optimizer: ComposedOptimizer,
    params: Vec<(String, Tensor)>,
    collective: Box<dyn Collective>,
    replicas: usize,
    callbacks: CallbackManager,
    /// Consumption counters and per-epoch aggregates
    pub metrics: MetricsTracker,
    best_loss: Option<f32>,
}

impl PretrainDriver {
    /// Create a driver over a backbone and a composed optimizer.
    ///
    /// Defaults to one replica with the in-process collective.
    pub fn new(backbone: Box<dyn Backbone>, optimizer: ComposedOptimizer) -> Self {
        let params = backbone.parameters();
        let objective = MaskedLmObjective::new(backbone.vocab_size());
        Self {
            backbone,
            objective,
            optimizer,
            params,
            collective: Box::new(LocalCollective),
            replicas: 1,
            callbacks: CallbackManager::new(),
            metrics: MetricsTracker::new(),
            best_loss: None,
        }
    }

    /// Set the replica count batches are sharded across
    pub fn set_replicas(&mut self, replicas: usize) {
        self.replicas = replicas.max(1);
    }

    /// Replace the gradient-reduction transport
    pub fn set_collective(&mut self, collective: Box<dyn Collective>) {
        self.collective = collective;
    }

    /// Register an epoch-boundary callback
    pub fn add_callback<C: TrainerCallback + 'static>(&mut self, callback: C) {
        self.callbacks.add(callback);
    }

    /// The trained parameter handles
    pub fn params(&self) -> &[(String, Tensor)] {
        &self.params
    }

    /// The backbone under training
    pub fn backbone(&self) -> &dyn Backbone {
        self.backbone.as_ref()
    }

    /// Run the full training loop.
    ///
    /// Consumes `plan.epochs() * plan.steps_per_epoch` batches unless a
    /// callback stops the run early.
    pub fn fit(&mut self, corpus: &mut dyn CorpusReader, plan: &TrainPlan) -> Result<TrainSummary> {
        let epochs = plan.epochs();
        let mut stopped_early = false;
        let mut final_loss = 0.0;

        self.callbacks.on_train_begin(&CallbackContext {
            max_epochs: epochs as usize,
            ..Default::default()
        });

        let mut last_epoch = 0usize;
        for epoch in 0..epochs {
            last_epoch = epoch as usize;
            let mut loss_sum = 0.0;
            let mut accuracy_sum = 0.0;

            for _ in 0..plan.steps_per_epoch {
                let batch = corpus.next_batch()?;
                let (loss, accuracy) = self.run_batch(&batch)?;
                self.optimizer.step(&mut self.params);
                self.metrics.increment_batch();
                loss_sum += loss;
                accuracy_sum += accuracy;
            }

            let avg_loss = loss_sum / plan.steps_per_epoch as f32;
            let avg_accuracy = accuracy_sum / plan.steps_per_epoch as f32;
            final_loss = avg_loss;
            if self.best_loss.map_or(true, |best| avg_loss < best) {
                self.best_loss = Some(avg_loss);
            }
            self.metrics.record_epoch(avg_loss, avg_accuracy);

            let ctx = CallbackContext {
                epoch: epoch as usize,
                max_epochs: epochs as usize,
                loss: avg_loss,
                accuracy: avg_accuracy,
                lr: self.optimizer.current_lr(),
                optimizer_steps: self.optimizer.update_count(),
                batches_consumed: self.optimizer.batches_consumed(),
                best_loss: self.best_loss,
            };
            if self.callbacks.on_epoch_end(&ctx) == CallbackAction::Stop {
                stopped_early = true;
                break;
            }
        }

        self.callbacks.on_train_end(&CallbackContext {
            epoch: last_epoch,
            max_epochs: epochs as usize,
            loss: final_loss,
            lr: self.optimizer.current_lr(),
            optimizer_steps: self.optimizer.update_count(),
            batches_consumed: self.optimizer.batches_consumed(),
            best_loss: self.best_loss,
            ..Default::default()
        });

        Ok(TrainSummary {
            epochs_run: self.metrics.epoch as u64,
            final_loss,
            best_loss: self.best_loss,
            optimizer_steps: self.optimizer.update_count(),
            batches_consumed: self.optimizer.batches_consumed(),
            stopped_early,
        })
    }

    /// Forward/backward one batch across the replicas and reduce gradients.
    ///
    /// Each replica's backward pass accumulates its shard gradients into the
    /// shared parameter handles; the collective turns the sums into the mean
    /// before the optimizer sees them. The whole cycle is a barrier: nothing
    /// proceeds until every replica and the reduction are done.
    fn run_batch(&mut self, batch: &MlmBatch) -> Result<(f32, f32)> {
        let replicas = self.replicas.min(batch.batch_size).max(1);

        let mut active = 0usize;
        let mut loss_sum = 0.0;
        let mut accuracy_sum = 0.0;

        for replica in 0..replicas {
            let shard = if replicas == 1 { batch.clone() } else { batch.shard(replica, replicas) };
            if shard.batch_size == 0 {
                continue;
            }
            let logits = self.backbone.forward(&shard);
            let signals = self.objective.forward(&logits, &shard.target_ids, &shard.mask_flags);
            signals.loss.backward();
            loss_sum += signals.loss.item();
            accuracy_sum += signals.accuracy;
            active += 1;
        }

        if active == 0 {
            return Ok((0.0, 0.0));
        }

        self.collective
            .sync_gradients(&self.params, active)
            .map_err(|e| Error::Replica(format!("gradient reduction failed: {e}")))?;

        Ok((loss_sum / active as f32, accuracy_sum / active as f32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backbone::TokenTableBackbone;
    use crate::data::{MaskingConfig, ShardCorpus};
    use crate::optim::{OptimizerBuilder, OptimizerVariant};

    const VOCAB: usize = 8;

    fn test_corpus() -> ShardCorpus {
        let shards = vec![(0..96u32).map(|i| i % 6).collect::<Vec<_>>()];
        let masking = MaskingConfig::new(7, VOCAB as u32).with_mask_prob(0.5);
        ShardCorpus::from_tokens(shards, 4, 4, masking, 11).unwrap()
    }

    fn test_driver(grad_accum_steps: u64) -> PretrainDriver {
        let backbone = TokenTableBackbone::new(VOCAB);
        let optimizer = OptimizerBuilder::new(OptimizerVariant::Adam, 0.05)
            .with_grad_accum_steps(grad_accum_steps)
            .build()
            .unwrap();
        PretrainDriver::new(Box::new(backbone), optimizer)
    }

    #[test]
    fn test_epoch_accounting() {
        let plan = TrainPlan::new(125_000, 16, 2000).unwrap();
        assert_eq!(plan.epochs(), 1000);
    }

    #[test]
    fn test_epoch_accounting_without_accumulation() {
        let plan = TrainPlan::new(100, 1, 10).unwrap();
        assert_eq!(plan.epochs(), 10);
    }

    #[test]
    fn test_plan_rejects_zero_counts() {
        assert!(TrainPlan::new(0, 1, 1).is_err());
        assert!(TrainPlan::new(1, 0, 1).is_err());
        assert!(TrainPlan::new(1, 1, 0).is_err());
    }

    #[test]
    fn test_fit_consumes_planned_batches() {
        let mut driver = test_driver(2);
        let mut corpus = test_corpus();
        // 8 updates * 2 accumulation / 4 steps per epoch = 4 epochs.
        let plan = TrainPlan::new(8, 2, 4).unwrap();

        let summary = driver.fit(&mut corpus, &plan).unwrap();
        assert_eq!(summary.epochs_run, 4);
        assert_eq!(summary.batches_consumed, 16);
        assert_eq!(summary.optimizer_steps, 8);
        assert!(!summary.stopped_early);
    }

    #[test]
    fn test_fit_learns_on_token_table() {
        let mut driver = test_driver(1);
        let mut corpus = test_corpus();
        let plan = TrainPlan::new(60, 1, 6).unwrap();

        let summary = driver.fit(&mut corpus, &plan).unwrap();
        let first = driver.metrics.epoch_losses[0];
        assert!(summary.final_loss.is_finite());
        assert!(
            summary.final_loss < first,
            "loss did not improve: {first} -> {}",
            summary.final_loss
        );
    }

    #[test]
    fn test_replicated_fit_matches_batch_counters() {
        let mut driver = test_driver(1);
        driver.set_replicas(2);
        let mut corpus = test_corpus();
        let plan = TrainPlan::new(8, 1, 4).unwrap();

        let summary = driver.fit(&mut corpus, &plan).unwrap();
        assert_eq!(summary.batches_consumed, 8);
        assert_eq!(summary.optimizer_steps, 8);
    }

    #[test]
    fn test_callback_stop_ends_run_early() {
        struct StopAfter {
            epochs: usize,
        }
        impl TrainerCallback for StopAfter {
            fn on_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
                if ctx.epoch + 1 >= self.epochs {
                    CallbackAction::Stop
                } else {
                    CallbackAction::Continue
                }
            }
            fn name(&self) -> &'static str {
                "StopAfter"
            }
        }

        let mut driver = test_driver(1);
        driver.add_callback(StopAfter { epochs: 2 });
        let mut corpus = test_corpus();
        let plan = TrainPlan::new(40, 1, 4).unwrap();

        let summary = driver.fit(&mut corpus, &plan).unwrap();
        assert!(summary.stopped_early);
        assert_eq!(summary.epochs_run, 2);
    }

    #[test]
    fn test_epoch_context_carries_counters() {
        use std::cell::RefCell;
        use std::rc::Rc;

        struct Capture {
            seen: Rc<RefCell<Vec<(u64, u64)>>>,
        }
        impl TrainerCallback for Capture {
            fn on_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
                self.seen.borrow_mut().push((ctx.optimizer_steps, ctx.batches_consumed));
                CallbackAction::Continue
            }
            fn name(&self) -> &'static str {
                "Capture"
            }
        }

        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut driver = test_driver(2);
        driver.add_callback(Capture { seen: seen.clone() });
        let mut corpus = test_corpus();
        let plan = TrainPlan::new(4, 2, 4).unwrap();

        driver.fit(&mut corpus, &plan).unwrap();
        assert_eq!(*seen.borrow(), vec![(2, 4), (4, 8)]);
    }
}
