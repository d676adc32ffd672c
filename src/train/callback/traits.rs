//! Core traits and types for the callback system

/// Training state passed to callbacks at lifecycle points
#[derive(Clone, Debug, Default)]
pub struct CallbackContext {
    /// Completed epoch index (0-based)
    pub epoch: usize,
    /// Total epochs planned
    pub max_epochs: usize,
    /// Mean masked loss over the epoch
    pub loss: f32,
    /// Mean masked accuracy over the epoch
    pub accuracy: f32,
    /// Effective learning rate after the epoch's last update
    pub lr: f32,
    /// Optimizer updates applied so far
    pub optimizer_steps: u64,
    /// Batches consumed so far
    pub batches_consumed: u64,
    /// Best epoch loss seen so far
    pub best_loss: Option<f32>,
}

/// Action requested by a callback
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    /// Continue training normally
    Continue,
    /// Stop training after this epoch
    Stop,
}

/// Hooks into training events.
///
/// All methods default to no-ops; implement only the events you care about.
pub trait TrainerCallback {
    /// Called once before the first epoch
    fn on_train_begin(&mut self, _ctx: &CallbackContext) {}

    /// Called after each epoch with its aggregated signals
    fn on_epoch_end(&mut self, _ctx: &CallbackContext) -> CallbackAction {
        CallbackAction::Continue
    }

    /// Called once after the last epoch
    fn on_train_end(&mut self, _ctx: &CallbackContext) {}

    /// Callback name for reporting
    fn name(&self) -> &'static str {
        "TrainerCallback"
    }
}
