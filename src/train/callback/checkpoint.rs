//! Dual-slot checkpoint callback

use super::traits::{CallbackAction, CallbackContext, TrainerCallback};
use crate::autograd::Tensor;
use crate::checkpoint::CheckpointManager;
use std::path::PathBuf;

/// Persists the best and latest snapshots at every epoch boundary.
///
/// Holds shared handles to the trainable parameters, so the snapshot always
/// reflects the state the epoch ended with. The monitored metric is the
/// epoch's masked loss.
pub struct DualCheckpointCallback {
    manager: CheckpointManager,
    params: Vec<(String, Tensor)>,
}

impl DualCheckpointCallback {
    /// Create a callback writing to the two slot locations
    pub fn new(
        best_path: impl Into<PathBuf>,
        latest_path: impl Into<PathBuf>,
        params: Vec<(String, Tensor)>,
    ) -> Self {
        Self { manager: CheckpointManager::new(best_path, latest_path), params }
    }

    /// The underlying slot manager
    pub fn manager(&self) -> &CheckpointManager {
        &self.manager
    }
}

impl TrainerCallback for DualCheckpointCallback {
    fn on_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        self.manager.on_epoch_end(ctx.epoch, ctx.loss, &self.params);
        CallbackAction::Continue
    }

    fn name(&self) -> &'static str {
        "DualCheckpointCallback"
    }
}
