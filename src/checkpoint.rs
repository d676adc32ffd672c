//! Named-tensor snapshots and the dual-slot checkpoint manager
//!
//! A snapshot is a serde-serialized list of named tensors plus a small
//! metadata block. Two slots exist: "best", overwritten only when the
//! monitored metric strictly improves, and "latest", overwritten after every
//! epoch. The two writes are independent: a failure in one is reported and
//! the other is still attempted.

use crate::autograd::Tensor;
use crate::error::{Error, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One named tensor in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorRecord {
    /// Parameter name
    pub name: String,
    /// Flattened values
    pub data: Vec<f32>,
}

/// Training position recorded alongside the tensors
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Epoch the snapshot was taken at
    pub epoch: usize,
    /// Monitored metric value, if any
    pub metric: Option<f32>,
}

/// A complete named-tensor snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Training position
    pub metadata: SnapshotMetadata,
    /// All trainable parameters
    pub tensors: Vec<TensorRecord>,
}

/// Persist the parameters to `path` as a snapshot
pub fn save_snapshot(
    path: &Path,
    params: &[(String, Tensor)],
    metadata: SnapshotMetadata,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let snapshot = Snapshot {
        metadata,
        tensors: params
            .iter()
            .map(|(name, tensor)| TensorRecord { name: name.clone(), data: tensor.to_vec() })
            .collect(),
    };

    let json = serde_json::to_string(&snapshot)
        .map_err(|e| Error::Serialization(format!("snapshot serialization failed: {e}")))?;
    fs::write(path, json)?;
    Ok(())
}

/// Read a snapshot from `path`
pub fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let json = fs::read_to_string(path).map_err(|e| {
        Error::Checkpoint(format!("failed to read snapshot {}: {e}", path.display()))
    })?;
    serde_json::from_str(&json)
        .map_err(|e| Error::Checkpoint(format!("failed to parse snapshot {}: {e}", path.display())))
}

/// Copy snapshot values into matching parameter handles.
///
/// Every parameter must be present in the snapshot with an identical length.
pub fn restore_into(snapshot: &Snapshot, params: &[(String, Tensor)]) -> Result<()> {
    for (name, tensor) in params {
        let record = snapshot
            .tensors
            .iter()
            .find(|r| &r.name == name)
            .ok_or_else(|| Error::Checkpoint(format!("snapshot is missing tensor '{name}'")))?;
        if record.data.len() != tensor.len() {
            return Err(Error::Checkpoint(format!(
                "tensor '{name}' length mismatch: snapshot {} vs model {}",
                record.data.len(),
                tensor.len()
            )));
        }
        *tensor.data_mut() = Array1::from(record.data.clone());
    }
    Ok(())
}

/// What the manager wrote at an epoch boundary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointOutcome {
    /// The best slot was overwritten
    pub best_written: bool,
    /// The latest slot was overwritten
    pub latest_written: bool,
}

/// Dual-slot checkpoint persistence.
///
/// The monitored metric is strictly-lower-is-better. A failed best write
/// leaves the recorded best metric unchanged, so the write is retried at the
/// next improving epoch.
pub struct CheckpointManager {
    best_path: PathBuf,
    latest_path: PathBuf,
    best_metric: Option<f32>,
}

impl CheckpointManager {
    /// Create a manager writing to the two slot locations
    pub fn new(best_path: impl Into<PathBuf>, latest_path: impl Into<PathBuf>) -> Self {
        Self { best_path: best_path.into(), latest_path: latest_path.into(), best_metric: None }
    }

    /// Best metric seen so far
    #[must_use]
    pub fn best_metric(&self) -> Option<f32> {
        self.best_metric
    }

    /// Path of the best slot
    pub fn best_path(&self) -> &Path {
        &self.best_path
    }

    /// Path of the latest slot
    pub fn latest_path(&self) -> &Path {
        &self.latest_path
    }

    /// Run both persistence actions for an epoch boundary.
    ///
    /// Write failures are reported on stderr and never abort training.
    pub fn on_epoch_end(
        &mut self,
        epoch: usize,
        metric: f32,
        params: &[(String, Tensor)],
    ) -> CheckpointOutcome {
        let mut outcome = CheckpointOutcome::default();

        let improved = self.best_metric.map_or(true, |best| metric < best);
        if improved {
            let metadata = SnapshotMetadata { epoch, metric: Some(metric) };
            match save_snapshot(&self.best_path, params, metadata) {
                Ok(()) => {
                    self.best_metric = Some(metric);
                    outcome.best_written = true;
                }
                Err(e) => eprintln!("warning: best checkpoint write failed: {e}"),
            }
        }

        let metadata = SnapshotMetadata { epoch, metric: Some(metric) };
        match save_snapshot(&self.latest_path, params, metadata) {
            Ok(()) => outcome.latest_written = true,
            Err(e) => eprintln!("warning: latest checkpoint write failed: {e}"),
        }

        outcome
    }
}
