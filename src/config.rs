//! Declarative pretraining configuration
//!
//! One immutable structure holds every value the controller consumes, loaded
//! from a YAML or JSON file and validated before any training state is
//! built. There are no process-wide mutable globals: each component receives
//! the values it needs at construction.

use crate::error::{Error, Result};
use crate::optim::{OptimizerVariant, PiecewiseLinearSchedule};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete pretraining specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PretrainConfig {
    /// Corpus location and batching
    pub data: CorpusSection,
    /// Backbone parameters
    pub model: ModelSection,
    /// Update-rule composition
    pub optimizer: OptimizerSection,
    /// Step accounting
    pub training: TrainingSection,
    /// Execution strategy
    #[serde(default)]
    pub distribution: DistributionSection,
    /// Checkpoint slot locations
    pub checkpoint: CheckpointSection,
}

/// Corpus location and batching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusSection {
    /// Explicit shard files
    #[serde(default)]
    pub shard_paths: Vec<PathBuf>,
    /// Shard path pattern containing `{i}`, expanded with `shard_count`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_pattern: Option<String>,
    /// Number of shards the pattern expands to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_count: Option<usize>,
    /// Tokens per sequence
    pub sequence_length: usize,
    /// Effective batch size; micro-batches are this divided by the
    /// accumulation factor
    pub batch_size: usize,
    /// Probability a position is selected for prediction
    #[serde(default = "default_mask_prob")]
    pub mask_prob: f32,
    /// Mask token; defaults to the last vocabulary id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_token_id: Option<u32>,
    /// Masking and shuffle seed
    #[serde(default = "default_seed")]
    pub seed: u64,
}

/// Backbone parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSection {
    /// Vocabulary size
    pub vocab_size: usize,
    /// Snapshot to initialize weights from, if training continues from a
    /// pretrained state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_weights: Option<PathBuf>,
}

/// One `(step, value)` schedule anchor, in batch units
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScheduleAnchor {
    /// Step the anchor sits at
    pub step: u64,
    /// Multiplier value at the anchor
    pub value: f32,
}

/// Update-rule composition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerSection {
    /// Which rule drives updates
    #[serde(default)]
    pub variant: OptimizerVariant,
    /// Base learning rate
    pub learning_rate: f32,
    /// Weight decay rate
    #[serde(default)]
    pub weight_decay_rate: f32,
    /// Name patterns exempt from decay
    #[serde(default = "default_exclusions")]
    pub exclude_from_weight_decay: Vec<String>,
    /// First-moment coefficient
    #[serde(default = "default_beta1")]
    pub beta1: f32,
    /// Second-moment coefficient
    #[serde(default = "default_beta2")]
    pub beta2: f32,
    /// Denominator stabilizer
    #[serde(default = "default_epsilon")]
    pub epsilon: f32,
    /// Whether the base rule applies moment bias correction
    #[serde(default)]
    pub bias_correction: bool,
    /// Explicit schedule anchors; derived from warmup/total counts when
    /// absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lr_schedule: Option<Vec<ScheduleAnchor>>,
}

/// Step accounting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSection {
    /// Total optimizer updates
    pub num_train_steps: u64,
    /// Warmup length in optimizer updates
    pub num_warmup_steps: u64,
    /// Batches per epoch
    pub steps_per_epoch: u64,
    /// Batches contributing to each update
    #[serde(default = "default_one")]
    pub grad_accum_steps: u64,
    /// Training log location
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
}

/// Execution strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionSection {
    /// Cluster coordinator address; absent means single-host execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinator: Option<String>,
    /// Replica count
    #[serde(default = "default_one_usize")]
    pub replicas: usize,
}

impl Default for DistributionSection {
    fn default() -> Self {
        Self { coordinator: None, replicas: 1 }
    }
}

/// Checkpoint slot locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSection {
    /// Best-weights slot
    pub best_path: PathBuf,
    /// Latest-weights slot
    pub latest_path: PathBuf,
}

fn default_mask_prob() -> f32 {
    0.15
}

fn default_seed() -> u64 {
    42
}

fn default_exclusions() -> Vec<String> {
    vec!["Norm".to_string(), "bias".to_string()]
}

fn default_beta1() -> f32 {
    0.9
}

fn default_beta2() -> f32 {
    0.999
}

fn default_epsilon() -> f32 {
    1e-8
}

fn default_one() -> u64 {
    1
}

fn default_one_usize() -> usize {
    1
}

fn default_log_path() -> PathBuf {
    PathBuf::from("training.log")
}

impl PretrainConfig {
    /// Load a configuration file, dispatching on the extension: `.yaml` /
    /// `.yml` parse as YAML, anything else as JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let config: PretrainConfig = if is_yaml {
            serde_yaml::from_str(&content)
                .map_err(|e| Error::Config(format!("failed to parse YAML config: {e}")))?
        } else {
            serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("failed to parse JSON config: {e}")))?
        };
        Ok(config)
    }

    /// Fail fast on any value the controller cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.data.sequence_length == 0 {
            return Err(Error::Config("sequence length must be positive".into()));
        }
        if self.data.batch_size == 0 {
            return Err(Error::Config("batch size must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.data.mask_prob) {
            return Err(Error::Config(format!(
                "mask probability must lie in [0, 1], got {}",
                self.data.mask_prob
            )));
        }
        if self.model.vocab_size < 2 {
            return Err(Error::Config("vocabulary must hold at least two tokens".into()));
        }
        if self.training.grad_accum_steps == 0 {
            return Err(Error::Config("gradient accumulation factor must be positive".into()));
        }
        if self.training.num_train_steps == 0 || self.training.steps_per_epoch == 0 {
            return Err(Error::Config("step counts must be positive".into()));
        }
        if self.distribution.replicas == 0 {
            return Err(Error::Config("replica count must be positive".into()));
        }
        if self.optimizer.exclude_from_weight_decay.iter().any(String::is_empty) {
            return Err(Error::Config("empty weight-decay exclusion pattern".into()));
        }
        // Schedule anchors must form a valid piecewise-linear shape.
        PiecewiseLinearSchedule::new(self.schedule_anchors())?;
        self.shard_locations()?;
        Ok(())
    }

    /// Resolve the shard file list: explicit paths, or the pattern expanded
    /// with the shard count.
    pub fn shard_locations(&self) -> Result<Vec<PathBuf>> {
        if !self.data.shard_paths.is_empty() {
            return Ok(self.data.shard_paths.clone());
        }
        match (&self.data.shard_pattern, self.data.shard_count) {
            (Some(pattern), Some(count)) if count > 0 => {
                if !pattern.contains("{i}") {
                    return Err(Error::Config(format!(
                        "shard pattern '{pattern}' is missing the {{i}} placeholder"
                    )));
                }
                Ok((0..count)
                    .map(|i| PathBuf::from(pattern.replace("{i}", &i.to_string())))
                    .collect())
            }
            _ => Err(Error::Config(
                "corpus needs shard_paths, or shard_pattern with a positive shard_count".into(),
            )),
        }
    }

    /// Schedule anchors in batch units: explicit anchors when configured,
    /// otherwise the warmup/decay shape derived from the step counts. The
    /// warmup and total counts are optimizer-update units and are scaled by
    /// the accumulation factor here.
    pub fn schedule_anchors(&self) -> Vec<(u64, f32)> {
        if let Some(anchors) = &self.optimizer.lr_schedule {
            return anchors.iter().map(|a| (a.step, a.value)).collect();
        }
        let scale = self.training.grad_accum_steps;
        vec![
            (self.training.num_warmup_steps * scale, 1.0),
            (self.training.num_train_steps * scale, 0.0),
        ]
    }

    /// Micro-batch size fed to the corpus reader: the effective batch size
    /// divided by the accumulation factor.
    pub fn micro_batch_size(&self) -> usize {
        (self.data.batch_size / self.training.grad_accum_steps as usize).max(1)
    }

    /// Mask token id, defaulting to the last vocabulary entry
    pub fn mask_token_id(&self) -> u32 {
        self.data.mask_token_id.unwrap_or(self.model.vocab_size as u32 - 1)
    }
}
