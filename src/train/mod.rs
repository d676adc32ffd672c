//! Training driver, metrics, and callbacks
//!
//! The driver owns the batch loop and the epoch accounting; everything that
//! happens at an epoch boundary (checkpointing, the CSV training log,
//! progress output) is a plain callback registered with the driver.

pub mod callback;
mod driver;
mod metrics;

pub use callback::{
    CallbackAction, CallbackContext, CallbackManager, CsvLogger, DualCheckpointCallback,
    ProgressCallback, TrainerCallback,
};
pub use driver::{PretrainDriver, TrainPlan, TrainSummary};
pub use metrics::MetricsTracker;
