//! Append-only CSV training log

use super::traits::{CallbackAction, CallbackContext, TrainerCallback};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// Writes one `epoch,loss,accuracy` row per epoch.
///
/// The header is emitted only when the file starts empty, so interrupted
/// runs keep appending to the same log. Write failures are reported and
/// never interrupt training.
pub struct CsvLogger {
    path: PathBuf,
}

impl CsvLogger {
    /// Create a logger appending to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Log file location
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn append_row(&self, ctx: &CallbackContext) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "epoch,loss,accuracy")?;
        }
        writeln!(file, "{},{},{}", ctx.epoch, ctx.loss, ctx.accuracy)
    }
}

impl TrainerCallback for CsvLogger {
    fn on_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        if let Err(e) = self.append_row(ctx) {
            eprintln!("warning: training log write failed: {e}");
        }
        CallbackAction::Continue
    }

    fn name(&self) -> &'static str {
        "CsvLogger"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ctx(epoch: usize, loss: f32, accuracy: f32) -> CallbackContext {
        CallbackContext { epoch, loss, accuracy, ..Default::default() }
    }

    #[test]
    fn test_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("training.log");
        let mut logger = CsvLogger::new(&path);

        logger.on_epoch_end(&ctx(0, 2.5, 0.1));
        logger.on_epoch_end(&ctx(1, 2.0, 0.2));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "epoch,loss,accuracy");
        assert_eq!(lines[1], "0,2.5,0.1");
        assert_eq!(lines[2], "1,2,0.2");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_appends_across_runs_without_duplicate_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("training.log");

        CsvLogger::new(&path).on_epoch_end(&ctx(0, 1.0, 0.0));
        CsvLogger::new(&path).on_epoch_end(&ctx(1, 0.5, 0.5));

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("epoch,loss,accuracy").count(), 1);
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_write_failure_does_not_stop_training() {
        let dir = TempDir::new().unwrap();
        // The directory itself is not writable as a file.
        let mut logger = CsvLogger::new(dir.path());
        let action = logger.on_epoch_end(&ctx(0, 1.0, 0.0));
        assert_eq!(action, CallbackAction::Continue);
    }
}
