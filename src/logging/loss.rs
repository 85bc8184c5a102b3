use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Instant,
};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::{
    epoch_log::{ensure_log_file, to_pretty_json, EpochLog},
    persist::{BackgroundWriter, PersistHandle},
};
use crate::error::{NeuralTrackError, Result};

pub const DEFAULT_LOSS_LOG_PATH: &str = "loss_log.json";

/// Averaged losses of a single epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochLossRecord {
    /// Seconds since the epoch was started.
    pub time_for_epoch: f64,
    /// Seconds since the logger was created.
    pub total_time_elapsed: f64,
    /// Per-epoch average of every loss component reported during the epoch.
    #[serde(flatten, with = "super::json_float::map")]
    pub components: BTreeMap<String, f64>,
}

/// Running sums of the loss components reported during one epoch.
#[derive(Debug, Clone, Default)]
pub struct EpochAccumulator {
    started_at: Option<Instant>,
    sums: BTreeMap<String, f64>,
    batch_count: usize,
}

impl EpochAccumulator {
    /// Creates an accumulator for an epoch starting right now.
    pub fn started() -> Self {
        let mut acc = Self::default();
        acc.start();
        acc
    }

    /// Marks the start of a new epoch, discarding every running sum.
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
        self.sums.clear();
        self.batch_count = 0;
    }

    /// Adds the losses of one batch.
    ///
    /// A component seen for the first time starts from zero.
    ///
    /// # Arguments
    /// * `losses` - The batch's losses keyed by component name, already reduced to scalars.
    pub fn add_batch<I, K, V>(&mut self, losses: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<f64>,
    {
        self.batch_count += 1;
        for (name, value) in losses {
            let name = name.as_ref();
            let value = value.into();
            match self.sums.get_mut(name) {
                Some(sum) => *sum += value,
                None => {
                    self.sums.insert(name.to_string(), value);
                }
            }
        }
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn batch_count(&self) -> usize {
        self.batch_count
    }

    /// Computes every component's running sum divided by the epoch's total batch count.
    ///
    /// A component missing from some batches is still divided by the total count.
    ///
    /// # Returns
    /// The averages or `None` if no batch was added.
    pub fn averages(&self) -> Option<BTreeMap<String, f64>> {
        if self.batch_count == 0 {
            return None;
        }

        let batches = self.batch_count as f64;
        let averages = self
            .sums
            .iter()
            .map(|(name, sum)| (name.clone(), sum / batches))
            .collect();

        Some(averages)
    }

    /// Builds the record of this epoch.
    ///
    /// # Arguments
    /// * `epoch` - The epoch being closed.
    /// * `origin` - The instant the time since the start of training is measured from.
    ///
    /// # Errors
    /// `EpochNotStarted` if `start` was never called, `EmptyEpoch` if no batch was added.
    pub fn to_record(&self, epoch: usize, origin: Instant) -> Result<EpochLossRecord> {
        let started_at = self.started_at.ok_or(NeuralTrackError::EpochNotStarted)?;
        let components = self
            .averages()
            .ok_or(NeuralTrackError::EmptyEpoch { epoch })?;

        let now = Instant::now();
        Ok(EpochLossRecord {
            time_for_epoch: now.duration_since(started_at).as_secs_f64(),
            total_time_elapsed: now.duration_since(origin).as_secs_f64(),
            components,
        })
    }
}

/// Accumulates batch losses over each epoch and persists per-epoch averages.
///
/// Each logged epoch triggers a background write of the whole log, so the
/// training loop never waits on the file system. Call [`LossLogger::flush`]
/// once training is done to make sure the file holds the final log.
#[derive(Debug)]
pub struct LossLogger {
    created_at: Instant,
    loss_data: EpochLog<EpochLossRecord>,
    epoch: EpochAccumulator,
    writer: BackgroundWriter,
}

impl LossLogger {
    /// Creates a new `LossLogger`.
    ///
    /// # Arguments
    /// * `log_path` - Where the log is persisted, an empty log is created there if missing.
    ///
    /// # Errors
    /// Returns an io error if the log file can't be created.
    pub fn new(log_path: impl Into<PathBuf>) -> Result<Self> {
        let log_path = log_path.into();
        ensure_log_file(&log_path)?;
        info!("logging losses to '{}'", log_path.display());

        Ok(Self {
            created_at: Instant::now(),
            loss_data: EpochLog::new(),
            epoch: EpochAccumulator::default(),
            writer: BackgroundWriter::new(log_path)?,
        })
    }

    /// The log path used when none is given, `loss_log.json` in the working directory.
    pub fn default_path() -> PathBuf {
        PathBuf::from(DEFAULT_LOSS_LOG_PATH)
    }

    pub fn log_path(&self) -> &Path {
        self.writer.path()
    }

    /// Marks the start of an epoch and resets the running sums.
    pub fn start_epoch(&mut self) {
        self.epoch.start();
    }

    /// Adds the losses of one batch to the current epoch.
    ///
    /// # Arguments
    /// * `losses` - The batch's losses keyed by component name, already reduced to scalars.
    pub fn add_batch_loss<I, K, V>(&mut self, losses: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<f64>,
    {
        self.epoch.add_batch(losses);
    }

    /// Logs the averaged losses of the current epoch and persists the log in the background.
    ///
    /// Logging the same epoch twice replaces its record.
    ///
    /// # Arguments
    /// * `epoch` - The epoch being logged.
    ///
    /// # Returns
    /// The completion signal of the background persist, it may be dropped.
    ///
    /// # Errors
    /// `EpochNotStarted` or `EmptyEpoch`, in which case neither the log nor the file is touched.
    pub fn log_epoch_loss(&mut self, epoch: usize) -> Result<PersistHandle> {
        let record = self.epoch.to_record(epoch, self.created_at)?;
        self.commit(epoch, record)
    }

    /// Logs the averaged losses held by an externally owned accumulator.
    ///
    /// # Arguments
    /// * `epoch` - The epoch being logged.
    /// * `accumulator` - The epoch's running sums.
    ///
    /// # Returns
    /// The completion signal of the background persist.
    ///
    /// # Errors
    /// Same as [`LossLogger::log_epoch_loss`].
    pub fn log_accumulated(
        &mut self,
        epoch: usize,
        accumulator: &EpochAccumulator,
    ) -> Result<PersistHandle> {
        let record = accumulator.to_record(epoch, self.created_at)?;
        self.commit(epoch, record)
    }

    /// Returns the in-memory log, which may be ahead of the file.
    pub fn get_log_data(&self) -> &EpochLog<EpochLossRecord> {
        &self.loss_data
    }

    /// Writes the current log synchronously, superseding every pending background write.
    ///
    /// # Errors
    /// Returns an error if the log can't be encoded or written.
    pub fn flush(&mut self) -> Result<()> {
        let snapshot = to_pretty_json(&self.loss_data)?;
        self.writer.write_now(&snapshot)
    }

    fn commit(&mut self, epoch: usize, record: EpochLossRecord) -> Result<PersistHandle> {
        debug!(
            "epoch {epoch} took {:.3}s: {:?}",
            record.time_for_epoch, record.components
        );

        self.loss_data.insert(epoch, record);
        let snapshot = to_pretty_json(&self.loss_data)?;
        Ok(self.writer.dispatch(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_divide_by_total_batch_count() {
        let mut acc = EpochAccumulator::started();
        acc.add_batch([("mse", 4.0), ("l1", 3.0)]);
        acc.add_batch([("mse", 6.0)]);

        let averages = acc.averages().unwrap();
        assert_eq!(averages["mse"], 5.0);
        assert_eq!(averages["l1"], 1.5);
        assert_eq!(acc.batch_count(), 2);
    }

    #[test]
    fn start_discards_previous_sums() {
        let mut acc = EpochAccumulator::started();
        acc.add_batch([("mse", 10.0_f32)]);
        acc.start();
        acc.add_batch([("ce", 1.0_f32)]);

        let averages = acc.averages().unwrap();
        assert_eq!(averages.len(), 1);
        assert_eq!(averages["ce"], 1.0);
    }

    #[test]
    fn record_requires_a_started_epoch() {
        let mut acc = EpochAccumulator::default();
        acc.add_batch([("mse", 1.0)]);

        let err = acc.to_record(0, Instant::now()).unwrap_err();
        assert!(matches!(err, NeuralTrackError::EpochNotStarted));
    }

    #[test]
    fn record_requires_at_least_one_batch() {
        let acc = EpochAccumulator::started();

        let err = acc.to_record(3, Instant::now()).unwrap_err();
        assert!(matches!(err, NeuralTrackError::EmptyEpoch { epoch: 3 }));
    }

    #[test]
    fn default_log_path() {
        assert_eq!(LossLogger::default_path(), PathBuf::from("loss_log.json"));
    }

    #[test]
    fn record_serializes_components_next_to_timings() {
        let record = EpochLossRecord {
            time_for_epoch: 1.0,
            total_time_elapsed: 2.0,
            components: BTreeMap::from([("mse".to_string(), 0.5)]),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"time_for_epoch": 1.0, "total_time_elapsed": 2.0, "mse": 0.5})
        );
    }
}
