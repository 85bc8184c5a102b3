use std::{
    fmt,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use serde::{
    de::{self, MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};

use super::epoch_log::{ensure_log_file, EpochLog};
use crate::error::Result;

pub const DEFAULT_GRADIENT_LOG_PATH: &str = "gradient_log.json";
pub const DEFAULT_LOG_INTERVAL: usize = 10;

const WEIGHT_SUFFIX: &str = ".weight";
const BIAS_SUFFIX: &str = ".bias";

/// Summary of a parameter's gradient at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientStats {
    #[serde(with = "super::json_float")]
    pub mean: f64,
    #[serde(with = "super::json_float")]
    pub median: f64,
    #[serde(with = "super::json_float")]
    pub max: f64,
    #[serde(with = "super::json_float")]
    pub min: f64,
}

impl GradientStats {
    /// Summarizes a flattened gradient.
    ///
    /// # Returns
    /// The statistics or `None` if `values` is empty.
    pub fn from_values(values: &[f32]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut sorted: Vec<f64> = values.iter().map(|&v| v as f64).collect();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };

        Some(Self {
            mean,
            median,
            max: sorted[n - 1],
            min: sorted[0],
        })
    }
}

/// Gradient statistics of every layer in one epoch, in the model's parameter order.
///
/// Serialized as a JSON object keyed by layer display name, keys keep the
/// insertion order both ways.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpochGradientRecord {
    layers: Vec<(String, GradientStats)>,
}

impl EpochGradientRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the statistics of `layer`.
    ///
    /// A layer that is already present keeps its position.
    ///
    /// # Returns
    /// The statistics previously stored for `layer`.
    pub fn insert(
        &mut self,
        layer: impl Into<String>,
        stats: GradientStats,
    ) -> Option<GradientStats> {
        let layer = layer.into();
        match self.layers.iter_mut().find(|(name, _)| *name == layer) {
            Some((_, old)) => Some(std::mem::replace(old, stats)),
            None => {
                self.layers.push((layer, stats));
                None
            }
        }
    }

    pub fn get(&self, layer: &str) -> Option<&GradientStats> {
        self.layers
            .iter()
            .find(|(name, _)| name == layer)
            .map(|(_, stats)| stats)
    }

    /// Returns the layer display names in order.
    pub fn layers(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &GradientStats)> {
        self.layers.iter().map(|(name, stats)| (name.as_str(), stats))
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, GradientStats)> for EpochGradientRecord {
    fn from_iter<I: IntoIterator<Item = (S, GradientStats)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (layer, stats) in iter {
            record.insert(layer, stats);
        }
        record
    }
}

impl Serialize for EpochGradientRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.layers.len()))?;
        for (layer, stats) in &self.layers {
            map.serialize_entry(layer, stats)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EpochGradientRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(EpochGradientRecordVisitor)
    }
}

struct EpochGradientRecordVisitor;

impl<'de> Visitor<'de> for EpochGradientRecordVisitor {
    type Value = EpochGradientRecord;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of layer names to gradient statistics")
    }

    fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut record = EpochGradientRecord::new();
        while let Some(layer) = access.next_key::<String>()? {
            if record.get(&layer).is_some() {
                return Err(de::Error::custom(format!("duplicate layer '{layer}'")));
            }
            let stats = access.next_value()?;
            record.layers.push((layer, stats));
        }
        Ok(record)
    }
}

/// A trainable parameter as exposed by a model.
#[derive(Debug, Clone, Copy)]
pub struct NamedParameter<'a> {
    /// Qualified name, e.g. `encoder.fc1.weight`.
    pub name: &'a str,
    /// The flattened gradient, `None` if it was never populated.
    pub grad: Option<&'a [f32]>,
}

/// Read-only access to a model's parameters and their gradients.
pub trait ParameterSource {
    /// Returns every trainable parameter in the model's order.
    fn named_parameters(&self) -> Vec<NamedParameter<'_>>;
}

impl<S: AsRef<str>> ParameterSource for [(S, Option<Vec<f32>>)] {
    fn named_parameters(&self) -> Vec<NamedParameter<'_>> {
        self.iter()
            .map(|(name, grad)| NamedParameter {
                name: name.as_ref(),
                grad: grad.as_deref(),
            })
            .collect()
    }
}

impl<S: AsRef<str>> ParameterSource for Vec<(S, Option<Vec<f32>>)> {
    fn named_parameters(&self) -> Vec<NamedParameter<'_>> {
        self.as_slice().named_parameters()
    }
}

/// Derives the layer display name of a parameter.
///
/// `fc1.weight` becomes `fc1` and `fc1.bias` becomes `fc1 (bias)`, any
/// other name is kept as is.
pub fn layer_display_name(param_name: &str) -> String {
    if let Some(layer) = param_name.strip_suffix(WEIGHT_SUFFIX) {
        layer.to_string()
    } else if let Some(layer) = param_name.strip_suffix(BIAS_SUFFIX) {
        format!("{layer} (bias)")
    } else {
        param_name.to_string()
    }
}

#[derive(Debug, Clone)]
pub struct GradientLoggerConfig {
    pub log_path: PathBuf,
    /// Gradients are only snapshot on epochs that are a multiple of this.
    pub log_interval: NonZeroUsize,
}

impl Default for GradientLoggerConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from(DEFAULT_GRADIENT_LOG_PATH),
            log_interval: NonZeroUsize::new(DEFAULT_LOG_INTERVAL).expect("non zero constant"),
        }
    }
}

/// Periodically snapshots per-layer gradient statistics and persists them synchronously.
#[derive(Debug)]
pub struct GradientLogger {
    config: GradientLoggerConfig,
    grad_data: EpochLog<EpochGradientRecord>,
}

impl GradientLogger {
    /// Creates a new `GradientLogger`.
    ///
    /// # Arguments
    /// * `log_path` - Where the log is persisted, an empty log is created there if missing.
    /// * `log_interval` - The epoch cadence of the snapshots.
    ///
    /// # Errors
    /// Returns an io error if the log file can't be created.
    pub fn new(log_path: impl Into<PathBuf>, log_interval: NonZeroUsize) -> Result<Self> {
        Self::with_config(GradientLoggerConfig {
            log_path: log_path.into(),
            log_interval,
        })
    }

    /// Creates a new `GradientLogger` from a full configuration.
    ///
    /// # Errors
    /// Returns an io error if the log file can't be created.
    pub fn with_config(config: GradientLoggerConfig) -> Result<Self> {
        ensure_log_file(&config.log_path)?;
        info!(
            "logging gradients to '{}' every {} epoch(s)",
            config.log_path.display(),
            config.log_interval
        );

        Ok(Self {
            config,
            grad_data: EpochLog::new(),
        })
    }

    pub fn log_path(&self) -> &Path {
        &self.config.log_path
    }

    pub fn log_interval(&self) -> usize {
        self.config.log_interval.get()
    }

    /// Snapshots the gradients of `source` and overwrites the log file, only on logging epochs.
    ///
    /// Parameters without a gradient or with an empty one are left out.
    ///
    /// # Arguments
    /// * `epoch` - The current epoch.
    /// * `source` - The model holding the gradients.
    ///
    /// # Returns
    /// Whether a snapshot was taken.
    ///
    /// # Errors
    /// Returns an error if the log can't be encoded or written.
    pub fn log_gradients<P>(&mut self, epoch: usize, source: &P) -> Result<bool>
    where
        P: ParameterSource + ?Sized,
    {
        if epoch % self.log_interval() != 0 {
            return Ok(false);
        }

        let mut record = EpochGradientRecord::new();
        for param in source.named_parameters() {
            let Some(grad) = param.grad else {
                continue;
            };

            let Some(stats) = GradientStats::from_values(grad) else {
                warn!("skipping '{}', its gradient is empty", param.name);
                continue;
            };

            record.insert(layer_display_name(param.name), stats);
        }

        debug!("epoch {epoch}: gradient stats for {} layer(s)", record.len());
        self.grad_data.insert(epoch, record);
        self.grad_data.write_to(&self.config.log_path)?;
        Ok(true)
    }

    pub fn get_gradient_data(&self) -> &EpochLog<EpochGradientRecord> {
        &self.grad_data
    }
}
