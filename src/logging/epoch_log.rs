use std::{collections::BTreeMap, fmt, fs, marker::PhantomData, path::Path};

use serde::{
    de::{self, MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use serde_json::ser::PrettyFormatter;

use crate::error::{NeuralTrackError, Result};

const EPOCH_KEY_PREFIX: &str = "epoch_";
const INDENT: &[u8] = b"    ";

/// An in-memory log of per-epoch records.
///
/// On disk it is a JSON object whose keys are `epoch_<N>`, written in
/// ascending epoch order.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochLog<R> {
    records: BTreeMap<usize, R>,
}

impl<R> EpochLog<R> {
    /// Creates an empty `EpochLog`.
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
        }
    }

    /// Stores `record` under `epoch`, replacing any previous record for it.
    ///
    /// # Returns
    /// The replaced record, if there was one.
    pub fn insert(&mut self, epoch: usize, record: R) -> Option<R> {
        self.records.insert(epoch, record)
    }

    pub fn get(&self, epoch: usize) -> Option<&R> {
        self.records.get(&epoch)
    }

    pub fn contains(&self, epoch: usize) -> bool {
        self.records.contains_key(&epoch)
    }

    /// Returns the logged epochs in ascending order.
    pub fn epochs(&self) -> impl Iterator<Item = usize> + '_ {
        self.records.keys().copied()
    }

    /// Returns the logged records in ascending epoch order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &R)> {
        self.records.iter().map(|(epoch, record)| (*epoch, record))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<R> Default for EpochLog<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Serialize> EpochLog<R> {
    /// Overwrites the file at `path` with this whole log as pretty printed JSON.
    ///
    /// # Arguments
    /// * `path` - The destination of the log.
    ///
    /// # Errors
    /// Returns an error if the log can't be encoded or the file can't be written.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let buf = to_pretty_json(self)?;
        fs::write(path, buf)?;
        Ok(())
    }
}

impl<R: for<'de> Deserialize<'de>> EpochLog<R> {
    /// Reads a whole log from the file at `path`.
    ///
    /// # Arguments
    /// * `path` - The location of the log.
    ///
    /// # Errors
    /// `MissingLog` if there's no file at `path`, otherwise an io or decoding error.
    pub fn read_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(NeuralTrackError::MissingLog {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Builds the top level key of an epoch record.
pub fn epoch_key(epoch: usize) -> String {
    format!("{EPOCH_KEY_PREFIX}{epoch}")
}

/// Parses a top level key of the form `epoch_<N>`.
///
/// Only the form written by [`epoch_key`] is accepted: `N` is plain decimal
/// digits without a sign or leading zeros.
///
/// # Errors
/// `InvalidEpochKey` if `key` does not follow that form.
pub fn parse_epoch_key(key: &str) -> Result<usize> {
    key.strip_prefix(EPOCH_KEY_PREFIX)
        .filter(|n| is_canonical_number(n))
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| NeuralTrackError::InvalidEpochKey {
            key: key.to_string(),
        })
}

fn is_canonical_number(n: &str) -> bool {
    match n.as_bytes() {
        [] => false,
        [b'0'] => true,
        [b'0', ..] => false,
        digits => digits.iter().all(u8::is_ascii_digit),
    }
}

/// Creates a log file holding an empty record mapping if nothing exists at `path`.
pub(crate) fn ensure_log_file(path: &Path) -> Result<()> {
    if !path.exists() {
        EpochLog::<()>::new().write_to(path)?;
    }

    Ok(())
}

/// Encodes `value` as JSON indented with 4 spaces.
pub(crate) fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(INDENT);
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

impl<R: Serialize> Serialize for EpochLog<R> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.records.len()))?;
        for (epoch, record) in &self.records {
            map.serialize_entry(&epoch_key(*epoch), record)?;
        }
        map.end()
    }
}

impl<'de, R: Deserialize<'de>> Deserialize<'de> for EpochLog<R> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(EpochLogVisitor(PhantomData))
    }
}

struct EpochLogVisitor<R>(PhantomData<R>);

impl<'de, R: Deserialize<'de>> Visitor<'de> for EpochLogVisitor<R> {
    type Value = EpochLog<R>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a map keyed by `epoch_<N>`")
    }

    fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut log = EpochLog::new();
        while let Some(key) = access.next_key::<String>()? {
            let epoch = parse_epoch_key(&key).map_err(de::Error::custom)?;
            if log.contains(epoch) {
                return Err(de::Error::custom(format!("duplicate key '{key}'")));
            }
            log.insert(epoch, access.next_value()?);
        }
        Ok(log)
    }
}
