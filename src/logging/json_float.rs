//! `f64` fields that keep NaN and infinities across a JSON round trip.
//!
//! Finite values are plain JSON numbers. Non-finite ones are written as the
//! strings `"NaN"`, `"Infinity"` and `"-Infinity"`.

use std::{collections::BTreeMap, fmt};

use serde::{
    de::{self, Visitor},
    Deserialize, Deserializer, Serialize, Serializer,
};

const NAN: &str = "NaN";
const INFINITY: &str = "Infinity";
const NEG_INFINITY: &str = "-Infinity";

/// A float as stored in a log file.
#[derive(Debug, Clone, Copy)]
pub(crate) struct JsonF64(pub f64);

impl Serialize for JsonF64 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let v = self.0;
        if v.is_nan() {
            serializer.serialize_str(NAN)
        } else if v == f64::INFINITY {
            serializer.serialize_str(INFINITY)
        } else if v == f64::NEG_INFINITY {
            serializer.serialize_str(NEG_INFINITY)
        } else {
            serializer.serialize_f64(v)
        }
    }
}

impl<'de> Deserialize<'de> for JsonF64 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(JsonF64Visitor)
    }
}

struct JsonF64Visitor;

impl<'de> Visitor<'de> for JsonF64Visitor {
    type Value = JsonF64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a number, \"{NAN}\", \"{INFINITY}\" or \"{NEG_INFINITY}\"")
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(JsonF64(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(JsonF64(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(JsonF64(v as f64))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        match v {
            NAN => Ok(JsonF64(f64::NAN)),
            INFINITY => Ok(JsonF64(f64::INFINITY)),
            NEG_INFINITY => Ok(JsonF64(f64::NEG_INFINITY)),
            other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
        }
    }
}

/// For `#[serde(with = "json_float")]` on `f64` fields.
pub(crate) fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    JsonF64(*value).serialize(serializer)
}

pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    JsonF64::deserialize(deserializer).map(|v| v.0)
}

/// For `#[serde(with = "json_float::map")]` on `BTreeMap<String, f64>` fields.
pub(crate) mod map {
    use super::*;

    pub(crate) fn serialize<S: Serializer>(
        values: &BTreeMap<String, f64>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(values.iter().map(|(k, v)| (k, JsonF64(*v))))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, f64>, D::Error> {
        let values = BTreeMap::<String, JsonF64>::deserialize(deserializer)?;
        Ok(values.into_iter().map(|(k, v)| (k, v.0)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_values_are_strings() {
        let encoded = serde_json::to_string(&[
            JsonF64(1.5),
            JsonF64(f64::NAN),
            JsonF64(f64::INFINITY),
            JsonF64(f64::NEG_INFINITY),
        ])
        .unwrap();
        assert_eq!(encoded, r#"[1.5,"NaN","Infinity","-Infinity"]"#);
    }

    #[test]
    fn decodes_numbers_and_markers() {
        let decoded: Vec<JsonF64> =
            serde_json::from_str(r#"[2, -3, 0.25, "NaN", "Infinity", "-Infinity"]"#).unwrap();
        let values: Vec<f64> = decoded.iter().map(|v| v.0).collect();

        assert_eq!(values[..3], [2.0, -3.0, 0.25]);
        assert!(values[3].is_nan());
        assert_eq!(values[4], f64::INFINITY);
        assert_eq!(values[5], f64::NEG_INFINITY);
    }

    #[test]
    fn rejects_other_strings() {
        assert!(serde_json::from_str::<JsonF64>(r#""inf""#).is_err());
    }
}
