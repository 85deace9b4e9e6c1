//! JSON-safe floats.
//!
//! JSON has no encoding for infinities or NaN and `serde_json` writes them
//! as `null`, which cannot be read back into an `f64`. Fitness values and
//! statistics hit those routinely (a failed evaluation scores infinity, the
//! deviation of infinite scores is NaN), and float constants inside trees
//! can hold them too, so they all go through these adapters:
//! finite values stay plain numbers, the rest become `"inf"`, `"-inf"` or
//! `"nan"`.

use crate::gp::statistics::Record;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Repr {
    Number(f64),
    Tag(String),
}

impl From<f64> for Repr {
    fn from(x: f64) -> Self {
        if x.is_finite() {
            Self::Number(x)
        } else if x.is_nan() {
            Self::Tag("nan".to_owned())
        } else if x > 0.0 {
            Self::Tag("inf".to_owned())
        } else {
            Self::Tag("-inf".to_owned())
        }
    }
}

impl Repr {
    fn into_f64<E: serde::de::Error>(self) -> Result<f64, E> {
        match self {
            Self::Number(x) => Ok(x),
            Self::Tag(tag) => match tag.as_str() {
                "nan" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(E::custom(format!("unknown float tag `{other}`"))),
            },
        }
    }
}

/// `#[serde(with = "float_repr::scalar")]` for a single `f64`.
pub(crate) mod scalar {
    use super::{Deserialize, Deserializer, Repr, Serialize, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub(crate) fn serialize<S: Serializer>(x: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        Repr::from(*x).serialize(serializer)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Repr::deserialize(deserializer)?.into_f64()
    }
}

/// `#[serde(with = "float_repr::vec")]` for `Vec<f64>`.
pub(crate) mod vec {
    use super::{Deserialize, Deserializer, Repr, Serializer};
    use serde::ser::SerializeSeq;

    pub(crate) fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for &x in values {
            seq.serialize_element(&Repr::from(x))?;
        }
        seq.end()
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        Vec::<Repr>::deserialize(deserializer)?
            .into_iter()
            .map(Repr::into_f64)
            .collect()
    }
}

/// `#[serde(with = "float_repr::record")]` for a statistics [`Record`].
pub(crate) mod record {
    use super::{BTreeMap, Deserialize, Deserializer, Record, Repr, Serialize, Serializer};

    pub(crate) fn serialize<S: Serializer>(record: &Record, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded: BTreeMap<&str, BTreeMap<&str, Repr>> = record
            .iter()
            .map(|(metric, row)| {
                let row = row.iter().map(|(k, &v)| (k.as_str(), Repr::from(v))).collect();
                (metric.as_str(), row)
            })
            .collect();
        encoded.serialize(serializer)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Record, D::Error> {
        let encoded = BTreeMap::<String, BTreeMap<String, Repr>>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|(metric, row)| {
                let row = row
                    .into_iter()
                    .map(|(k, v)| v.into_f64().map(|v| (k, v)))
                    .collect::<Result<BTreeMap<_, _>, _>>()?;
                Ok((metric, row))
            })
            .collect()
    }
}
