//! Metric values with an explicit "insufficient data" state.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Literal used for undefined values in serialized output.
pub const UNDEFINED: &str = "undefined";

/// A computed metric: a number, or undefined when the denominator was zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Defined(f64),
    Undefined,
}

impl MetricValue {
    /// Returns the number, if defined.
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Defined(v) => Some(*v),
            Self::Undefined => None,
        }
    }

    /// Returns true if the value is defined.
    pub fn is_defined(&self) -> bool {
        matches!(self, Self::Defined(_))
    }

    /// `self - other`, undefined if either side is.
    pub fn minus(self, other: Self) -> Self {
        match (self, other) {
            (Self::Defined(a), Self::Defined(b)) => Self::Defined(a - b),
            _ => Self::Undefined,
        }
    }
}

impl From<Option<f64>> for MetricValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Undefined, Self::Defined)
    }
}

/// `numerator / denominator`, or [`MetricValue::Undefined`] when the
/// denominator is zero.
pub fn ratio(numerator: f64, denominator: f64) -> MetricValue {
    if denominator == 0.0 {
        MetricValue::Undefined
    } else {
        MetricValue::Defined(numerator / denominator)
    }
}

/// Arithmetic mean, undefined for an empty input.
pub fn mean(values: impl IntoIterator<Item = f64>) -> MetricValue {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    ratio(sum, count as f64)
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defined(v) => write!(f, "{v}"),
            Self::Undefined => f.write_str(UNDEFINED),
        }
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Defined(v) => serializer.serialize_f64(*v),
            Self::Undefined => serializer.serialize_str(UNDEFINED),
        }
    }
}

impl<'de> Deserialize<'de> for MetricValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MetricValueVisitor;

        impl Visitor<'_> for MetricValueVisitor {
            type Value = MetricValue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a number or the string \"{UNDEFINED}\"")
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                Ok(MetricValue::Defined(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(MetricValue::Defined(v as f64))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(MetricValue::Defined(v as f64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                if v == UNDEFINED {
                    Ok(MetricValue::Undefined)
                } else {
                    v.parse::<f64>()
                        .map(MetricValue::Defined)
                        .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
                }
            }
        }

        deserializer.deserialize_any(MetricValueVisitor)
    }
}
