//! Quantizer Module
//!
//! Lossy compression of cached documents. Every flat numeric array inside a
//! JSON value is re-encoded at reduced width (int8 with a per-array scale and
//! offset, or IEEE half precision); everything else passes through unchanged.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use half::f16;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use thiserror::Error;

/// Shortest numeric array worth quantizing.
pub const MIN_QUANTIZABLE_LEN: usize = 4;

/// Bytes charged for the scale and offset of an int8 array.
const INT8_HEADER_BYTES: usize = 16;

/// Bytes charged for the length header of a float16 array.
const FLOAT16_HEADER_BYTES: usize = 4;

#[derive(Error, Debug, PartialEq)]
pub enum QuantizationError {
    #[error("value contains no numeric array of at least {MIN_QUANTIZABLE_LEN} elements")]
    UnsupportedShape,

    #[error("quantized size {stored} is not below raw size {raw}")]
    NoSizeBenefit { raw: usize, stored: usize },

    #[error("quantization type is none")]
    Disabled,
}

// == Quantization Type ==
/// Encoding applied to numeric arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantizationType {
    /// 8-bit linear quantization with per-array scale and offset.
    Int8,
    /// IEEE 754 half precision.
    Float16,
    /// Store raw.
    None,
}

impl fmt::Display for QuantizationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuantizationType::Int8 => write!(f, "int8"),
            QuantizationType::Float16 => write!(f, "float16"),
            QuantizationType::None => write!(f, "none"),
        }
    }
}

impl FromStr for QuantizationType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "int8" => Ok(QuantizationType::Int8),
            "float16" | "fp16" => Ok(QuantizationType::Float16),
            "none" => Ok(QuantizationType::None),
            other => Err(format!("unknown quantization type: {other}")),
        }
    }
}

// == Quantized Node ==
/// A JSON document with its numeric arrays re-encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum QuantizedNode {
    /// Scalars and anything else stored verbatim.
    Plain(Value),
    Array(Vec<QuantizedNode>),
    Object(BTreeMap<String, QuantizedNode>),
    /// `v ≈ (q + 128) × scale + offset`
    Int8 { scale: f64, offset: f64, data: Vec<i8> },
    Float16(Vec<f16>),
}

impl QuantizedNode {
    /// Bytes this node is charged against the memory ceiling.
    ///
    /// Plain nodes cost their compact JSON length, containers add their
    /// brackets and separators, quantized arrays cost their packed width.
    pub fn stored_size(&self) -> usize {
        match self {
            QuantizedNode::Plain(value) => json_len(value),
            QuantizedNode::Array(items) => {
                2 + items.iter().map(QuantizedNode::stored_size).sum::<usize>()
                    + items.len().saturating_sub(1)
            }
            QuantizedNode::Object(fields) => {
                2 + fields
                    .iter()
                    .map(|(key, node)| key.len() + 3 + node.stored_size())
                    .sum::<usize>()
                    + fields.len().saturating_sub(1)
            }
            QuantizedNode::Int8 { data, .. } => data.len() + INT8_HEADER_BYTES,
            QuantizedNode::Float16(data) => data.len() * 2 + FLOAT16_HEADER_BYTES,
        }
    }

    /// Rebuilds the JSON document.
    pub fn to_value(&self) -> Value {
        match self {
            QuantizedNode::Plain(value) => value.clone(),
            QuantizedNode::Array(items) => {
                Value::Array(items.iter().map(QuantizedNode::to_value).collect())
            }
            QuantizedNode::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, node)| (key.clone(), node.to_value()))
                    .collect(),
            ),
            QuantizedNode::Int8 {
                scale,
                offset,
                data,
            } => Value::Array(
                data.iter()
                    .map(|&q| {
                        let v = (q as f64 + 128.0) * scale + offset;
                        number(v.clamp(f64::MIN, f64::MAX))
                    })
                    .collect(),
            ),
            QuantizedNode::Float16(data) => {
                Value::Array(data.iter().map(|h| number(h.to_f64())).collect())
            }
        }
    }
}

// == Quantized Value ==
/// Output of a successful quantization.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedValue {
    pub quantization_type: QuantizationType,
    pub root: QuantizedNode,
    /// Number of arrays that were re-encoded
    pub arrays: usize,
    pub stored_size: usize,
}

// == Quantizer ==
/// Encodes and decodes numeric arrays for a given [`QuantizationType`].
#[derive(Debug, Clone, Copy)]
pub struct Quantizer {
    quantization_type: QuantizationType,
}

impl Quantizer {
    pub fn new(quantization_type: QuantizationType) -> Self {
        Self { quantization_type }
    }

    /// Builds the quantizer selected by the quantization settings.
    /// `aggressive` always selects int8.
    pub fn for_settings(quantization_type: QuantizationType, aggressive: bool) -> Self {
        if aggressive {
            Self::new(QuantizationType::Int8)
        } else {
            Self::new(quantization_type)
        }
    }

    pub fn quantization_type(&self) -> QuantizationType {
        self.quantization_type
    }

    // == Quantize ==
    /// Quantizes every flat numeric array in `value`.
    ///
    /// # Arguments
    /// * `value` - The document to compress
    /// * `raw_size` - Compact JSON length of `value`
    ///
    /// # Errors
    /// Fails when the type is `None`, when no array qualifies, or when the
    /// result would not be smaller than `raw_size`. Callers fall back to raw
    /// storage in every case.
    pub fn quantize(
        &self,
        value: &Value,
        raw_size: usize,
    ) -> Result<QuantizedValue, QuantizationError> {
        if self.quantization_type == QuantizationType::None {
            return Err(QuantizationError::Disabled);
        }

        let mut arrays = 0;
        let root = self.encode(value, &mut arrays);
        if arrays == 0 {
            return Err(QuantizationError::UnsupportedShape);
        }

        let stored_size = root.stored_size();
        if stored_size >= raw_size {
            return Err(QuantizationError::NoSizeBenefit {
                raw: raw_size,
                stored: stored_size,
            });
        }

        Ok(QuantizedValue {
            quantization_type: self.quantization_type,
            root,
            arrays,
            stored_size,
        })
    }

    // == Dequantize ==
    /// Reconstructs the document. Quantized arrays come back as floats within
    /// the encoding's error bound.
    pub fn dequantize(quantized: &QuantizedValue) -> Value {
        quantized.root.to_value()
    }

    fn encode(&self, value: &Value, arrays: &mut usize) -> QuantizedNode {
        match value {
            Value::Array(items) => match numeric_array(items) {
                Some(numbers) => match self.encode_numbers(&numbers) {
                    Some(node) => {
                        *arrays += 1;
                        node
                    }
                    None => QuantizedNode::Plain(value.clone()),
                },
                None => QuantizedNode::Array(
                    items.iter().map(|item| self.encode(item, arrays)).collect(),
                ),
            },
            Value::Object(fields) => QuantizedNode::Object(
                fields
                    .iter()
                    .map(|(key, item)| (key.clone(), self.encode(item, arrays)))
                    .collect(),
            ),
            other => QuantizedNode::Plain(other.clone()),
        }
    }

    /// Encodes one numeric array, or None when the encoding cannot represent
    /// it within its error bound.
    fn encode_numbers(&self, numbers: &[f64]) -> Option<QuantizedNode> {
        match self.quantization_type {
            QuantizationType::Int8 => quantize_int8(numbers),
            QuantizationType::Float16 => quantize_float16(numbers),
            QuantizationType::None => None,
        }
    }
}

/// Linear int8 quantization over the array's range. Arrays whose range
/// overflows f64 are refused.
fn quantize_int8(numbers: &[f64]) -> Option<QuantizedNode> {
    let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
    let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if !range.is_finite() {
        return None;
    }
    let scale = if range > 0.0 { range / 255.0 } else { 1.0 };

    let data = numbers
        .iter()
        .map(|&v| (((v - min) / scale).round() - 128.0).clamp(-128.0, 127.0) as i8)
        .collect();

    Some(QuantizedNode::Int8 {
        scale,
        offset: min,
        data,
    })
}

/// Half precision encoding. Values beyond the f16 range are refused.
fn quantize_float16(numbers: &[f64]) -> Option<QuantizedNode> {
    let limit = f16::MAX.to_f64();
    if numbers.iter().any(|v| v.abs() > limit) {
        return None;
    }
    Some(QuantizedNode::Float16(numbers.iter().map(|&v| f16::from_f64(v)).collect()))
}

/// Returns the elements as f64 when `items` is a quantizable numeric array.
fn numeric_array(items: &[Value]) -> Option<Vec<f64>> {
    if items.len() < MIN_QUANTIZABLE_LEN {
        return None;
    }
    items
        .iter()
        .map(|item| item.as_f64().filter(|v| v.is_finite()))
        .collect()
}

fn number(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

/// Compact JSON length of a value.
pub fn json_len(value: &Value) -> usize {
    serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or(0)
}
