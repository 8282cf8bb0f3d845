//! Tensor data model shared by the ONNX host-function adapter and
//! inference engine (§3, §4.6).

use serde::{Deserialize, Serialize};

/// The dtype strings §3 enumerates, exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorDType {
    Float32,
    Float64,
    Int64,
    Int32,
    Int16,
    Uint8,
    Float16,
    Bfloat16,
    Bool,
}

impl TensorDType {
    /// Byte width of one element when packed into `raw_data`.
    pub fn element_size(self) -> usize {
        match self {
            TensorDType::Float32 => 4,
            TensorDType::Float64 => 8,
            TensorDType::Int64 => 8,
            TensorDType::Int32 => 4,
            TensorDType::Int16 => 2,
            TensorDType::Uint8 => 1,
            TensorDType::Float16 => 2,
            TensorDType::Bfloat16 => 2,
            TensorDType::Bool => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TensorDType::Float32 => "float32",
            TensorDType::Float64 => "float64",
            TensorDType::Int64 => "int64",
            TensorDType::Int32 => "int32",
            TensorDType::Int16 => "int16",
            TensorDType::Uint8 => "uint8",
            TensorDType::Float16 => "float16",
            TensorDType::Bfloat16 => "bfloat16",
            TensorDType::Bool => "bool",
        }
    }
}

/// A named tensor fed into a model call. `values` is the generic f64
/// carrier; the typed `*_data` fields are alternative representations for
/// dtypes where precision or source format matters (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TensorInput {
    pub name: String,
    pub shape: Vec<i64>,
    pub dtype: Option<TensorDType>,
    #[serde(default)]
    pub values: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub int64_data: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub int32_data: Option<Vec<i32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub int16_data: Option<Vec<i16>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uint8_data: Option<Vec<u8>>,
}

impl TensorInput {
    /// True if at least one of `values` or a typed data field is
    /// populated (§4.6 step 1).
    pub fn has_data(&self) -> bool {
        !self.values.is_empty()
            || self.int64_data.as_ref().is_some_and(|d| !d.is_empty())
            || self.int32_data.as_ref().is_some_and(|d| !d.is_empty())
            || self.int16_data.as_ref().is_some_and(|d| !d.is_empty())
            || self.uint8_data.as_ref().is_some_and(|d| !d.is_empty())
    }
}

/// A named tensor produced by a model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorOutput {
    pub name: String,
    pub shape: Vec<i64>,
    pub dtype: TensorDType,
    pub values: Vec<f64>,
    /// Little-endian, dtype-specific packing of `values` (§4.6).
    pub raw_data: Vec<u8>,
}

/// Per-tensor shape/dtype metadata extracted from a loaded model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorInfo {
    pub shape: Vec<i64>,
    pub dtype: TensorDType,
}

/// Cached, immutable-after-first-extraction model metadata (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnnxModelMetadata {
    pub input_names: Vec<String>,
    pub output_names: Vec<String>,
    pub input_infos: Vec<TensorInfo>,
    pub output_infos: Vec<TensorInfo>,
}
