//! ONNX inference engine (C9, §4.6): lazy one-time runtime init with
//! memoized failure and single-attempt recovery, a metadata cache behind a
//! reader/writer lock, a bounded concurrency gate, and the per-call tensor
//! marshalling pipeline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value as OrtValue;

use ispc_core::{
    BlobStore, CancellationToken, ContentHash, CoordinatorError, OnnxModelMetadata, TensorDType,
    TensorInfo, TensorInput, TensorOutput,
};

use crate::host_fns::OnnxHostAbi;
use crate::marshal::{decode_raw, encode_raw};
use crate::semaphore::Semaphore;

/// Default concurrency cap (§4.6: "capacity configurable, default 10").
pub const DEFAULT_CONCURRENCY: usize = 10;

#[derive(Debug, Clone)]
struct InitFailure(String);

/// Execute-once runtime init guard with memoized failure (§5). `OnceLock`
/// gives us the "exactly once, even under concurrent first callers"
/// property for free; the recovery path below replaces its content under a
/// separate `Mutex` rather than trying to reset the `OnceLock` itself.
static RUNTIME_INIT: OnceLock<Result<(), InitFailure>> = OnceLock::new();

fn ensure_runtime_initialized() -> Result<(), CoordinatorError> {
    let result = RUNTIME_INIT.get_or_init(|| {
        ort::init()
            .with_name("ispc-onnx")
            .commit()
            .map(|_| ())
            .map_err(|e| InitFailure(e.to_string()))
    });
    result
        .clone()
        .map_err(|e| CoordinatorError::InternalError(format!("ONNX runtime init failed: {}", e.0)))
}

/// The inference engine (C9). One instance is shared process-wide, the same
/// way a single [`crate::semaphore::Semaphore`] bounds the whole process's
/// concurrent ONNX sessions rather than being per-call.
pub struct OnnxEngine {
    metadata_cache: RwLock<HashMap<ContentHash, OnnxModelMetadata>>,
    gate: Semaphore,
    /// Tracks whether the runtime has been observed corrupted post-init, to
    /// drive the single recovery-reload attempt (§4.6 lifecycle).
    recovery_attempted: Mutex<bool>,
}

impl OnnxEngine {
    pub fn new(concurrency: usize) -> Self {
        OnnxEngine {
            metadata_cache: RwLock::new(HashMap::new()),
            gate: Semaphore::new(concurrency),
            recovery_attempted: Mutex::new(false),
        }
    }

    /// Run a model identified by `model_hash` against `inputs` (§4.6's
    /// 8-step per-call flow).
    pub fn run(
        &self,
        blob_store: &dyn BlobStore,
        host_abi: &dyn OnnxHostAbi,
        model_hash: ContentHash,
        inputs: Vec<TensorInput>,
        cancel: &CancellationToken,
    ) -> Result<Vec<TensorOutput>, CoordinatorError> {
        let _ = host_abi; // the five read-only primitives are reachable to the model graph's custom ops, not used by this marshalling path directly

        // Step 1: validate inputs.
        if inputs.is_empty() {
            return Err(CoordinatorError::InvalidArtifact(
                "ONNX call with zero inputs".to_string(),
            ));
        }
        for input in &inputs {
            if !input.has_data() {
                return Err(CoordinatorError::InvalidArtifact(format!(
                    "ONNX input '{}' has no populated data field",
                    input.name
                )));
            }
        }

        ensure_runtime_initialized()?;

        // Step 2: resolve model bytes.
        let model_bytes = blob_store.get(&model_hash).map_err(|e| {
            CoordinatorError::InvalidArtifact(format!(
                "failed to fetch model {}: {}",
                model_hash.to_hex(),
                e
            ))
        })?;

        // Step 4: acquire a concurrency token before doing session work.
        let _permit = self.gate.acquire(cancel).ok_or(CoordinatorError::Cancelled)?;

        if cancel.is_cancelled() {
            return Err(CoordinatorError::Cancelled);
        }

        let session = self.build_session(&model_bytes).or_else(|e| {
            // Single recovery-reload attempt: if this is the first failure
            // after a successful init, retry exactly once.
            let mut attempted = self.recovery_attempted.lock().unwrap_or_else(|e| e.into_inner());
            if *attempted {
                return Err(e);
            }
            *attempted = true;
            self.build_session(&model_bytes)
        })?;

        // Step 3: metadata cache lookup/insert, double-checked under the
        // write lock (§5).
        let metadata = self.metadata_for(&model_hash, &session);

        // Step 5/6/7: marshal inputs, run, marshal outputs.
        let outputs = self.run_session(&session, &inputs, &metadata, &model_hash);

        // Step 8: session and ort::Value tensors drop here regardless of
        // whether `run_session` returned Ok or Err — deterministic cleanup
        // on every path, including cancellation between acquire and run.
        drop(session);

        outputs
    }

    fn build_session(&self, model_bytes: &[u8]) -> Result<Session, CoordinatorError> {
        Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level1))
            .and_then(|b| b.commit_from_memory(model_bytes))
            .map_err(|e| CoordinatorError::InvalidArtifact(format!("invalid ONNX model: {}", e)))
    }

    fn metadata_for(&self, model_hash: &ContentHash, session: &Session) -> OnnxModelMetadata {
        if let Some(existing) = self
            .metadata_cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(model_hash)
        {
            return existing.clone();
        }
        let mut cache = self.metadata_cache.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = cache.get(model_hash) {
            return existing.clone();
        }
        let metadata = extract_metadata(session);
        cache.insert(*model_hash, metadata.clone());
        metadata
    }

    fn run_session(
        &self,
        session: &Session,
        inputs: &[TensorInput],
        metadata: &OnnxModelMetadata,
        model_hash: &ContentHash,
    ) -> Result<Vec<TensorOutput>, CoordinatorError> {
        let mut ort_inputs: Vec<(String, OrtValue)> = Vec::with_capacity(inputs.len());
        for input in inputs {
            let metadata_dtype = metadata
                .input_names
                .iter()
                .position(|n| n == &input.name)
                .and_then(|idx| metadata.input_infos.get(idx))
                .map(|info| info.dtype);
            let dtype = input.dtype.or(metadata_dtype).unwrap_or(TensorDType::Float32);

            // Shape priority: user-supplied -> model metadata -> [1,N].
            let shape = if !input.shape.is_empty() {
                input.shape.clone()
            } else if let Some(info) = metadata
                .input_names
                .iter()
                .position(|n| n == &input.name)
                .and_then(|idx| metadata.input_infos.get(idx))
            {
                info.shape.clone()
            } else {
                vec![1, flat_len(input) as i64]
            };

            let expected_len: i64 = shape.iter().product();
            let values = typed_values(input);
            if values.len() as i64 != expected_len {
                return Err(CoordinatorError::InvalidArtifact(format!(
                    "ONNX input '{}' has {} values but declared shape implies {} for model {}",
                    input.name,
                    values.len(),
                    expected_len,
                    model_hash.to_hex()
                )));
            }

            let value = build_ort_tensor(dtype, &shape, &values).map_err(|e| {
                CoordinatorError::InternalError(format!(
                    "failed to build tensor for input '{}': {}",
                    input.name, e
                ))
            })?;
            ort_inputs.push((input.name.clone(), value));
        }

        let outputs = session
            .run(ort_inputs)
            .map_err(|e| {
                CoordinatorError::InternalError(format!(
                    "ONNX session run failed for model {}: {}",
                    model_hash.to_hex(),
                    e
                ))
            })?;

        let mut result = Vec::with_capacity(outputs.len());
        for (idx, name) in metadata.output_names.iter().enumerate() {
            let Some(value) = outputs.get(name.as_str()) else {
                continue;
            };
            let dtype = metadata
                .output_infos
                .get(idx)
                .map(|i| i.dtype)
                .unwrap_or(TensorDType::Float32);
            let (shape, values) = extract_ort_tensor(value, dtype).map_err(|e| {
                CoordinatorError::InternalError(format!(
                    "failed to read output '{}' for model {}: {}",
                    name,
                    model_hash.to_hex(),
                    e
                ))
            })?;
            let raw_data = encode_raw(dtype, &values);
            result.push(TensorOutput {
                name: name.clone(),
                shape,
                dtype,
                values,
                raw_data,
            });
        }
        Ok(result)
    }
}

fn flat_len(input: &TensorInput) -> usize {
    input
        .values
        .len()
        .max(input.int64_data.as_ref().map_or(0, |d| d.len()))
        .max(input.int32_data.as_ref().map_or(0, |d| d.len()))
        .max(input.int16_data.as_ref().map_or(0, |d| d.len()))
        .max(input.uint8_data.as_ref().map_or(0, |d| d.len()))
}

fn typed_values(input: &TensorInput) -> Vec<f64> {
    if !input.values.is_empty() {
        return input.values.clone();
    }
    if let Some(d) = &input.int64_data {
        return d.iter().map(|&v| v as f64).collect();
    }
    if let Some(d) = &input.int32_data {
        return d.iter().map(|&v| v as f64).collect();
    }
    if let Some(d) = &input.int16_data {
        return d.iter().map(|&v| v as f64).collect();
    }
    if let Some(d) = &input.uint8_data {
        return d.iter().map(|&v| v as f64).collect();
    }
    Vec::new()
}

fn extract_metadata(session: &Session) -> OnnxModelMetadata {
    let input_names = session.inputs.iter().map(|i| i.name.clone()).collect();
    let output_names = session.outputs.iter().map(|o| o.name.clone()).collect();
    let input_infos = session.inputs.iter().map(tensor_info_of).collect();
    let output_infos = session.outputs.iter().map(tensor_info_of).collect();
    OnnxModelMetadata {
        input_names,
        output_names,
        input_infos,
        output_infos,
    }
}

fn tensor_info_of(io: &ort::session::Input) -> TensorInfo {
    match &io.input_type {
        ort::value::ValueType::Tensor { ty, dimensions, .. } => TensorInfo {
            shape: dimensions.clone(),
            dtype: map_ort_dtype(*ty),
        },
        _ => TensorInfo {
            shape: vec![],
            dtype: TensorDType::Float32,
        },
    }
}

fn map_ort_dtype(ty: ort::tensor::TensorElementType) -> TensorDType {
    use ort::tensor::TensorElementType as T;
    match ty {
        T::Float32 => TensorDType::Float32,
        T::Float64 => TensorDType::Float64,
        T::Int64 => TensorDType::Int64,
        T::Int32 => TensorDType::Int32,
        T::Int16 => TensorDType::Int16,
        T::Uint8 => TensorDType::Uint8,
        T::Float16 => TensorDType::Float16,
        T::Bfloat16 => TensorDType::Bfloat16,
        T::Bool => TensorDType::Bool,
        _ => TensorDType::Float32,
    }
}

fn build_ort_tensor(
    dtype: TensorDType,
    shape: &[i64],
    values: &[f64],
) -> Result<OrtValue, String> {
    let shape: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
    match dtype {
        TensorDType::Float32 => {
            let data: Vec<f32> = values.iter().map(|&v| v as f32).collect();
            OrtValue::from_array((shape, data)).map_err(|e| e.to_string())
        }
        TensorDType::Float64 => OrtValue::from_array((shape, values.to_vec())).map_err(|e| e.to_string()),
        TensorDType::Int64 => {
            let data: Vec<i64> = values.iter().map(|&v| v as i64).collect();
            OrtValue::from_array((shape, data)).map_err(|e| e.to_string())
        }
        TensorDType::Int32 => {
            let data: Vec<i32> = values.iter().map(|&v| v as i32).collect();
            OrtValue::from_array((shape, data)).map_err(|e| e.to_string())
        }
        TensorDType::Int16 => {
            let data: Vec<i16> = values.iter().map(|&v| v as i16).collect();
            OrtValue::from_array((shape, data)).map_err(|e| e.to_string())
        }
        TensorDType::Uint8 | TensorDType::Bool => {
            let data: Vec<u8> = values.iter().map(|&v| v as u8).collect();
            OrtValue::from_array((shape, data)).map_err(|e| e.to_string())
        }
        TensorDType::Float16 | TensorDType::Bfloat16 => {
            // ort's half-precision tensor construction takes raw u16 bit
            // patterns; we've already computed those via `marshal`.
            let bits: Vec<u16> = encode_raw(dtype, values)
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            OrtValue::from_array((shape, bits)).map_err(|e| e.to_string())
        }
    }
}

fn extract_ort_tensor(value: &OrtValue, dtype: TensorDType) -> Result<(Vec<i64>, Vec<f64>), String> {
    match dtype {
        TensorDType::Float32 => {
            let (shape, data) = value.try_extract_raw_tensor::<f32>().map_err(|e| e.to_string())?;
            Ok((shape.to_vec(), data.iter().map(|&v| v as f64).collect()))
        }
        TensorDType::Float64 => {
            let (shape, data) = value.try_extract_raw_tensor::<f64>().map_err(|e| e.to_string())?;
            Ok((shape.to_vec(), data.to_vec()))
        }
        TensorDType::Int64 => {
            let (shape, data) = value.try_extract_raw_tensor::<i64>().map_err(|e| e.to_string())?;
            Ok((shape.to_vec(), data.iter().map(|&v| v as f64).collect()))
        }
        TensorDType::Int32 => {
            let (shape, data) = value.try_extract_raw_tensor::<i32>().map_err(|e| e.to_string())?;
            Ok((shape.to_vec(), data.iter().map(|&v| v as f64).collect()))
        }
        TensorDType::Int16 => {
            let (shape, data) = value.try_extract_raw_tensor::<i16>().map_err(|e| e.to_string())?;
            Ok((shape.to_vec(), data.iter().map(|&v| v as f64).collect()))
        }
        TensorDType::Uint8 | TensorDType::Bool => {
            let (shape, data) = value.try_extract_raw_tensor::<u8>().map_err(|e| e.to_string())?;
            Ok((shape.to_vec(), data.iter().map(|&v| v as f64).collect()))
        }
        TensorDType::Float16 => {
            let (shape, data) = value.try_extract_raw_tensor::<u16>().map_err(|e| e.to_string())?;
            let raw: Vec<u8> = data.iter().flat_map(|b| b.to_le_bytes()).collect();
            Ok((shape.to_vec(), decode_raw(dtype, &raw)))
        }
        TensorDType::Bfloat16 => {
            let (shape, data) = value.try_extract_raw_tensor::<u16>().map_err(|e| e.to_string())?;
            let raw: Vec<u8> = data.iter().flat_map(|b| b.to_le_bytes()).collect();
            Ok((shape.to_vec(), decode_raw(dtype, &raw)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_values_prefers_f64_field_when_present() {
        let input = TensorInput {
            name: "x".into(),
            shape: vec![1],
            dtype: Some(TensorDType::Float32),
            values: vec![3.0],
            int32_data: Some(vec![9]),
            ..Default::default()
        };
        assert_eq!(typed_values(&input), vec![3.0]);
    }

    #[test]
    fn typed_values_falls_back_to_typed_array() {
        let input = TensorInput {
            name: "x".into(),
            shape: vec![2],
            dtype: Some(TensorDType::Int32),
            int32_data: Some(vec![1, 2]),
            ..Default::default()
        };
        assert_eq!(typed_values(&input), vec![1.0, 2.0]);
    }

    #[test]
    fn flat_len_picks_the_populated_field() {
        let input = TensorInput {
            name: "x".into(),
            shape: vec![],
            dtype: None,
            uint8_data: Some(vec![1, 2, 3]),
            ..Default::default()
        };
        assert_eq!(flat_len(&input), 3);
    }
}
