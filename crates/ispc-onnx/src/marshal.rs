//! Tensor marshalling (§4.6 "Tensor marshalling rules"): converting the
//! core's f64-carrier [`TensorInput`]/[`TensorOutput`] values to and from the
//! little-endian `raw_data` bytes a dtype-specific representation needs.

use ispc_core::TensorDType;

/// IEEE-754 binary32 → binary16, round-to-nearest-even with gradual
/// underflow to subnormals, per §4.6. NaN payloads collapse to a single
/// quiet NaN pattern; infinities and signs are preserved.
pub fn f32_to_f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x007f_ffff;

    if exp == 0xff {
        // Inf or NaN.
        return if mantissa != 0 {
            sign | 0x7e00 // quiet NaN
        } else {
            sign | 0x7c00 // Inf
        };
    }

    let unbiased = exp - 127;
    let f16_exp = unbiased + 15;

    if f16_exp >= 0x1f {
        // Overflow to infinity.
        return sign | 0x7c00;
    }

    if f16_exp <= 0 {
        // Subnormal or underflow to zero. Shift so the implicit leading 1
        // lands at bit 23 - f16_exp, then round to nearest-even at bit 13.
        if f16_exp < -10 {
            return sign; // below the smallest subnormal: underflows to zero
        }
        let full_mantissa = mantissa | 0x0080_0000; // restore implicit bit
        let shift = (14 - f16_exp) as u32;
        let mut result = full_mantissa >> shift;
        let round_bit = 1u32 << (shift - 1);
        let remainder = full_mantissa & ((round_bit << 1) - 1);
        if remainder > round_bit || (remainder == round_bit && (result & 1) == 1) {
            result += 1;
        }
        return sign | (result as u16);
    }

    // Normal range: round the 23-bit mantissa down to 10 bits.
    let rounded_mantissa = mantissa + 0x0000_0fff + ((mantissa >> 13) & 1);
    let (f16_exp, rounded_mantissa) = if rounded_mantissa & 0x0080_0000 != 0 {
        (f16_exp + 1, 0u32)
    } else {
        (f16_exp, rounded_mantissa)
    };
    if f16_exp >= 0x1f {
        return sign | 0x7c00;
    }
    sign | ((f16_exp as u16) << 10) | ((rounded_mantissa >> 13) as u16)
}

/// binary16 → binary32, exact (every binary16 value is exactly representable
/// in binary32).
pub fn f16_bits_to_f32(bits: u16) -> f32 {
    let sign = (bits & 0x8000) as u32;
    let exp = ((bits >> 10) & 0x1f) as u32;
    let mantissa = (bits & 0x03ff) as u32;

    let (exp32, mantissa32) = if exp == 0 {
        if mantissa == 0 {
            (0, 0)
        } else {
            // Subnormal: normalize by shifting until the leading bit is set.
            let mut m = mantissa;
            let mut e: i32 = -1;
            while m & 0x0400 == 0 {
                m <<= 1;
                e -= 1;
            }
            m &= 0x03ff;
            (((e + 15 + 127) as u32), m << 13)
        }
    } else if exp == 0x1f {
        (0xff, mantissa << 13)
    } else {
        ((exp as i32 - 15 + 127) as u32, mantissa << 13)
    };

    let bits32 = (sign << 16) | (exp32 << 23) | mantissa32;
    f32::from_bits(bits32)
}

/// bfloat16: the high 16 bits of the binary32 encoding (truncation, no
/// rounding — §4.6 says no rounding requirement is specified).
pub fn f32_to_bf16_bits(value: f32) -> u16 {
    (value.to_bits() >> 16) as u16
}

pub fn bf16_bits_to_f32(bits: u16) -> f32 {
    f32::from_bits((bits as u32) << 16)
}

/// Little-endian pack `values` (the f64 carrier) into `raw_data` for
/// `dtype`, per §4.6's output step 7.
pub fn encode_raw(dtype: TensorDType, values: &[f64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * dtype.element_size());
    for &v in values {
        match dtype {
            TensorDType::Float32 => out.extend_from_slice(&(v as f32).to_le_bytes()),
            TensorDType::Float64 => out.extend_from_slice(&v.to_le_bytes()),
            TensorDType::Int64 => out.extend_from_slice(&(v as i64).to_le_bytes()),
            TensorDType::Int32 => out.extend_from_slice(&(v as i32).to_le_bytes()),
            TensorDType::Int16 => out.extend_from_slice(&(v as i16).to_le_bytes()),
            TensorDType::Uint8 => out.push(v as u8),
            TensorDType::Float16 => out.extend_from_slice(&f32_to_f16_bits(v as f32).to_le_bytes()),
            TensorDType::Bfloat16 => out.extend_from_slice(&f32_to_bf16_bits(v as f32).to_le_bytes()),
            TensorDType::Bool => out.push(if v == 0.0 { 0 } else { 1 }),
        }
    }
    out
}

/// Inverse of [`encode_raw`]: unpack `raw_data` back into the f64 carrier.
pub fn decode_raw(dtype: TensorDType, raw: &[u8]) -> Vec<f64> {
    let width = dtype.element_size();
    raw.chunks_exact(width)
        .map(|chunk| match dtype {
            TensorDType::Float32 => f32::from_le_bytes(chunk.try_into().unwrap()) as f64,
            TensorDType::Float64 => f64::from_le_bytes(chunk.try_into().unwrap()),
            TensorDType::Int64 => i64::from_le_bytes(chunk.try_into().unwrap()) as f64,
            TensorDType::Int32 => i32::from_le_bytes(chunk.try_into().unwrap()) as f64,
            TensorDType::Int16 => i16::from_le_bytes(chunk.try_into().unwrap()) as f64,
            TensorDType::Uint8 => chunk[0] as f64,
            TensorDType::Float16 => {
                f16_bits_to_f32(u16::from_le_bytes(chunk.try_into().unwrap())) as f64
            }
            TensorDType::Bfloat16 => {
                bf16_bits_to_f32(u16::from_le_bytes(chunk.try_into().unwrap())) as f64
            }
            TensorDType::Bool => {
                if chunk[0] == 0 {
                    0.0
                } else {
                    1.0
                }
            }
        })
        .collect()
}
