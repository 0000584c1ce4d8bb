//! Packed, delta-packed, quantized and fixed-string encodings.
//!
//! Every `write_*` here has an exact `read_*` inverse that must be called with
//! the same [`CompressionModel`] and the same baseline.

use crate::error::{BitError, BitResult};
use crate::model::{CompressionModel, MAX_CODE_LEN};
use crate::reader::BitReader;
use crate::writer::BitWriter;

/// Maps a signed value onto an unsigned one so small magnitudes stay small.
#[must_use]
pub const fn zigzag_encode(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// Inverse of [`zigzag_encode`].
#[must_use]
pub const fn zigzag_decode(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// 64-bit variant of [`zigzag_encode`].
#[must_use]
pub const fn zigzag_encode_64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`zigzag_encode_64`].
#[must_use]
pub const fn zigzag_decode_64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Converts a float to its fixed-point representation: `round(value * scale)`.
///
/// Out-of-range results saturate at the `i32` bounds.
#[must_use]
pub fn quantize_f32(value: f32, scale: u32) -> i32 {
    (f64::from(value) * f64::from(scale)).round() as i32
}

/// Inverse of [`quantize_f32`], exact up to `0.5 / scale`.
#[must_use]
pub fn dequantize_f32(value: i32, scale: u32) -> f32 {
    (f64::from(value) / f64::from(scale)) as f32
}

/// Converts a double to its fixed-point representation: `round(value * scale)`.
#[must_use]
pub fn quantize_f64(value: f64, scale: u32) -> i64 {
    (value * f64::from(scale)).round() as i64
}

/// Inverse of [`quantize_f64`].
#[must_use]
pub fn dequantize_f64(value: i64, scale: u32) -> f64 {
    value as f64 / f64::from(scale)
}

impl BitWriter<'_> {
    /// Writes `value` with the model's variable-length encoding.
    pub fn write_packed_uint(&mut self, value: u32, model: &CompressionModel) -> BitResult<()> {
        let bucket = model.bucket_for(value);
        let (code, code_len) = model.code(bucket);
        let size = model.bucket_size(bucket);
        self.ensure_capacity(usize::from(code_len) + usize::from(size))?;
        self.write_raw_bits(code, code_len)?;
        self.write_raw_bits(value - model.bucket_offset(bucket), size)
    }

    /// Writes a signed value through zig-zag and the packed path.
    pub fn write_packed_int(&mut self, value: i32, model: &CompressionModel) -> BitResult<()> {
        self.write_packed_uint(zigzag_encode(value), model)
    }

    /// Writes `zigzag(value - baseline)`. Equal values cost the fewest bits.
    pub fn write_packed_uint_delta(
        &mut self,
        value: u32,
        baseline: u32,
        model: &CompressionModel,
    ) -> BitResult<()> {
        self.write_packed_int(value.wrapping_sub(baseline) as i32, model)
    }

    /// Signed counterpart of [`write_packed_uint_delta`](Self::write_packed_uint_delta).
    pub fn write_packed_int_delta(
        &mut self,
        value: i32,
        baseline: i32,
        model: &CompressionModel,
    ) -> BitResult<()> {
        self.write_packed_int(value.wrapping_sub(baseline), model)
    }

    /// Writes a 64-bit value as two packed halves, high word first.
    pub fn write_packed_ulong(&mut self, value: u64, model: &CompressionModel) -> BitResult<()> {
        self.atomic(|w| {
            w.write_packed_uint((value >> 32) as u32, model)?;
            w.write_packed_uint(value as u32, model)
        })
    }

    /// Writes `zigzag64(value - baseline)` through the 64-bit packed path.
    pub fn write_packed_long_delta(
        &mut self,
        value: i64,
        baseline: i64,
        model: &CompressionModel,
    ) -> BitResult<()> {
        self.write_packed_ulong(zigzag_encode_64(value.wrapping_sub(baseline)), model)
    }

    /// Quantizes both floats with `scale` and writes the packed delta of the results.
    pub fn write_packed_float_delta(
        &mut self,
        value: f32,
        baseline: f32,
        scale: u32,
        model: &CompressionModel,
    ) -> BitResult<()> {
        self.write_packed_int_delta(quantize_f32(value, scale), quantize_f32(baseline, scale), model)
    }

    /// Quantizes both doubles with `scale` and writes the packed delta of the results.
    pub fn write_packed_double_delta(
        &mut self,
        value: f64,
        baseline: f64,
        scale: u32,
        model: &CompressionModel,
    ) -> BitResult<()> {
        self.write_packed_long_delta(quantize_f64(value, scale), quantize_f64(baseline, scale), model)
    }

    /// Unquantized float: one "changed" bit, then the raw IEEE bits when changed.
    pub fn write_raw_float_delta(&mut self, value: f32, baseline: f32) -> BitResult<()> {
        let bits = value.to_bits();
        if bits == baseline.to_bits() {
            return self.write_bit(false);
        }
        self.ensure_capacity(33)?;
        self.write_bit(true)?;
        self.write_raw_bits(bits, 32)
    }

    /// Unquantized double: one "changed" bit, then the raw IEEE bits when changed.
    pub fn write_raw_double_delta(&mut self, value: f64, baseline: f64) -> BitResult<()> {
        let bits = value.to_bits();
        if bits == baseline.to_bits() {
            return self.write_bit(false);
        }
        self.ensure_capacity(65)?;
        self.write_bit(true)?;
        self.write_bits(bits, 64)
    }

    /// Fixed-capacity string delta: an unchanged bit, or a full replacement
    /// (packed length followed by the bytes).
    pub fn write_fixed_string_delta(
        &mut self,
        value: &[u8],
        baseline: &[u8],
        capacity: usize,
        model: &CompressionModel,
    ) -> BitResult<()> {
        if value.len() > capacity {
            return Err(BitError::StringTooLong {
                len: value.len(),
                capacity,
            });
        }
        if value == baseline {
            return self.write_bit(false);
        }
        let len = u32::try_from(value.len()).map_err(|_| BitError::StringTooLong {
            len: value.len(),
            capacity,
        })?;
        self.atomic(|w| {
            w.write_bit(true)?;
            w.write_packed_uint(len, model)?;
            w.write_bytes(value)
        })
    }
}

impl BitReader<'_> {
    /// Reads a value written by [`BitWriter::write_packed_uint`].
    pub fn read_packed_uint(&mut self, model: &CompressionModel) -> BitResult<u32> {
        let mut code = 0u32;
        for len in 1..=MAX_CODE_LEN {
            code = (code << 1) | u32::from(self.read_bit()?);
            if let Some(bucket) = model.lookup(code, len) {
                let payload = self.read_raw_bits(model.bucket_size(bucket))?;
                return model
                    .bucket_offset(bucket)
                    .checked_add(payload)
                    .ok_or(BitError::InvalidPackedCode);
            }
        }
        Err(BitError::InvalidPackedCode)
    }

    /// Reads a value written by [`BitWriter::write_packed_int`].
    pub fn read_packed_int(&mut self, model: &CompressionModel) -> BitResult<i32> {
        self.read_packed_uint(model).map(zigzag_decode)
    }

    /// Reads a delta written by [`BitWriter::write_packed_uint_delta`].
    pub fn read_packed_uint_delta(
        &mut self,
        baseline: u32,
        model: &CompressionModel,
    ) -> BitResult<u32> {
        let delta = self.read_packed_int(model)?;
        Ok(baseline.wrapping_add(delta as u32))
    }

    /// Reads a delta written by [`BitWriter::write_packed_int_delta`].
    pub fn read_packed_int_delta(
        &mut self,
        baseline: i32,
        model: &CompressionModel,
    ) -> BitResult<i32> {
        let delta = self.read_packed_int(model)?;
        Ok(baseline.wrapping_add(delta))
    }

    /// Reads a value written by [`BitWriter::write_packed_ulong`].
    pub fn read_packed_ulong(&mut self, model: &CompressionModel) -> BitResult<u64> {
        let high = self.read_packed_uint(model)?;
        let low = self.read_packed_uint(model)?;
        Ok((u64::from(high) << 32) | u64::from(low))
    }

    /// Reads a delta written by [`BitWriter::write_packed_long_delta`].
    pub fn read_packed_long_delta(
        &mut self,
        baseline: i64,
        model: &CompressionModel,
    ) -> BitResult<i64> {
        let delta = zigzag_decode_64(self.read_packed_ulong(model)?);
        Ok(baseline.wrapping_add(delta))
    }

    /// Reads a delta written by [`BitWriter::write_packed_float_delta`].
    ///
    /// The result is the dequantized value, within `0.5 / scale` of the original.
    pub fn read_packed_float_delta(
        &mut self,
        baseline: f32,
        scale: u32,
        model: &CompressionModel,
    ) -> BitResult<f32> {
        let quantized = self.read_packed_int_delta(quantize_f32(baseline, scale), model)?;
        Ok(dequantize_f32(quantized, scale))
    }

    /// Reads a delta written by [`BitWriter::write_packed_double_delta`].
    pub fn read_packed_double_delta(
        &mut self,
        baseline: f64,
        scale: u32,
        model: &CompressionModel,
    ) -> BitResult<f64> {
        let quantized = self.read_packed_long_delta(quantize_f64(baseline, scale), model)?;
        Ok(dequantize_f64(quantized, scale))
    }

    /// Reads a value written by [`BitWriter::write_raw_float_delta`].
    pub fn read_raw_float_delta(&mut self, baseline: f32) -> BitResult<f32> {
        if self.read_bit()? {
            Ok(f32::from_bits(self.read_raw_bits(32)?))
        } else {
            Ok(baseline)
        }
    }

    /// Reads a value written by [`BitWriter::write_raw_double_delta`].
    pub fn read_raw_double_delta(&mut self, baseline: f64) -> BitResult<f64> {
        if self.read_bit()? {
            Ok(f64::from_bits(self.read_bits(64)?))
        } else {
            Ok(baseline)
        }
    }

    /// Reads a value written by [`BitWriter::write_fixed_string_delta`].
    pub fn read_fixed_string_delta(
        &mut self,
        baseline: &[u8],
        capacity: usize,
        model: &CompressionModel,
    ) -> BitResult<Vec<u8>> {
        if !self.read_bit()? {
            return Ok(baseline.to_vec());
        }
        let len = self.read_packed_uint(model)? as usize;
        if len > capacity {
            return Err(BitError::StringTooLong { len, capacity });
        }
        let mut out = vec![0u8; len];
        self.read_bytes_into(&mut out)?;
        Ok(out)
    }
}
