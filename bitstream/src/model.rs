//! Shared compression model for packed integers.
//!
//! A packed value is written as a prefix code selecting a magnitude bucket,
//! followed by the value's offset inside that bucket in the bucket's bit width.
//! Both peers must hold an identical model; there is no negotiation.

use crate::error::{BitError, BitResult};

/// Number of magnitude buckets in a model.
pub const BUCKET_COUNT: usize = 16;

/// Longest prefix code a model may assign.
pub const MAX_CODE_LEN: u8 = 16;

/// Default payload bit width per bucket.
pub const DEFAULT_BUCKET_SIZES: [u8; BUCKET_COUNT] =
    [0, 0, 1, 2, 3, 4, 6, 8, 10, 12, 15, 18, 21, 24, 27, 32];

/// Default prefix code length per bucket. Small magnitudes get short codes.
pub const DEFAULT_CODE_LENGTHS: [u8; BUCKET_COUNT] =
    [2, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 6, 7, 8, 9, 9];

/// Bucket table plus canonical prefix codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionModel {
    bucket_sizes: [u8; BUCKET_COUNT],
    bucket_offsets: [u32; BUCKET_COUNT],
    code_lengths: [u8; BUCKET_COUNT],
    codes: [u16; BUCKET_COUNT],
    // Canonical decode tables, indexed by code length.
    first_code: [u32; MAX_CODE_LEN as usize + 1],
    length_counts: [u16; MAX_CODE_LEN as usize + 1],
    length_starts: [u16; MAX_CODE_LEN as usize + 1],
    sorted_buckets: [u8; BUCKET_COUNT],
}

impl Default for CompressionModel {
    fn default() -> Self {
        Self::build(DEFAULT_BUCKET_SIZES, DEFAULT_CODE_LENGTHS)
    }
}

impl CompressionModel {
    /// Builds a model from bucket widths and prefix code lengths.
    ///
    /// Bucket widths must be non-decreasing, at most 32, and together cover
    /// the whole `u32` range. Code lengths must satisfy the Kraft inequality.
    pub fn new(
        bucket_sizes: [u8; BUCKET_COUNT],
        code_lengths: [u8; BUCKET_COUNT],
    ) -> BitResult<Self> {
        validate(&bucket_sizes, &code_lengths)?;
        Ok(Self::build(bucket_sizes, code_lengths))
    }

    fn build(bucket_sizes: [u8; BUCKET_COUNT], code_lengths: [u8; BUCKET_COUNT]) -> Self {
        let mut bucket_offsets = [0u32; BUCKET_COUNT];
        let mut next: u64 = 0;
        for (offset, &size) in bucket_offsets.iter_mut().zip(&bucket_sizes) {
            *offset = next as u32;
            next += 1u64 << size;
        }

        let mut length_counts = [0u16; MAX_CODE_LEN as usize + 1];
        for &len in &code_lengths {
            length_counts[usize::from(len)] += 1;
        }

        let mut first_code = [0u32; MAX_CODE_LEN as usize + 1];
        let mut code = 0u32;
        for len in 1..=usize::from(MAX_CODE_LEN) {
            code = (code + u32::from(length_counts[len - 1])) << 1;
            first_code[len] = code;
        }

        let mut length_starts = [0u16; MAX_CODE_LEN as usize + 1];
        let mut start = 0u16;
        for len in 1..=usize::from(MAX_CODE_LEN) {
            length_starts[len] = start;
            start += length_counts[len];
        }

        // Canonical assignment: consecutive codes per length, in bucket order.
        let mut codes = [0u16; BUCKET_COUNT];
        let mut sorted_buckets = [0u8; BUCKET_COUNT];
        let mut next_code = first_code;
        let mut next_slot = length_starts;
        for len in 1..=MAX_CODE_LEN {
            let l = usize::from(len);
            for (bucket, _) in code_lengths.iter().enumerate().filter(|&(_, &b)| b == len) {
                codes[bucket] = next_code[l] as u16;
                next_code[l] += 1;
                sorted_buckets[usize::from(next_slot[l])] = bucket as u8;
                next_slot[l] += 1;
            }
        }

        Self {
            bucket_sizes,
            bucket_offsets,
            code_lengths,
            codes,
            first_code,
            length_counts,
            length_starts,
            sorted_buckets,
        }
    }

    /// Returns the bucket a value falls into.
    #[must_use]
    pub fn bucket_for(&self, value: u32) -> usize {
        self.bucket_offsets
            .iter()
            .rposition(|&offset| value >= offset)
            .unwrap_or(0)
    }

    /// Returns the number of bits `value` costs when packed with this model.
    #[must_use]
    pub fn packed_bits(&self, value: u32) -> usize {
        let bucket = self.bucket_for(value);
        usize::from(self.code_lengths[bucket]) + usize::from(self.bucket_sizes[bucket])
    }

    /// Returns the most bits any packed value can cost with this model.
    #[must_use]
    pub fn max_packed_bits(&self) -> usize {
        self.code_lengths
            .iter()
            .zip(&self.bucket_sizes)
            .map(|(&code, &size)| usize::from(code) + usize::from(size))
            .max()
            .unwrap_or(0)
    }

    /// Prefix code and its length for a bucket.
    pub(crate) fn code(&self, bucket: usize) -> (u32, u8) {
        (u32::from(self.codes[bucket]), self.code_lengths[bucket])
    }

    pub(crate) fn bucket_size(&self, bucket: usize) -> u8 {
        self.bucket_sizes[bucket]
    }

    pub(crate) fn bucket_offset(&self, bucket: usize) -> u32 {
        self.bucket_offsets[bucket]
    }

    /// Resolves a partially read code. Returns the bucket once `code` of
    /// length `len` is a complete codeword.
    pub(crate) fn lookup(&self, code: u32, len: u8) -> Option<usize> {
        let l = usize::from(len);
        let count = u32::from(self.length_counts[l]);
        let offset = code.checked_sub(self.first_code[l])?;
        if offset < count {
            let slot = usize::from(self.length_starts[l]) + offset as usize;
            Some(usize::from(self.sorted_buckets[slot]))
        } else {
            None
        }
    }
}

fn validate(bucket_sizes: &[u8; BUCKET_COUNT], code_lengths: &[u8; BUCKET_COUNT]) -> BitResult<()> {
    let mut covered: u64 = 0;
    for (i, &size) in bucket_sizes.iter().enumerate() {
        if size > 32 {
            return Err(BitError::InvalidModel {
                reason: "bucket wider than 32 bits",
            });
        }
        if i > 0 && size < bucket_sizes[i - 1] {
            return Err(BitError::InvalidModel {
                reason: "bucket sizes must be non-decreasing",
            });
        }
        if covered > u64::from(u32::MAX) {
            return Err(BitError::InvalidModel {
                reason: "bucket offsets exceed u32 range",
            });
        }
        covered += 1u64 << size;
    }
    if covered <= u64::from(u32::MAX) {
        return Err(BitError::InvalidModel {
            reason: "buckets do not cover the u32 range",
        });
    }

    let mut kraft: u64 = 0;
    for &len in code_lengths {
        if len == 0 || len > MAX_CODE_LEN {
            return Err(BitError::InvalidModel {
                reason: "code length out of range",
            });
        }
        kraft += 1u64 << (MAX_CODE_LEN - len);
    }
    if kraft > 1u64 << MAX_CODE_LEN {
        return Err(BitError::InvalidModel {
            reason: "code lengths violate the Kraft inequality",
        });
    }
    Ok(())
}
