//! Low-level bit packing primitives for ghostsync.
//!
//! This crate provides [`BitWriter`] and [`BitReader`] for bit-level encoding and decoding,
//! plus the packed integer model shared by both peers of a replication link.
//!
//! # Design Principles
//!
//! - **No unsafe code** - Safety is paramount.
//! - **Fixed capacity** - Writers never grow; a write that does not fit fails and leaves
//!   the writer untouched.
//! - **No domain knowledge** - This crate knows nothing about entities, ghosts, or ticks.
//! - **Explicit errors** - All failures return structured errors, never panic.
//!
//! # Example
//!
//! ```
//! use bitstream::{BitReader, BitWriter, CompressionModel};
//!
//! let model = CompressionModel::default();
//! let mut buf = [0u8; 16];
//! let mut writer = BitWriter::new(&mut buf);
//! writer.write_bit(true).unwrap();
//! writer.write_packed_uint_delta(105, 100, &model).unwrap();
//! let len = writer.finish();
//!
//! let mut reader = BitReader::new(&buf[..len]);
//! assert!(reader.read_bit().unwrap());
//! assert_eq!(reader.read_packed_uint_delta(100, &model).unwrap(), 105);
//! ```

mod error;
mod model;
mod packed;
mod reader;
mod writer;

pub use error::{BitError, BitResult};
pub use model::{
    CompressionModel, BUCKET_COUNT, DEFAULT_BUCKET_SIZES, DEFAULT_CODE_LENGTHS, MAX_CODE_LEN,
};
pub use packed::{
    dequantize_f32, dequantize_f64, quantize_f32, quantize_f64, zigzag_decode, zigzag_decode_64,
    zigzag_encode, zigzag_encode_64,
};
pub use reader::BitReader;
pub use writer::{BitCheckpoint, BitWriter};
