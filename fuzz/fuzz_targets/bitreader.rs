#![no_main]

use bitstream::{BitReader, CompressionModel};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let model = CompressionModel::default();
    let mut reader = BitReader::new(data);
    let mut idx = 0usize;

    // Input bytes pick a bounded sequence of reads over the same input.
    while idx < data.len() && idx < 1024 {
        let op = data[idx] % 8;
        idx += 1;

        match op {
            0 => {
                let _ = reader.read_bit();
            }
            1 => {
                let bits = (data[idx - 1] % 64).saturating_add(1);
                let _ = reader.read_bits(bits);
            }
            2 => {
                let _ = reader.align_to_byte();
            }
            3 => {
                let _ = reader.read_u32_aligned();
            }
            4 => {
                let _ = reader.read_packed_uint(&model);
            }
            5 => {
                let _ = reader.read_packed_int_delta(i32::from(data[idx - 1]), &model);
            }
            6 => {
                let _ = reader.read_packed_ulong(&model);
            }
            _ => {
                let _ = reader.read_raw_float_delta(1.0);
            }
        }
    }
});
