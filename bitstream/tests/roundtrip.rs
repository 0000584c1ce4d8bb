use bitstream::{BitError, BitReader, BitWriter, CompressionModel};

#[test]
fn bounded_writer_roundtrip_bits() {
    let mut buf = [0u8; 8];
    let mut writer = BitWriter::new(&mut buf);
    writer.write_raw_bits(0b1010, 4).unwrap();
    writer.write_raw_bits(0xAB, 8).unwrap();
    let bytes_used = writer.finish();

    let mut reader = BitReader::new(&buf[..bytes_used]);
    assert_eq!(reader.read_raw_bits(4).unwrap(), 0b1010);
    assert_eq!(reader.read_raw_bits(8).unwrap(), 0xAB);
}

#[test]
fn aligned_and_packed_mix() {
    let model = CompressionModel::default();
    let mut buf = [0u8; 64];
    let mut writer = BitWriter::new(&mut buf);
    writer.write_bit(true).unwrap();
    writer.write_packed_uint(300, &model).unwrap();
    writer.align_to_byte().unwrap();
    writer.write_u16_aligned(0xBEEF).unwrap();
    writer.write_varu32(300).unwrap();
    writer.write_vars32(-1).unwrap();
    writer.write_packed_long_delta(-5, 5, &model).unwrap();
    let len = writer.finish();

    let mut reader = BitReader::new(&buf[..len]);
    assert!(reader.read_bit().unwrap());
    assert_eq!(reader.read_packed_uint(&model).unwrap(), 300);
    reader.align_to_byte().unwrap();
    assert_eq!(reader.read_u16_aligned().unwrap(), 0xBEEF);
    assert_eq!(reader.read_varu32().unwrap(), 300);
    assert_eq!(reader.read_vars32().unwrap(), -1);
    assert_eq!(reader.read_packed_long_delta(5, &model).unwrap(), -5);
}

#[test]
fn fill_until_overflow_keeps_everything_written() {
    let model = CompressionModel::default();
    let mut buf = [0u8; 10];
    let mut writer = BitWriter::new(&mut buf);
    let mut count = 0u32;
    loop {
        match writer.write_packed_uint(1000 + count, &model) {
            Ok(()) => count += 1,
            Err(BitError::Overflow { .. }) => break,
            Err(other) => panic!("unexpected error {other}"),
        }
    }
    let len = writer.finish();
    assert!(count > 0);

    let mut reader = BitReader::new(&buf[..len]);
    for i in 0..count {
        assert_eq!(reader.read_packed_uint(&model).unwrap(), 1000 + i);
    }
}

#[test]
fn mismatched_model_is_detectable_by_tables() {
    let custom = CompressionModel::new(
        bitstream::DEFAULT_BUCKET_SIZES,
        [4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4],
    )
    .unwrap();
    assert_ne!(custom, CompressionModel::default());
    assert_eq!(custom.packed_bits(0), 4);
}
