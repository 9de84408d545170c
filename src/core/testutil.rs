// Synthetic CWA block builders for tests

use crate::core::constants::*;

/// Packs calendar fields into the CWA timestamp layout.
pub fn pack_timestamp(year: u32, month: u32, day: u32, hours: u32, minutes: u32, seconds: u32) -> u32 {
    ((year - 2000) << 26) | (month << 22) | (day << 17) | (hours << 12) | (minutes << 6) | seconds
}

/// Field set for building a synthetic data block (unpacked 3 x i16 encoding).
pub struct TestDataBlock {
    pub session_id: u32,
    pub device_id: u16,
    pub timestamp: u32,
    pub light: u16,
    pub temperature: u16,
    pub events: u8,
    pub battery: u8,
    pub rate_code: u8,
    pub timestamp_offset: i16,
    pub samples: Vec<(i16, i16, i16)>,
    pub override_count: Option<u16>,
}

impl TestDataBlock {
    pub fn new(session_id: u32, samples: &[(i16, i16, i16)]) -> Self {
        Self {
            session_id,
            device_id: 42,
            timestamp: pack_timestamp(2014, 5, 13, 12, 30, 45),
            light: 0,
            temperature: 0,
            events: 0,
            battery: 0,
            rate_code: 0x0A, // 100 Hz
            timestamp_offset: 0,
            samples: samples.to_vec(),
            override_count: None,
        }
    }
}

/// Serializes a data block with a valid checksum word.
pub fn data_block(spec: &TestDataBlock) -> Vec<u8> {
    let mut b = vec![0u8; BLOCK_SIZE];
    b[0..2].copy_from_slice(&BLOCK_DATA.to_le_bytes());
    b[2..4].copy_from_slice(&508u16.to_le_bytes());
    b[4..6].copy_from_slice(&spec.device_id.to_le_bytes());
    b[6..10].copy_from_slice(&spec.session_id.to_le_bytes());
    b[14..18].copy_from_slice(&spec.timestamp.to_le_bytes());
    b[18..20].copy_from_slice(&spec.light.to_le_bytes());
    b[20..22].copy_from_slice(&spec.temperature.to_le_bytes());
    b[22] = spec.events;
    b[23] = spec.battery;
    b[24] = spec.rate_code;
    b[25] = 0x32; // 3 axes, 2 bytes per axis
    b[26..28].copy_from_slice(&spec.timestamp_offset.to_le_bytes());
    let count = spec.override_count.unwrap_or(spec.samples.len() as u16);
    b[28..30].copy_from_slice(&count.to_le_bytes());
    for (i, &(x, y, z)) in spec.samples.iter().enumerate() {
        let off = SAMPLE_DATA_OFFSET + 6 * i;
        b[off..off + 2].copy_from_slice(&x.to_le_bytes());
        b[off + 2..off + 4].copy_from_slice(&y.to_le_bytes());
        b[off + 4..off + 6].copy_from_slice(&z.to_le_bytes());
    }
    finish_checksum(&mut b);
    b
}

/// Stores the checksum word that makes the block's 16-bit word sum zero.
pub fn finish_checksum(block: &mut [u8]) {
    block[510] = 0;
    block[511] = 0;
    let mut sum = 0u16;
    for i in 0..BLOCK_SIZE / 2 {
        sum = sum.wrapping_add(u16::from_le_bytes([block[2 * i], block[2 * i + 1]]));
    }
    block[510..512].copy_from_slice(&sum.wrapping_neg().to_le_bytes());
}

/// Serializes a two-sector logical header. `sector1` text lands in the
/// annotation area of the first block (bytes 64..), `sector2` text at the
/// start of the second block; both are padded with spaces, which the
/// metadata filter drops.
pub fn header_blocks(session_id: u32, device_id: u16, sector1: &str, sector2: &str) -> Vec<u8> {
    let mut first = vec![b' '; BLOCK_SIZE];
    first[0..2].copy_from_slice(&BLOCK_HEADER.to_le_bytes());
    first[2..4].copy_from_slice(&1020u16.to_le_bytes());
    first[4] = 0;
    first[5..7].copy_from_slice(&device_id.to_le_bytes());
    first[7..11].copy_from_slice(&session_id.to_le_bytes());
    first[11..ANNOTATION_OFFSET].fill(b' ');
    assert!(sector1.len() <= BLOCK_SIZE - ANNOTATION_OFFSET);
    first[ANNOTATION_OFFSET..ANNOTATION_OFFSET + sector1.len()]
        .copy_from_slice(sector1.as_bytes());

    let mut second = vec![b' '; BLOCK_SIZE];
    assert!(sector2.len() <= BLOCK_SIZE);
    second[..sector2.len()].copy_from_slice(sector2.as_bytes());

    let mut out = first;
    out.extend_from_slice(&second);
    out
}
