// CWA block decoding: classification, checksum, samples, timestamps

use crate::core::constants::*;
use crate::core::error::{CwaError, Result};
use chrono::{Local, TimeZone};
use std::io::{ErrorKind, Read};

/// Classification of one physical block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Header,
    Data,
    Invalid,
}

/// One decoded physical block.
///
/// A single instance is owned by the reader and reused across decodes; the
/// `valid` flag tracks whether it currently holds a freshly decoded block.
/// `BlockKind::Invalid` marks a block that was read in full but whose content
/// could not be recognized (bad marker or failing checksum) - such blocks are
/// skipped by callers, never a hard error.
#[derive(Debug)]
pub struct CwaBlock {
    buffer: [u8; BLOCK_SIZE],
    valid: bool,
    kind: BlockKind,
    session_id: u32,
    device_id: u16,
    light: u16,
    temperature: u16,
    events: u8,
    battery: u8,
    sample_count: usize,
    sample_values: Vec<i16>,
    timestamp_values: Vec<i64>,
}

impl CwaBlock {
    pub fn new() -> Self {
        Self {
            buffer: [0u8; BLOCK_SIZE],
            valid: false,
            kind: BlockKind::Invalid,
            session_id: 0,
            device_id: 0,
            light: 0,
            temperature: 0,
            events: 0,
            battery: 0,
            sample_count: 0,
            sample_values: Vec::with_capacity(MAX_SAMPLES_PER_BLOCK * NUM_AXES_PER_SAMPLE),
            timestamp_values: Vec::with_capacity(MAX_SAMPLES_PER_BLOCK),
        }
    }

    /// Reads and decodes the next block from the source.
    ///
    /// Returns `Ok(false)` on a clean end-of-stream (zero bytes read). A
    /// non-empty partial block is a `TruncatedBlock` error; any other
    /// malformed content degrades to `BlockKind::Invalid`.
    pub fn read_from<R: Read>(&mut self, source: &mut R) -> Result<bool> {
        self.invalidate();

        let mut got = 0;
        while got < BLOCK_SIZE {
            match source.read(&mut self.buffer[got..]) {
                Ok(0) => break,
                Ok(n) => got += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if got == 0 {
            return Ok(false);
        }
        if got < BLOCK_SIZE {
            return Err(CwaError::TruncatedBlock {
                expected: BLOCK_SIZE,
                got,
            });
        }

        match self.read_u16(0) {
            BLOCK_HEADER => {
                self.kind = BlockKind::Header;
                self.device_id = self.read_u16(5);
                self.session_id = self.read_u32(7);
            }
            BLOCK_DATA if self.word_sum() == 0 => {
                self.kind = BlockKind::Data;
                self.decode_data();
            }
            _ => self.kind = BlockKind::Invalid,
        }

        self.valid = true;
        Ok(true)
    }

    fn decode_data(&mut self) {
        self.device_id = self.read_u16(4);
        self.session_id = self.read_u32(6);
        let timestamp = self.read_u32(14);
        self.light = self.read_u16(18) & 0x03FF;
        self.temperature = self.read_u16(20) & 0x03FF;
        self.events = self.buffer[22];
        self.battery = self.buffer[23];
        let rate_code = self.buffer[24];
        let num_axes_bps = self.buffer[25];
        let timestamp_offset = self.read_u16(26) as i16;
        let raw_count = self.read_u16(28) as usize;

        // Encoding 0x32 is 3 x i16 per sample; anything else is the packed
        // 10-bit-per-axis DWORD encoding.
        let unpacked = num_axes_bps == 0x32;
        let max_count = if unpacked {
            MAX_UNPACKED_SAMPLES_PER_BLOCK
        } else {
            MAX_SAMPLES_PER_BLOCK
        };
        self.sample_count = raw_count.min(max_count);

        self.sample_values.clear();
        for i in 0..self.sample_count {
            if unpacked {
                let off = SAMPLE_DATA_OFFSET + 6 * i;
                self.sample_values.push(self.read_u16(off) as i16);
                self.sample_values.push(self.read_u16(off + 2) as i16);
                self.sample_values.push(self.read_u16(off + 4) as i16);
            } else {
                let (x, y, z) = unpack_sample(self.read_u32(SAMPLE_DATA_OFFSET + 4 * i));
                self.sample_values.push(x);
                self.sample_values.push(y);
                self.sample_values.push(z);
            }
        }

        // Per-sample timestamps: interpolate between the block's start and
        // end anchors. rate code 0 marks the old format, which carries no
        // end anchor; every sample then repeats the block timestamp.
        let time = cwa_timestamp_to_millis(timestamp);
        self.timestamp_values.clear();
        if rate_code == 0 || self.sample_count == 0 {
            self.timestamp_values
                .extend(std::iter::repeat(time).take(self.sample_count));
        } else {
            let freq = 3200.0 / (1u32 << (15 - (rate_code & 0x0F) as u32)) as f64;
            let start = time - (1000.0 * timestamp_offset as f64 / freq) as i64;
            let end = start + (1000.0 * self.sample_count as f64 / freq) as i64;
            let n = self.sample_count as i64;
            for i in 0..n {
                self.timestamp_values.push(start + i * (end - start) / n);
            }
        }
    }

    /// 16-bit word sum over the whole block; a stored checksum makes it zero.
    fn word_sum(&self) -> u16 {
        let mut sum = 0u16;
        for i in 0..BLOCK_SIZE / 2 {
            sum = sum.wrapping_add(self.read_u16(2 * i));
        }
        sum
    }

    fn read_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes(self.buffer[offset..offset + 2].try_into().unwrap())
    }

    fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.buffer[offset..offset + 4].try_into().unwrap())
    }

    /// Marks the block as consumed; the next `read_from` decodes fresh bytes.
    pub fn invalidate(&mut self) {
        self.valid = false;
        self.kind = BlockKind::Invalid;
        self.sample_count = 0;
        self.sample_values.clear();
        self.timestamp_values.clear();
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn is_data_block(&self) -> bool {
        self.valid && self.kind == BlockKind::Data
    }

    /// Raw bytes of the block, used for the header annotation sectors.
    pub fn raw(&self) -> &[u8; BLOCK_SIZE] {
        &self.buffer
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn device_id(&self) -> u16 {
        self.device_id
    }

    pub fn light(&self) -> u16 {
        self.light
    }

    pub fn temperature(&self) -> u16 {
        self.temperature
    }

    /// Temperature reading converted to degrees Celsius.
    pub fn temperature_celsius(&self) -> f32 {
        (self.temperature as i32 * 75 - 12800) as f32 / 256.0
    }

    pub fn events(&self) -> u8 {
        self.events
    }

    pub fn battery(&self) -> u8 {
        self.battery
    }

    pub fn num_samples(&self) -> usize {
        self.sample_count
    }

    /// Decoded axis values, `NUM_AXES_PER_SAMPLE` per sample (x, y, z).
    pub fn sample_values(&self) -> &[i16] {
        &self.sample_values
    }

    /// Interpolated per-sample timestamps, milliseconds since the epoch.
    pub fn timestamp_values(&self) -> &[i64] {
        &self.timestamp_values
    }

    /// Timestamp of the block's first sample, if any.
    pub fn start_time_millis(&self) -> Option<i64> {
        self.timestamp_values.first().copied()
    }
}

impl Default for CwaBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes one packed sample DWORD into signed axis values.
///
/// Layout: `eezzzzzzzzzzyyyyyyyyyyxxxxxxxxxx` - three 10-bit signed values
/// shifted left by the 2-bit exponent `e`.
fn unpack_sample(value: u32) -> (i16, i16, i16) {
    let exp = (value >> 30) as i16;
    let x = (((value << 6) & 0xFFC0) as u16 as i16) >> (6 - exp);
    let y = (((value >> 4) & 0xFFC0) as u16 as i16) >> (6 - exp);
    let z = (((value >> 14) & 0xFFC0) as u16 as i16) >> (6 - exp);
    (x, y, z)
}

/// Converts a packed CWA timestamp to milliseconds since the epoch,
/// interpreted in the system local time zone. Field layout (LSB first):
/// seconds 0..6, minutes 6..12, hours 12..17, day 17..22, month 22..26,
/// year-2000 26..32. Undecodable field combinations map to 0.
pub fn cwa_timestamp_to_millis(packed: u32) -> i64 {
    let year = ((packed >> 26) & 0x3F) as i32 + 2000;
    let month = (packed >> 22) & 0x0F;
    let day = (packed >> 17) & 0x1F;
    let hours = (packed >> 12) & 0x1F;
    let minutes = (packed >> 6) & 0x3F;
    let seconds = packed & 0x3F;
    Local
        .with_ymd_and_hms(year, month, day, hours, minutes, seconds)
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(0)
}
