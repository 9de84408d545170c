// Format constants for Axivity CWA files

/// Size of one physical block in the file.
pub const BLOCK_SIZE: usize = 512;

// Block-type markers (little-endian u16 at offset 0)
pub const BLOCK_HEADER: u16 = 0x444D; // "MD"
pub const BLOCK_DATA: u16 = 0x5841; // "AX"

// Data-block sample area: bytes 30..510
pub const SAMPLE_DATA_OFFSET: usize = 30;
pub const SAMPLE_DATA_BYTES: usize = 480;

/// Maximum samples per block (packed encoding, 4 bytes per sample).
pub const MAX_SAMPLES_PER_BLOCK: usize = SAMPLE_DATA_BYTES / 4;
/// Maximum samples per block in the unpacked 3 x i16 encoding.
pub const MAX_UNPACKED_SAMPLES_PER_BLOCK: usize = SAMPLE_DATA_BYTES / 6;

pub const NUM_AXES_PER_SAMPLE: usize = 3;

// Header-block annotation sector 1: bytes 64..512 of the first header block.
// Sector 2 is the full 512 bytes of the following block.
pub const ANNOTATION_OFFSET: usize = 64;

// Device-reported event flags (u8 at offset 22 of a data block)
pub const DATA_EVENT_RESUME: u8 = 0x01;
pub const DATA_EVENT_SINGLE_TAP: u8 = 0x02;
pub const DATA_EVENT_DOUBLE_TAP: u8 = 0x04;
pub const DATA_EVENT_EVENT: u8 = 0x08;
pub const DATA_EVENT_FIFO_OVERFLOW: u8 = 0x10;
pub const DATA_EVENT_BUFFER_OVERFLOW: u8 = 0x20;
pub const DATA_EVENT_UNHANDLED_INTERRUPT: u8 = 0x40;
pub const DATA_EVENT_CHECKSUM_FAIL: u8 = 0x80;

/// Raw axis values are fixed-point with 8 fractional bits (1 unit = 1/256 G).
pub const ACCEL_UNITS_PER_G: f32 = 256.0;

#[cfg(windows)]
pub const LINE_SEPARATOR: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_SEPARATOR: &str = "\n";
