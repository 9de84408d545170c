// Axivity CWA reader
// Main library entry point

pub mod core;

// Re-export main types
pub use crate::core::block::{BlockKind, CwaBlock};
pub use crate::core::csv_stream::{CwaCsvStream, ExportOptions};
pub use crate::core::error::{CwaError, Result};
pub use crate::core::reader::{CwaReader, SessionInfo};

#[cfg(test)]
mod tests {
    #[test]
    fn test_constants() {
        use crate::core::constants::*;
        assert_eq!(BLOCK_SIZE, 512);
        assert_eq!(MAX_SAMPLES_PER_BLOCK, 120);
        assert_eq!(&BLOCK_HEADER.to_le_bytes(), b"MD");
        assert_eq!(&BLOCK_DATA.to_le_bytes(), b"AX");
    }
}
