// Streaming CWA to CSV conversion
//
// Pull-based: the caller drives the pipeline through `std::io::Read`. At
// most one block's worth of samples is expanded into the output buffer at a
// time, so memory stays bounded regardless of file size.

use crate::core::constants::*;
use crate::core::error::Result;
use crate::core::reader::{CwaReader, SessionInfo};
use chrono::{Local, TimeZone};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Read;
use tracing::warn;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

// Blank columns for t,x,y,z,L,T,B,E so metadata rows stay structurally
// valid records followed by NAME,VALUE.
const METADATA_ROW_PREFIX: &str = ",,,,,,,,";

// Event letter codes in their fixed output order.
const EVENT_CODES: &[(u8, char)] = &[
    (DATA_EVENT_RESUME, 'r'),
    (DATA_EVENT_SINGLE_TAP, 's'),
    (DATA_EVENT_DOUBLE_TAP, 'd'),
    (DATA_EVENT_EVENT, 'e'),
    (DATA_EVENT_FIFO_OVERFLOW, 'F'),
    (DATA_EVENT_BUFFER_OVERFLOW, 'B'),
    (DATA_EVENT_UNHANDLED_INTERRUPT, 'I'),
    (DATA_EVENT_CHECKSUM_FAIL, 'X'),
];

/// Column selection for the CSV output. The default columns are always
/// `timestamp,x,y,z`; each flag appends one optional column, and `metadata`
/// prepends the annotation preamble.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportOptions {
    pub light: bool,
    pub temperature: bool,
    pub battery: bool,
    pub events: bool,
    pub metadata: bool,
}

impl ExportOptions {
    pub const NONE: ExportOptions = ExportOptions {
        light: false,
        temperature: false,
        battery: false,
        events: false,
        metadata: false,
    };

    pub fn all() -> Self {
        ExportOptions {
            light: true,
            temperature: true,
            battery: true,
            events: true,
            metadata: true,
        }
    }
}

/// Converts a CWA byte source into a CSV byte stream.
///
/// Lines are selected by the window `(first_line, line_skip, line_count)`
/// evaluated on a running sample index that counts every decoded sample,
/// emitted or not. `line_count < 0` means unbounded; note the bound is
/// `line < line_count * line_skip`, preserved verbatim from the original
/// converter.
pub struct CwaCsvStream<R> {
    reader: CwaReader<R>,
    options: ExportOptions,
    first_line: i64,
    line_skip: i64,
    line_count: i64,
    line: i64,
    events: u8,
    out: Vec<u8>,
    out_pos: usize,
    scratch: String,
    finished: bool,
}

impl<R: Read> CwaCsvStream<R> {
    /// Wraps a byte source and performs the initial skip to the first data
    /// block. A failure during that metadata scan is logged, not fatal;
    /// the caller may still attempt reads.
    pub fn new(
        source: R,
        first_line: i64,
        line_skip: i64,
        line_count: i64,
        options: ExportOptions,
    ) -> Self {
        let mut reader = CwaReader::new(source);
        if let Err(e) = reader.skip_non_data_blocks() {
            warn!("skipping non-data blocks failed during setup: {}", e);
        }

        let mut stream = Self {
            reader,
            options,
            first_line: first_line.max(0),
            line_skip: line_skip.max(1),
            line_count,
            line: 0,
            events: 0,
            out: Vec::with_capacity(MAX_SAMPLES_PER_BLOCK * 128),
            out_pos: 0,
            scratch: String::new(),
            finished: false,
        };
        if options.metadata {
            stream.queue_metadata();
        }
        stream
    }

    /// Queues the metadata preamble ahead of all sample rows.
    fn queue_metadata(&mut self) {
        if let Some(device_id) = self.reader.device_id() {
            let _ = write!(
                self.scratch,
                "{}deviceId,{}{}",
                METADATA_ROW_PREFIX, device_id, LINE_SEPARATOR
            );
        }
        for (key, value) in self.reader.annotations() {
            let _ = write!(
                self.scratch,
                "{}{},{}{}",
                METADATA_ROW_PREFIX, key, value, LINE_SEPARATOR
            );
        }
        self.flush_scratch();
    }

    /// Expands the next data block into the output buffer. Returns false
    /// when the reader is exhausted; a true return does not guarantee new
    /// bytes, since a whole block can fall outside the window.
    pub fn fill_output_buffer(&mut self) -> Result<bool> {
        if self.finished {
            return Ok(false);
        }

        // Mirror the reader's skip: consume anything that is not a data
        // block. Headers seen past setup contribute no metadata.
        loop {
            match self.reader.peek_block()? {
                None => {
                    self.finished = true;
                    return Ok(false);
                }
                Some(block) if block.is_data_block() => break,
                Some(_) => {}
            }
            self.reader.read_block()?;
        }

        let block = match self.reader.peek_block()? {
            Some(block) => block,
            None => {
                self.finished = true;
                return Ok(false);
            }
        };

        let num_samples = block.num_samples();
        let samples = block.sample_values();
        let timestamps = block.timestamp_values();
        let block_events = block.events();
        let light = block.light();
        let temperature = block.temperature();
        let battery = block.battery();

        for i in 0..num_samples {
            let x = samples[NUM_AXES_PER_SAMPLE * i] as f32 / ACCEL_UNITS_PER_G;
            let y = samples[NUM_AXES_PER_SAMPLE * i + 1] as f32 / ACCEL_UNITS_PER_G;
            let z = samples[NUM_AXES_PER_SAMPLE * i + 2] as f32 / ACCEL_UNITS_PER_G;

            // Accumulate events until a line is actually emitted
            self.events |= block_events;

            if self.line >= self.first_line
                && self.line % self.line_skip == 0
                && (self.line_count < 0 || self.line < self.line_count * self.line_skip)
            {
                let _ = write!(
                    self.scratch,
                    "{},{},{},{}",
                    format_timestamp(timestamps[i]),
                    x,
                    y,
                    z
                );
                if self.options.light {
                    let _ = write!(self.scratch, ",{}", light);
                }
                if self.options.temperature {
                    let _ = write!(self.scratch, ",{}", temperature);
                }
                if self.options.battery {
                    let _ = write!(self.scratch, ",{}", battery);
                }
                if self.options.events {
                    self.scratch.push(',');
                    for &(flag, code) in EVENT_CODES {
                        if self.events & flag != 0 {
                            self.scratch.push(code);
                        }
                    }
                    self.events = 0;
                }
                self.scratch.push_str(LINE_SEPARATOR);
            }

            self.line += 1;
        }

        self.flush_scratch();
        // Consume the expanded block; the next fill advances to the
        // following one.
        self.reader.read_block()?;
        Ok(true)
    }

    fn flush_scratch(&mut self) {
        if self.out_pos == self.out.len() {
            self.out.clear();
            self.out_pos = 0;
        }
        self.out.extend_from_slice(self.scratch.as_bytes());
        self.scratch.clear();
    }

    /// Bytes currently buffered and not yet read.
    pub fn available(&self) -> usize {
        self.out.len() - self.out_pos
    }

    /// Running sample index (counts every decoded sample).
    pub fn line_index(&self) -> i64 {
        self.line
    }

    pub fn device_id(&self) -> Option<u16> {
        self.reader.device_id()
    }

    pub fn session_id(&self) -> Option<u32> {
        self.reader.session_id()
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        self.reader.annotations()
    }

    pub fn session_info(&self) -> SessionInfo {
        self.reader.session_info()
    }
}

impl<R: Read> Read for CwaCsvStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        // Keep filling until bytes appear: a block whose samples all fall
        // outside the window contributes nothing but does not end the
        // stream.
        while self.out_pos == self.out.len() {
            if !self.fill_output_buffer()? {
                return Ok(0);
            }
        }
        let n = buf.len().min(self.out.len() - self.out_pos);
        buf[..n].copy_from_slice(&self.out[self.out_pos..self.out_pos + n]);
        self.out_pos += n;
        Ok(n)
    }
}

/// Formats a milliseconds-since-epoch value in the system local time zone.
fn format_timestamp(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}
