pub mod block;
pub mod constants;
pub mod csv_stream;
pub mod error;
pub mod reader;

#[cfg(test)]
pub mod testutil;
