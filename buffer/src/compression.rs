//! Compress encoded items before they are written to disk.
//!
//! Each item is compressed independently into a self-terminating block, so a reader only needs
//! the block's bytes (and not any neighboring records) to recover the item.

use flate2::{read::GzDecoder, write::GzEncoder};
use std::io::{self, Read, Write};

/// Compresses and decompresses a single encoded item.
pub trait Compressor: Clone + Send + Sync + 'static {
    /// Compress `data` into a self-terminating block.
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>>;

    /// Recover the original bytes from a block produced by [Compressor::compress].
    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>>;
}

/// Compress items as gzip members.
///
/// This is the default format of [crate::file::RecordBuffer] data files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Gzip {
    /// Compression level, from 0 (none) to 9 (best).
    pub level: u32,
}

impl Default for Gzip {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl Compressor for Gzip {
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::new(self.level));
        encoder.write_all(data)?;
        encoder.finish()
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut decoded = Vec::new();
        GzDecoder::new(data).read_to_end(&mut decoded)?;
        Ok(decoded)
    }
}

/// Compress items as `zstd` frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Zstd {
    /// Compression level passed to `zstd`.
    pub level: i32,
}

impl Default for Zstd {
    fn default() -> Self {
        Self { level: 3 }
    }
}

impl Compressor for Zstd {
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        zstd::bulk::compress(data, self.level)
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        zstd::decode_all(data)
    }
}
