//! A file-backed, append-only buffer of variable length items.
//!
//! [RecordBuffer] stores an ordered sequence of items in two files: a `data` file holding each
//! item as a compressed record and an `index` file holding the position of every record. Any item
//! can be read by its position (the order in which it was appended, starting from 0) with two
//! seeks, without scanning the data file.
//!
//! # Format
//!
//! The `data` file is a concatenation of records, each prefixed by the length of its compressed
//! payload:
//!
//! ```text
//! +---+---+---+---+---+---+---+---+---+---+---+
//! |  Length (u32) |    Payload    |  Length   | ...
//! +---+---+---+---+---+---+---+---+---+---+---+
//!
//! Length = big-endian size of Payload, Payload = compress(encode(item))
//! ```
//!
//! The `index` file is a concatenation of big-endian `i64` offsets, where entry `i` is the
//! position in the `data` file at which record `i` begins:
//!
//! ```text
//! +-------+-------+-------+-------+
//! |  O_0  |  O_1  |  ...  | O_n-1 |
//! +-------+-------+-------+-------+
//!
//! O_0 = 0, O_i+1 = O_i + 4 + Length_i
//! ```
//!
//! Neither file has a header, footer, or checksum. The number of items is always the length of
//! the `index` file divided by 8, so there is no other metadata to keep in sync and the files can
//! be re-opened by a later process.
//!
//! If no `index` path is configured, it is derived from the `data` path by replacing its extension
//! with `.index` (e.g. `events.bin` is indexed by `events.index`).
//!
//! # Appends
//!
//! An append writes the new records to the `data` file before writing their index entries. If the
//! process stops in between, the orphaned records are not referenced by the `index` file, remain
//! invisible, and are overwritten by the next append. [RecordBuffer::add_all] writes the records of
//! an entire batch before any of its index entries.
//!
//! # Corruption
//!
//! Records that cannot be read back (an offset outside of the `data` file, a truncated record, a
//! payload that fails to decompress or decode) are reported by [RecordBuffer::try_get] as an
//! [Error] and by [RecordBuffer::get] (after logging) as a missing item. A damaged record never
//! affects any other record.
//!
//! # Concurrency
//!
//! Each [RecordBuffer] guards both files with a single fair reader/writer lock: reads proceed
//! concurrently, while appends and resets are exclusive. The lock does not extend to other
//! processes, which must not open the same files concurrently.
//!
//! # Example
//!
//! ```rust
//! use commonware_buffer::{compression::Gzip, file::{Config, RecordBuffer}};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let buffer = RecordBuffer::<u64>::init(Config {
//!     data: dir.path().join("items.bin"),
//!     index: None,
//!     codec_config: (),
//!     compressor: Gzip::default(),
//! }).unwrap();
//!
//! buffer.add_all(&[1, 2, 3]).unwrap();
//! assert_eq!(buffer.size(), 3);
//! assert_eq!(buffer.get(1), Some(2));
//! assert_eq!(buffer.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
//! ```

mod storage;

pub use storage::RecordBuffer;

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when interacting with a [RecordBuffer].
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] commonware_codec::Error),
    #[error("decompression failed: {0}")]
    Decompression(std::io::Error),
    #[error("index entry missing: {0}")]
    IndexOutOfBounds(u64),
    #[error("invalid offset {0} for item {1}")]
    InvalidOffset(i64, u64),
    #[error("no record at offset {0} (data length {1})")]
    RecordMissing(u64, u64),
    #[error("record at offset {0} truncated (expected {1} bytes)")]
    RecordTruncated(u64, u32),
    #[error("record too large: {0}")]
    RecordTooLarge(usize),
    #[error("offset overflow")]
    OffsetOverflow,
    #[error("not a directory: {0:?}")]
    NotADirectory(PathBuf),
    #[error("not writable: {0:?}")]
    ReadOnly(PathBuf),
}

impl Error {
    /// Whether the error was caused by data on disk that cannot be read back.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::Codec(_)
                | Error::Decompression(_)
                | Error::IndexOutOfBounds(_)
                | Error::InvalidOffset(..)
                | Error::RecordMissing(..)
                | Error::RecordTruncated(..)
        )
    }
}

/// Configuration for [RecordBuffer] storage.
#[derive(Clone)]
pub struct Config<C, Z> {
    /// Path of the file holding the records.
    pub data: PathBuf,

    /// Path of the file holding the record offsets.
    ///
    /// If `None`, the path is derived from `data` (see the [module docs](self)).
    pub index: Option<PathBuf>,

    /// The codec configuration to use for decoding items.
    pub codec_config: C,

    /// The compressor applied to each encoded item.
    pub compressor: Z,
}
