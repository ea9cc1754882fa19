use super::{Config, Error};
use crate::{compression::Compressor, Buffer, Iter};
use bytes::{Buf, BufMut};
use commonware_codec::{Codec, Error as CodecError};
use parking_lot::RwLock;
use prometheus_client::{metrics::counter::Counter, registry::Registry};
use std::{
    fmt,
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Read, Seek, SeekFrom, Write},
    marker::PhantomData,
    path::{Path, PathBuf},
};
use tracing::{debug, error, trace, warn};

/// Size of an index entry (a big-endian `i64` offset into the data file).
const OFFSET_SIZE: u64 = 8;

/// Size of the big-endian `u32` length prefix preceding each record.
const LENGTH_SIZE: u64 = 4;

/// Extension given to an index file derived from the data file.
const INDEX_EXTENSION: &str = "index";

/// Derive the index file of `data` by replacing its extension with [INDEX_EXTENSION].
///
/// A file name without an extension (or consisting only of a leading-dot name, like `.items`)
/// is kept as is and the extension appended.
fn index_path(data: &Path) -> PathBuf {
    let mut name = data.file_stem().unwrap_or(data.as_os_str()).to_os_string();
    name.push(".");
    name.push(INDEX_EXTENSION);
    data.with_file_name(name)
}

/// Ensure the parent directory of `path` exists and that `path`, if present, can be written.
fn prepare(path: &Path) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if parent.exists() {
            if !parent.is_dir() {
                return Err(Error::NotADirectory(parent.to_path_buf()));
            }
        } else {
            fs::create_dir_all(parent)?;
            debug!(?parent, "created directory");
        }
    }
    if path.is_file() && fs::metadata(path)?.permissions().readonly() {
        return Err(Error::ReadOnly(path.to_path_buf()));
    }
    Ok(())
}

/// Open `path` for reading, returning `None` if it does not exist.
fn open_read(path: &Path) -> Result<Option<File>, Error> {
    match File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(Error::Io(err)),
    }
}

/// Open `path` for reading and writing, creating it if it does not exist.
fn open_write(path: &Path) -> Result<File, Error> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    Ok(file)
}

/// Remove `path`, returning whether it existed.
fn remove(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Read the data file offset of the item at `position`.
fn read_offset(index: &mut File, position: u64) -> Result<u64, Error> {
    let start = position
        .checked_mul(OFFSET_SIZE)
        .ok_or(Error::OffsetOverflow)?;
    if index.metadata()?.len() < start.saturating_add(OFFSET_SIZE) {
        return Err(Error::IndexOutOfBounds(position));
    }
    let mut buf = [0u8; OFFSET_SIZE as usize];
    index.seek(SeekFrom::Start(start))?;
    index.read_exact(&mut buf)?;
    let offset = buf.as_slice().get_i64();
    u64::try_from(offset).map_err(|_| Error::InvalidOffset(offset, position))
}

/// Read the length prefix of the record starting at `offset`.
fn read_length(data: &mut File, offset: u64, data_len: u64) -> Result<u32, Error> {
    if data_len < offset.saturating_add(LENGTH_SIZE) {
        return Err(Error::RecordMissing(offset, data_len));
    }
    let mut buf = [0u8; LENGTH_SIZE as usize];
    data.seek(SeekFrom::Start(offset))?;
    data.read_exact(&mut buf)?;
    Ok(buf.as_slice().get_u32())
}

/// Read the (still compressed) payload of the record starting at `offset`.
fn read_record(data: &mut File, offset: u64) -> Result<Vec<u8>, Error> {
    let data_len = data.metadata()?.len();
    let len = read_length(data, offset, data_len)?;
    if data_len < offset + LENGTH_SIZE + len as u64 {
        return Err(Error::RecordTruncated(offset, len));
    }

    // The cursor already sits past the length prefix
    let mut payload = vec![0u8; len as usize];
    data.read_exact(&mut payload)?;
    Ok(payload)
}

/// Position at which the record following the last indexed one starts.
///
/// Anything past this point in the data file belongs to no index entry (for example, an append
/// interrupted before its offsets were written) and is overwritten by the next append.
fn next_offset(index: &mut File, data: &mut File, count: u64) -> Result<u64, Error> {
    if count == 0 {
        return Ok(0);
    }
    let last = read_offset(index, count - 1)?;
    let data_len = data.metadata()?.len();
    let len = read_length(data, last, data_len)?;
    let next = last
        .checked_add(LENGTH_SIZE + len as u64)
        .ok_or(Error::OffsetOverflow)?;

    // Appending past a short data file would leave a gap that no read can cross
    if data_len < next {
        return Err(Error::RecordTruncated(last, len));
    }
    Ok(next)
}

/// An append-only buffer of items persisted in a data file and addressed through an index file.
///
/// All state lives on disk: the number of items is always derived from the length of the index
/// file, so a [RecordBuffer] may be dropped and re-initialized over the same files at any time.
/// A single reader/writer lock guards both files. Reads share it, appends and resets hold it
/// exclusively.
pub struct RecordBuffer<V: Codec, Z: Compressor = crate::compression::Gzip> {
    data: PathBuf,
    index: PathBuf,

    codec_config: V::Cfg,
    compressor: Z,

    lock: RwLock<()>,

    // Metrics
    appended: Counter,
    gets: Counter,
    corrupted: Counter,
    resets: Counter,

    _item: PhantomData<V>,
}

impl<V: Codec, Z: Compressor> RecordBuffer<V, Z> {
    /// Initialize a new [RecordBuffer] instance.
    ///
    /// The parent directories of both files are created if missing. The files themselves are
    /// only created by the first append.
    pub fn init(cfg: Config<V::Cfg, Z>) -> Result<Self, Error> {
        let index = cfg.index.unwrap_or_else(|| index_path(&cfg.data));
        prepare(&cfg.data)?;
        prepare(&index)?;

        Ok(Self {
            data: cfg.data,
            index,
            codec_config: cfg.codec_config,
            compressor: cfg.compressor,
            lock: RwLock::new(()),
            appended: Counter::default(),
            gets: Counter::default(),
            corrupted: Counter::default(),
            resets: Counter::default(),
            _item: PhantomData,
        })
    }

    /// Register the buffer's metrics with `registry`.
    pub fn register(&self, registry: &mut Registry) {
        registry.register("appended", "Number of items appended", self.appended.clone());
        registry.register("gets", "Number of items requested", self.gets.clone());
        registry.register(
            "corrupted",
            "Number of items that could not be read back",
            self.corrupted.clone(),
        );
        registry.register("resets", "Number of resets", self.resets.clone());
    }

    /// Path of the data file.
    pub fn data_path(&self) -> &Path {
        &self.data
    }

    /// Path of the index file.
    pub fn index_path(&self) -> &Path {
        &self.index
    }

    /// Return the number of items in the buffer.
    ///
    /// Any failure to inspect the index file is logged and reported as an empty buffer.
    pub fn size(&self) -> u64 {
        let len = {
            let _guard = self.lock.read();
            open_read(&self.index).and_then(|file| match file {
                Some(file) => Ok(file.metadata()?.len()),
                None => Ok(0),
            })
        };
        match len {
            Ok(len) => {
                if len % OFFSET_SIZE != 0 {
                    warn!(
                        path = ?self.index,
                        len,
                        "index length is not a multiple of entry size"
                    );
                }
                len / OFFSET_SIZE
            }
            Err(err) => {
                debug!(?err, "couldn't retrieve size");
                0
            }
        }
    }

    /// Read the item at `index`.
    ///
    /// Returns `Ok(None)` if no such item exists (including when no files have been written yet)
    /// and an error if the item exists but cannot be read back.
    pub fn try_get(&self, index: u64) -> Result<Option<V>, Error> {
        self.gets.inc();
        let payload = {
            let _guard = self.lock.read();
            let Some(mut index_file) = open_read(&self.index)? else {
                return Ok(None);
            };
            let Some(mut data_file) = open_read(&self.data)? else {
                return Ok(None);
            };
            let count = index_file.metadata()?.len() / OFFSET_SIZE;
            if index >= count {
                return Ok(None);
            }
            let offset = read_offset(&mut index_file, index)?;
            read_record(&mut data_file, offset)?
        };

        let decompressed = self
            .compressor
            .decompress(&payload)
            .map_err(Error::Decompression)?;
        let item = V::decode_cfg(decompressed.as_slice(), &self.codec_config)?;
        Ok(Some(item))
    }

    /// Read the item at `index`, returning `None` if it is absent or cannot be read back.
    ///
    /// Failures are logged rather than returned, so a damaged record never interrupts a scan over
    /// the rest of the buffer.
    pub fn get(&self, index: u64) -> Option<V> {
        let err = match self.try_get(index) {
            Ok(item) => return item,
            Err(err) => err,
        };
        if err.is_corruption() {
            self.corrupted.inc();
        }
        match &err {
            Error::IndexOutOfBounds(_) => {
                error!(index, ?err, "index entry vanished after range check")
            }
            Error::Codec(CodecError::EndOfBuffer | CodecError::ExtraData(_)) => {
                warn!(index, ?err, "stored item does not match the requested type")
            }
            Error::Codec(_) | Error::Decompression(_) => {
                warn!(index, ?err, "couldn't decode item")
            }
            _ => warn!(index, ?err, "couldn't retrieve item"),
        }
        None
    }

    /// Append `item` to the end of the buffer.
    pub fn add(&self, item: &V) -> Result<(), Error> {
        self.append(std::slice::from_ref(item))
    }

    /// Append all `items` to the end of the buffer, in order.
    ///
    /// Records are written to the data file before any of their index entries, so either every
    /// item becomes visible or (if writing the data file fails) none of them do.
    pub fn add_all(&self, items: &[V]) -> Result<(), Error> {
        if items.is_empty() {
            return Ok(());
        }
        self.append(items)
    }

    fn append(&self, items: &[V]) -> Result<(), Error> {
        let result = self.write(items);
        match &result {
            Ok(position) => {
                self.appended.inc_by(items.len() as u64);
                trace!(position, items = items.len(), "appended items");
            }
            Err(err) => warn!(items = items.len(), ?err, "couldn't write items"),
        }
        result.map(|_| ())
    }

    /// Write `items` and return the position of the first one.
    fn write(&self, items: &[V]) -> Result<u64, Error> {
        // Encode and compress everything before taking the lock
        let mut records: Vec<u8> = Vec::new();
        let mut lengths = Vec::with_capacity(items.len());
        for item in items {
            let compressed = self.compressor.compress(&item.encode())?;
            let len = u32::try_from(compressed.len())
                .map_err(|_| Error::RecordTooLarge(compressed.len()))?;
            records.put_u32(len);
            records.put_slice(&compressed);
            lengths.push(len);
        }

        let _guard = self.lock.write();
        let mut index_file = open_write(&self.index)?;
        let mut data_file = open_write(&self.data)?;

        // A trailing partial index entry (if any) is ignored and overwritten
        let count = index_file.metadata()?.len() / OFFSET_SIZE;
        let start = next_offset(&mut index_file, &mut data_file, count)?;

        let mut offsets: Vec<u8> = Vec::with_capacity(lengths.len() * OFFSET_SIZE as usize);
        let mut offset = start;
        for len in lengths {
            let entry = i64::try_from(offset).map_err(|_| Error::OffsetOverflow)?;
            offsets.put_i64(entry);
            offset = offset
                .checked_add(LENGTH_SIZE + len as u64)
                .ok_or(Error::OffsetOverflow)?;
        }

        data_file.seek(SeekFrom::Start(start))?;
        data_file.write_all(&records)?;
        data_file.flush()?;

        index_file.seek(SeekFrom::Start(count * OFFSET_SIZE))?;
        index_file.write_all(&offsets)?;
        index_file.flush()?;

        Ok(count)
    }

    /// Remove all items by deleting both files.
    ///
    /// The index file is removed first, so the buffer is empty from that point on even if the
    /// data file cannot be removed. Files that do not exist are not an error.
    pub fn reset(&self) -> Result<(), Error> {
        let (index, data) = {
            let _guard = self.lock.write();
            (remove(&self.index), remove(&self.data))
        };
        for (path, result) in [(&self.index, &index), (&self.data, &data)] {
            match result {
                Ok(true) => {}
                Ok(false) => debug!(?path, "nothing to remove"),
                Err(err) => warn!(?path, ?err, "couldn't remove file"),
            }
        }
        index?;
        data?;
        self.resets.inc();
        Ok(())
    }

    /// Always `false`: the buffer has no capacity limit (and free disk space is not checked).
    pub fn is_full(&self) -> bool {
        false
    }

    /// Iterate over the items in the buffer, starting from position 0.
    pub fn iter(&self) -> Iter<'_, Self> {
        Iter::new(self)
    }
}

impl<V: Codec, Z: Compressor> Buffer for RecordBuffer<V, Z> {
    type Item = V;
    type Error = Error;

    fn get(&self, index: u64) -> Option<V> {
        RecordBuffer::get(self, index)
    }

    fn size(&self) -> u64 {
        RecordBuffer::size(self)
    }

    fn add(&self, item: &V) -> Result<(), Error> {
        RecordBuffer::add(self, item)
    }

    fn add_all(&self, items: &[V]) -> Result<(), Error> {
        RecordBuffer::add_all(self, items)
    }

    fn reset(&self) -> Result<(), Error> {
        RecordBuffer::reset(self)
    }

    fn is_full(&self) -> bool {
        RecordBuffer::is_full(self)
    }
}

impl<'a, V: Codec, Z: Compressor> IntoIterator for &'a RecordBuffer<V, Z> {
    type Item = V;
    type IntoIter = Iter<'a, RecordBuffer<V, Z>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<V: Codec, Z: Compressor> fmt::Display for RecordBuffer<V, Z> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordBuffer[data={:?}, index={:?}]", self.data, self.index)
    }
}
