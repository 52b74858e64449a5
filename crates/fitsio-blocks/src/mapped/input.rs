//! A single random-access byte stream over an ordered set of blocks.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::config::BlockConfig;
use crate::endian::BeScalar;
use crate::error::{Error, Result};
use crate::mapped::manager::BlockManager;

/// An ordered set of blocks that can be fetched by index.
pub trait BlockSource: Send + Sync {
    fn block_count(&self) -> usize;

    /// Length of block `index` in bytes; 0 if out of range.
    fn block_len(&self, index: usize) -> usize;

    fn acquire_block(&self, index: usize) -> Result<Bytes>;

    /// Release the blocks. Later acquisitions fail.
    fn close(&self);
}

impl BlockSource for BlockManager {
    fn block_count(&self) -> usize {
        BlockManager::block_count(self)
    }

    fn block_len(&self, index: usize) -> usize {
        self.block(index).map_or(0, |b| b.len)
    }

    fn acquire_block(&self, index: usize) -> Result<Bytes> {
        self.buffer_for(index)
    }

    fn close(&self) {
        BlockManager::close(self)
    }
}

/// Blocks that are already in memory.
#[derive(Debug)]
pub struct BufferBlocks {
    lens: Vec<usize>,
    buffers: RwLock<Option<Vec<Bytes>>>,
}

impl BufferBlocks {
    pub fn new(buffers: Vec<Bytes>) -> Self {
        BufferBlocks {
            lens: buffers.iter().map(Bytes::len).collect(),
            buffers: RwLock::new(Some(buffers)),
        }
    }
}

impl BlockSource for BufferBlocks {
    fn block_count(&self) -> usize {
        self.lens.len()
    }

    fn block_len(&self, index: usize) -> usize {
        self.lens.get(index).copied().unwrap_or(0)
    }

    fn acquire_block(&self, index: usize) -> Result<Bytes> {
        let guard = self.buffers.read();
        let buffers = guard
            .as_ref()
            .ok_or(Error::IllegalState("buffer blocks are closed"))?;
        buffers
            .get(index)
            .cloned()
            .ok_or(Error::IllegalState("block index out of range"))
    }

    fn close(&self) {
        self.buffers.write().take();
    }
}

/// A random-access input that can be cheaply duplicated.
///
/// Copies share the underlying data but have independent positions, so each
/// thread can read through its own copy.
pub trait CopyableRandomAccess: Read + Seek + Send {
    /// A new reader over the same data, positioned where `self` is now.
    fn copy(&self) -> Self
    where
        Self: Sized;

    /// Total length in bytes.
    fn length(&self) -> u64;
}

/// Reads a sequence of blocks as one contiguous stream.
///
/// Logical offsets are translated to `(block, offset in block)` by binary
/// search over the cumulative block start table. Reads cross block boundaries
/// transparently.
///
/// ```
/// use bytes::Bytes;
/// use fitsio_blocks::mapped::BlockInput;
///
/// let mut input = BlockInput::from_buffers(vec![
///     Bytes::from_static(&[0, 0]),
///     Bytes::from_static(&[1, 2]),
/// ]);
/// input.seek_to(1);
/// assert_eq!(input.read_be::<i16>().unwrap(), 1);
/// ```
pub struct BlockInput {
    source: Arc<dyn BlockSource>,
    /// Start offset of each block, followed by the total length.
    starts: Arc<[u64]>,
    pos: u64,
    current: Option<(usize, Bytes)>,
}

impl BlockInput {
    pub fn new(source: Arc<dyn BlockSource>) -> Self {
        let nblock = source.block_count();
        let mut starts = Vec::with_capacity(nblock + 1);
        let mut total = 0u64;
        for i in 0..nblock {
            starts.push(total);
            total += source.block_len(i) as u64;
        }
        starts.push(total);
        BlockInput {
            source,
            starts: starts.into(),
            pos: 0,
            current: None,
        }
    }

    /// Read a file region through a [`BlockManager`] built from `config`.
    pub fn open(file: std::fs::File, offset: u64, size: u64, config: &BlockConfig) -> Result<Self> {
        let manager = BlockManager::with_config(file, offset, size, config)?;
        Ok(Self::from_manager(manager))
    }

    pub fn from_manager(manager: BlockManager) -> Self {
        Self::new(Arc::new(manager))
    }

    pub fn from_buffers(buffers: Vec<Bytes>) -> Self {
        Self::new(Arc::new(BufferBlocks::new(buffers)))
    }

    pub fn len(&self) -> u64 {
        self.starts.last().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn block_count(&self) -> usize {
        self.starts.len() - 1
    }

    /// The block holding logical `offset` and the offset within it, or `None`
    /// at or beyond the end. An offset on a boundary belongs to the block that
    /// starts there.
    pub fn locate(&self, offset: u64) -> Option<(usize, usize)> {
        if offset >= self.len() {
            return None;
        }
        let index = self.starts.partition_point(|&s| s <= offset) - 1;
        Some((index, (offset - self.starts[index]) as usize))
    }

    /// Inverse of [`locate`](Self::locate).
    ///
    /// # Panics
    ///
    /// Panics if `block` is not less than [`block_count`](Self::block_count).
    pub fn to_logical_offset(&self, block: usize, offset_in_block: usize) -> u64 {
        assert!(block < self.block_count(), "block {block} out of range");
        self.starts[block] + offset_in_block as u64
    }

    pub fn acquire_block(&self, index: usize) -> Result<Bytes> {
        self.source.acquire_block(index)
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Move the cursor. Positions beyond the end are allowed; reads there
    /// return no data.
    pub fn seek_to(&mut self, pos: u64) {
        self.pos = pos;
    }

    pub fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.pos)
    }

    /// A reader sharing this one's blocks with its own cursor, starting at the
    /// current position.
    pub fn copy(&self) -> Self {
        BlockInput {
            source: Arc::clone(&self.source),
            starts: Arc::clone(&self.starts),
            pos: self.pos,
            current: self.current.clone(),
        }
    }

    /// Drop this reader; if no copies remain, release the blocks too.
    pub fn close(mut self) {
        self.current = None;
        if let Some(source) = Arc::get_mut(&mut self.source) {
            source.close();
        }
    }

    fn block_bytes(&mut self, index: usize) -> Result<&Bytes> {
        let cached = matches!(&self.current, Some((i, _)) if *i == index);
        if !cached {
            let bytes = self.source.acquire_block(index)?;
            self.current = Some((index, bytes));
        }
        match &self.current {
            Some((_, bytes)) => Ok(bytes),
            None => Err(Error::IllegalState("block cache empty")),
        }
    }

    /// Read up to `buf.len()` bytes from the cursor, crossing blocks as
    /// needed. Returns the number of bytes read; 0 at the end.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut done = 0;
        while done < buf.len() {
            let Some((index, within)) = self.locate(self.pos) else {
                break;
            };
            let bytes = self.block_bytes(index)?;
            let avail = &bytes[within.min(bytes.len())..];
            let n = avail.len().min(buf.len() - done);
            if n == 0 {
                return Err(Error::IllegalState("block shorter than its layout"));
            }
            buf[done..done + n].copy_from_slice(&avail[..n]);
            done += n;
            self.pos += n as u64;
        }
        Ok(done)
    }

    /// Fill `buf` completely or fail with [`Error::UnexpectedEof`].
    pub fn read_fully(&mut self, buf: &mut [u8]) -> Result<()> {
        let start = self.pos;
        let n = self.read_into(buf)?;
        if n < buf.len() {
            self.pos = start;
            return Err(Error::UnexpectedEof);
        }
        Ok(())
    }

    /// Read one big-endian scalar.
    pub fn read_be<T: BeScalar>(&mut self) -> Result<T> {
        let mut raw = [0u8; 8];
        let raw = &mut raw[..T::SIZE];
        self.read_fully(raw)?;
        Ok(T::from_be_slice(raw))
    }

    pub fn skip(&mut self, n: u64) {
        self.pos = self.pos.saturating_add(n);
    }
}

impl Read for BlockInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_into(buf)?)
    }
}

impl Seek for BlockInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(d) => self.len().checked_add_signed(d),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
        };
        match target {
            Some(p) => {
                self.pos = p;
                Ok(p)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            )),
        }
    }
}

impl CopyableRandomAccess for BlockInput {
    fn copy(&self) -> Self {
        BlockInput::copy(self)
    }

    fn length(&self) -> u64 {
        self.len()
    }
}

impl std::fmt::Debug for BlockInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockInput")
            .field("len", &self.len())
            .field("blocks", &self.block_count())
            .field("pos", &self.pos)
            .finish()
    }
}
