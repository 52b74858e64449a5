//! Partitioning of a file region into independently mapped blocks.

use std::fmt;
use std::fs::File;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use crate::config::{BlockConfig, MAX_BLOCK_COUNT, MAX_BLOCK_SIZE};
use crate::error::{Error, Result};
use crate::mapped::mapper::{mapper_for, BlockMapper, MmapMapper};

/// One contiguous piece of a managed region, in file coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub index: usize,
    /// Absolute file offset of the first byte.
    pub offset: u64,
    pub len: usize,
}

/// Owns the mappings for the region `[offset, offset + size)` of a file,
/// split into blocks of `block_size` bytes (the last may be shorter).
///
/// Blocks are mapped on first request and cached until [`BlockManager::close`]
/// or drop. Concurrent first requests for the same block map it exactly once.
pub struct BlockManager {
    file: File,
    offset: u64,
    size: u64,
    block_size: u64,
    nblock: usize,
    /// `None` once closed.
    buffers: RwLock<Option<Vec<Option<Bytes>>>>,
    mapper: Box<dyn BlockMapper>,
}

impl BlockManager {
    /// Manage a region with memory-mapped blocks of `block_size` bytes.
    pub fn new(file: File, offset: u64, size: u64, block_size: u64) -> Result<Self> {
        Self::with_mapper(file, offset, size, block_size, Box::new(MmapMapper))
    }

    pub fn with_config(file: File, offset: u64, size: u64, config: &BlockConfig) -> Result<Self> {
        Self::with_mapper(
            file,
            offset,
            size,
            config.block_size,
            mapper_for(config.mapping),
        )
    }

    /// Manage a region using a caller-supplied mapping strategy.
    pub fn with_mapper(
        file: File,
        offset: u64,
        size: u64,
        block_size: u64,
        mapper: Box<dyn BlockMapper>,
    ) -> Result<Self> {
        if block_size == 0 || block_size > MAX_BLOCK_SIZE {
            return Err(Error::InvalidBlockSize(block_size));
        }
        let nblock = size.div_ceil(block_size);
        if nblock > MAX_BLOCK_COUNT {
            return Err(Error::RegionTooLarge { size, block_size });
        }
        let nblock = usize::try_from(nblock).map_err(|_| Error::RegionTooLarge { size, block_size })?;
        debug!(offset, size, block_size, nblock, "partitioned region into blocks");
        Ok(BlockManager {
            file,
            offset,
            size,
            block_size,
            nblock,
            buffers: RwLock::new(Some(vec![None; nblock])),
            mapper,
        })
    }

    pub fn block_count(&self) -> usize {
        self.nblock
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Absolute file offset of the region start.
    pub fn region_offset(&self) -> u64 {
        self.offset
    }

    pub fn region_size(&self) -> u64 {
        self.size
    }

    /// Layout of block `index`, or `None` if out of range.
    pub fn block(&self, index: usize) -> Option<Block> {
        if index >= self.nblock {
            return None;
        }
        let start = index as u64 * self.block_size;
        let len = self.block_size.min(self.size - start);
        Some(Block {
            index,
            offset: self.offset + start,
            len: len as usize,
        })
    }

    /// All blocks in index order.
    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        (0..self.nblock).filter_map(|i| self.block(i))
    }

    /// The bytes of block `index`, mapping it if this is the first request.
    ///
    /// Returned buffers stay valid while held, even across [`close`](Self::close);
    /// only new requests fail after closing.
    pub fn buffer_for(&self, index: usize) -> Result<Bytes> {
        {
            let guard = self.buffers.read();
            let buffers = guard
                .as_ref()
                .ok_or(Error::IllegalState("block manager is closed"))?;
            match buffers.get(index) {
                None => return Err(Error::IllegalState("block index out of range")),
                Some(Some(bytes)) => return Ok(bytes.clone()),
                Some(None) => {}
            }
        }

        let mut guard = self.buffers.write();
        let buffers = guard
            .as_mut()
            .ok_or(Error::IllegalState("block manager is closed"))?;
        let slot = &mut buffers[index];
        if let Some(bytes) = slot {
            return Ok(bytes.clone());
        }
        let block = self
            .block(index)
            .ok_or(Error::IllegalState("block index out of range"))?;
        debug!(index, offset = block.offset, len = block.len, "mapping block");
        let bytes = self.mapper.map(&self.file, block.offset, block.len)?;
        *slot = Some(bytes.clone());
        Ok(bytes)
    }

    /// Returns `true` if block `index` has been mapped and not released.
    pub fn is_mapped(&self, index: usize) -> bool {
        self.buffers
            .read()
            .as_ref()
            .and_then(|b| b.get(index))
            .is_some_and(Option::is_some)
    }

    pub fn is_closed(&self) -> bool {
        self.buffers.read().is_none()
    }

    /// Release every cached block. Idempotent.
    pub fn close(&self) {
        if let Some(buffers) = self.buffers.write().take() {
            let mapped = buffers.iter().filter(|b| b.is_some()).count();
            debug!(mapped, nblock = self.nblock, "released block mappings");
        }
    }
}

impl fmt::Debug for BlockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockManager")
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("block_size", &self.block_size)
            .field("nblock", &self.nblock)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MappingMode;
    use std::io::Write;
    use std::sync::Arc;

    fn scratch(len: usize) -> (File, Vec<u8>) {
        let content: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&content).unwrap();
        (file, content)
    }

    #[test]
    fn partition_sizes() {
        let (file, _) = scratch(10);
        let m = BlockManager::new(file, 0, 10, 4).unwrap();
        assert_eq!(m.block_count(), 3);
        let lens: Vec<usize> = m.blocks().map(|b| b.len).collect();
        assert_eq!(lens, vec![4, 4, 2]);
        assert_eq!(m.block(1).unwrap().offset, 4);
        assert!(m.block(3).is_none());
    }

    #[test]
    fn exact_multiple_has_no_short_block() {
        let (file, _) = scratch(12);
        let m = BlockManager::new(file, 0, 12, 4).unwrap();
        assert_eq!(m.block_count(), 3);
        assert!(m.blocks().all(|b| b.len == 4));
    }

    #[test]
    fn empty_region() {
        let (file, _) = scratch(0);
        let m = BlockManager::new(file, 0, 0, 4).unwrap();
        assert_eq!(m.block_count(), 0);
        assert!(matches!(m.buffer_for(0), Err(Error::IllegalState(_))));
    }

    #[test]
    fn region_too_large() {
        let (file, _) = scratch(0);
        let err = BlockManager::new(file, 0, u64::MAX, 1).unwrap_err();
        assert!(matches!(err, Error::RegionTooLarge { block_size: 1, .. }));
    }

    #[test]
    fn invalid_block_size() {
        let (file, _) = scratch(0);
        assert!(matches!(
            BlockManager::new(file, 0, 10, 0),
            Err(Error::InvalidBlockSize(0))
        ));
        let (file, _) = scratch(0);
        assert!(matches!(
            BlockManager::new(file, 0, 10, MAX_BLOCK_SIZE + 1),
            Err(Error::InvalidBlockSize(_))
        ));
    }

    #[test]
    fn buffers_map_lazily_and_once() {
        let (file, content) = scratch(100);
        let m = BlockManager::new(file, 10, 80, 32).unwrap();
        assert!(!m.is_mapped(1));
        let b1 = m.buffer_for(1).unwrap();
        assert!(m.is_mapped(1));
        assert_eq!(&b1[..], &content[42..74]);
        let again = m.buffer_for(1).unwrap();
        assert_eq!(b1.as_ptr(), again.as_ptr());
        let last = m.buffer_for(2).unwrap();
        assert_eq!(&last[..], &content[74..90]);
    }

    #[test]
    fn read_mode_matches_content() {
        let (file, content) = scratch(50);
        let config = BlockConfig::default()
            .block_size(16)
            .mapping(MappingMode::Read);
        let m = BlockManager::with_config(file, 0, 50, &config).unwrap();
        let all: Vec<u8> = (0..m.block_count())
            .flat_map(|i| m.buffer_for(i).unwrap().to_vec())
            .collect();
        assert_eq!(all, content);
    }

    #[test]
    fn concurrent_first_access_maps_once() {
        let (file, _) = scratch(4096);
        let m = Arc::new(BlockManager::new(file, 0, 4096, 1024).unwrap());
        let ptrs: Vec<usize> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let m = Arc::clone(&m);
                    s.spawn(move || m.buffer_for(3).unwrap().as_ptr() as usize)
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(ptrs.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn close_rejects_new_requests_but_keeps_held_buffers() {
        let (file, content) = scratch(64);
        let m = BlockManager::new(file, 0, 64, 16).unwrap();
        let held = m.buffer_for(0).unwrap();
        m.close();
        m.close();
        assert!(m.is_closed());
        assert!(!m.is_mapped(0));
        assert!(matches!(m.buffer_for(0), Err(Error::IllegalState(_))));
        assert_eq!(&held[..], &content[..16]);
    }
}
