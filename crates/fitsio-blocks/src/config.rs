//! Tunables for block mapping, byte staging and column serialization.
//!
//! Every struct has sensible defaults and builder-style setters.

use std::path::PathBuf;

use crate::card::CardFactory;

/// Default size of one mapped block (256 MiB).
pub const DEFAULT_BLOCK_SIZE: u64 = 256 * 1024 * 1024;

/// Largest block a single mapping may cover: a signed 32-bit byte count.
pub const MAX_BLOCK_SIZE: u64 = i32::MAX as u64;

/// Largest number of blocks a region may be divided into.
pub const MAX_BLOCK_COUNT: u64 = i32::MAX as u64;

/// How a block's bytes are brought into memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MappingMode {
    /// Memory-map each block on first access.
    #[default]
    Mmap,
    /// Read each block into heap memory on first access.
    Read,
}

/// Configuration for [`BlockManager`](crate::mapped::BlockManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockConfig {
    /// Size of every block except possibly the last.
    pub block_size: u64,
    pub mapping: MappingMode,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            mapping: MappingMode::Mmap,
        }
    }
}

impl BlockConfig {
    pub fn block_size(mut self, size: u64) -> Self {
        self.block_size = size;
        self
    }

    pub fn mapping(mut self, mode: MappingMode) -> Self {
        self.mapping = mode;
        self
    }
}

/// Configuration for [`FileByteStore`](crate::store::FileByteStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Capacity of the write buffer in front of the temporary file.
    pub buffer_size: usize,
    /// Chunk size used when copying the temporary file out.
    pub copy_chunk_size: usize,
    /// Directory for temporary files; the system default when `None`.
    pub temp_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            buffer_size: 64 * 1024,
            copy_chunk_size: 64 * 1024,
            temp_dir: None,
        }
    }
}

impl StoreConfig {
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn copy_chunk_size(mut self, size: usize) -> Self {
        self.copy_chunk_size = size.max(1);
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }
}

/// Where a column store keeps its values until they are streamed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staging {
    /// A private temporary file.
    File(StoreConfig),
    /// Heap memory.
    Memory,
}

impl Default for Staging {
    fn default() -> Self {
        Staging::File(StoreConfig::default())
    }
}

/// Configuration for column stores.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnConfig {
    pub staging: Staging,
    /// Byte used to pad strings up to the column width.
    pub pad_byte: u8,
    /// Allow a string column whose longest value is empty to have width 0.
    pub allow_zero_length_string: bool,
    /// Factory used to build this column's header cards.
    pub card_factory: CardFactory,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            staging: Staging::default(),
            pad_byte: b' ',
            allow_zero_length_string: false,
            card_factory: CardFactory::DEFAULT,
        }
    }
}

impl ColumnConfig {
    pub fn staging(mut self, staging: Staging) -> Self {
        self.staging = staging;
        self
    }

    pub fn pad_byte(mut self, byte: u8) -> Self {
        self.pad_byte = byte;
        self
    }

    pub fn allow_zero_length_string(mut self, allow: bool) -> Self {
        self.allow_zero_length_string = allow;
        self
    }

    pub fn card_factory(mut self, factory: CardFactory) -> Self {
        self.card_factory = factory;
        self
    }
}
