//! Block-mapped random access and column-oriented serialization for FITS
//! binary tables.
//!
//! - [`card`] encodes and decodes 80-byte header cards.
//! - [`mapped`] reads file regions of any size through bounded mappings.
//! - [`store`] stages bytes on disk or in memory before they are copied out.
//! - [`column`] accumulates column values and serializes them with their
//!   header cards; [`colfits`] assembles and reads whole column-oriented files.

#![deny(unsafe_code)]

pub mod block;
pub mod card;
pub mod colfits;
pub mod column;
pub mod config;
pub mod endian;
pub mod error;
pub mod header;
pub mod mapped;
pub mod store;
mod value;

pub use block::{BLOCK_SIZE, CARDS_PER_BLOCK, CARD_SIZE};
pub use card::{CardFactory, CardImage, CardValue, ParsedCard};
pub use colfits::{ColFitsReader, ColFitsWriter};
pub use column::{BintableColumnHeader, ColumnStore, FileColumnStore, StandardColumnHeader};
pub use config::{BlockConfig, ColumnConfig, MappingMode, Staging, StoreConfig};
pub use error::{Error, Result};
pub use mapped::{BlockInput, BlockManager, CopyableRandomAccess};
pub use store::{ByteStore, FileByteStore, MemoryByteStore};
