//! Random access to file regions too large for a single mapping.
//!
//! A [`BlockManager`] splits a region into blocks no larger than a signed
//! 32-bit byte count and maps each one on demand. A [`BlockInput`] reads those
//! blocks as one seekable stream; copies of it share the mapped blocks and keep
//! independent cursors.

mod input;
mod manager;
mod mapper;

pub use input::{BlockInput, BlockSource, BufferBlocks, CopyableRandomAccess};
pub use manager::{Block, BlockManager};
pub use mapper::{mapper_for, BlockMapper, MmapMapper, ReadMapper};
