//! Strategies that bring one block of a file into memory.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use bytes::Bytes;
use memmap2::MmapOptions;

use crate::config::MappingMode;

/// Produces the in-memory view of a file range.
///
/// The returned [`Bytes`] owns whatever resource backs it; the mapping or
/// allocation is released when the last clone is dropped.
pub trait BlockMapper: Send + Sync {
    fn map(&self, file: &File, offset: u64, len: usize) -> io::Result<Bytes>;
}

/// Maps blocks with `mmap(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MmapMapper;

impl BlockMapper for MmapMapper {
    fn map(&self, file: &File, offset: u64, len: usize) -> io::Result<Bytes> {
        if len == 0 {
            return Ok(Bytes::new());
        }
        // SAFETY: the mapping is read-only, and the file must not be truncated
        // while a manager over it is open.
        #[allow(unsafe_code)]
        let mmap = unsafe { MmapOptions::new().offset(offset).len(len).map(file)? };
        Ok(Bytes::from_owner(mmap))
    }
}

/// Reads blocks into heap buffers, for platforms or files where mapping is
/// unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadMapper;

impl BlockMapper for ReadMapper {
    fn map(&self, file: &File, offset: u64, len: usize) -> io::Result<Bytes> {
        let mut buf = vec![0u8; len];
        let mut handle = file;
        handle.seek(SeekFrom::Start(offset))?;
        handle.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

/// The mapper for a configured [`MappingMode`].
pub fn mapper_for(mode: MappingMode) -> Box<dyn BlockMapper> {
    match mode {
        MappingMode::Mmap => Box::new(MmapMapper),
        MappingMode::Read => Box::new(ReadMapper),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scratch(content: &[u8]) -> File {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn both_mappers_agree() {
        let content: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let file = scratch(&content);
        for mode in [MappingMode::Mmap, MappingMode::Read] {
            let mapper = mapper_for(mode);
            let bytes = mapper.map(&file, 4097, 3000).unwrap();
            assert_eq!(&bytes[..], &content[4097..7097], "{mode:?}");
        }
    }

    #[test]
    fn read_past_end_fails() {
        let file = scratch(&[1, 2, 3]);
        let err = ReadMapper.map(&file, 2, 10).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn empty_mapping() {
        let file = scratch(&[]);
        assert!(MmapMapper.map(&file, 0, 0).unwrap().is_empty());
    }
}
