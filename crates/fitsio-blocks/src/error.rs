use thiserror::Error;

/// All errors that can occur in block-mapped FITS I/O and column serialization.
#[derive(Debug, Error)]
pub enum Error {
    /// Header bytes or text violate the 80-byte printable-ASCII card contract.
    #[error("malformed header card: {0}")]
    MalformedCard(String),
    /// A keyword is longer than 8 characters or contains illegal characters.
    #[error("invalid keyword name: {0:?}")]
    InvalidKeyword(String),
    /// The block count for a region does not fit the block index range.
    #[error("region of {size} bytes is too large to address with {block_size}-byte blocks")]
    RegionTooLarge { size: u64, block_size: u64 },
    /// Block size is zero or larger than a single mappable region.
    #[error("invalid block size: {0}")]
    InvalidBlockSize(u64),
    /// API sequencing violation (writing after sealing, reading after close, ...).
    #[error("illegal state: {0}")]
    IllegalState(&'static str),
    /// A value does not match the column's declared element type.
    #[error("column type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    /// Staged column data could not be decoded when streamed back.
    #[error("corrupted staging data: {0}")]
    CorruptStaging(String),
    /// Premature end of data while reading.
    #[error("unexpected end of file")]
    UnexpectedEof,
    /// An I/O error from the underlying storage medium.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(inner) => inner,
            Error::UnexpectedEof => std::io::Error::from(std::io::ErrorKind::UnexpectedEof),
            state @ Error::IllegalState(_) => std::io::Error::other(state),
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}
