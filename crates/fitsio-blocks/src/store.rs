//! Write-once byte staging.
//!
//! A [`ByteStore`] collects bytes through a single output sink and later
//! copies everything it has collected to a destination. The calling sequence
//! is: any number of writes to [`ByteStore::stream`], then
//! [`ByteStore::copy_to`] any number of times, then [`ByteStore::dispose`].

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::time::Instant;

use tracing::{debug, trace};

use crate::config::StoreConfig;

/// A byte sink whose contents can be replayed.
pub trait ByteStore: Send {
    /// The sink for appended bytes. The same sink is returned on every call.
    fn stream(&mut self) -> io::Result<&mut dyn Write>;

    /// Number of bytes appended so far, including any still buffered.
    fn position(&self) -> u64;

    /// Copy every byte appended so far into `dest`.
    fn copy_to(&mut self, dest: &mut dyn Write) -> io::Result<()>;

    /// Release the store's resources.
    fn dispose(self: Box<Self>) -> io::Result<()>;
}

/// Wraps a writer and counts the bytes passing through it.
#[derive(Debug)]
pub(crate) struct Counted<W> {
    pub(crate) inner: W,
    pub(crate) count: u64,
}

impl<W> Counted<W> {
    pub(crate) fn new(inner: W) -> Self {
        Counted { inner, count: 0 }
    }
}

impl<W: Write> Write for Counted<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// A [`ByteStore`] backed by a private temporary file.
///
/// The file is created on first use and is unlinked from the file system as
/// soon as it is opened, so it disappears when the store is dropped or
/// disposed, and also if the process exits without either.
#[derive(Debug)]
pub struct FileByteStore {
    config: StoreConfig,
    out: Option<Counted<BufWriter<File>>>,
}

impl FileByteStore {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        FileByteStore { config, out: None }
    }

    fn open(&mut self) -> io::Result<&mut Counted<BufWriter<File>>> {
        if self.out.is_none() {
            let file = match &self.config.temp_dir {
                Some(dir) => tempfile::tempfile_in(dir)?,
                None => tempfile::tempfile()?,
            };
            debug!(dir = ?self.config.temp_dir, "allocated staging file");
            self.out = Some(Counted::new(BufWriter::with_capacity(self.config.buffer_size, file)));
        }
        self.out
            .as_mut()
            .ok_or_else(|| io::Error::other("staging file unavailable"))
    }
}

impl Default for FileByteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteStore for FileByteStore {
    fn stream(&mut self) -> io::Result<&mut dyn Write> {
        Ok(self.open()?)
    }

    fn position(&self) -> u64 {
        self.out.as_ref().map_or(0, |o| o.count)
    }

    fn copy_to(&mut self, dest: &mut dyn Write) -> io::Result<()> {
        let chunk_size = self.config.copy_chunk_size.max(1);
        let Some(out) = self.out.as_mut() else {
            return Ok(());
        };
        out.flush()?;
        let total = out.count;
        let file = out.inner.get_mut();
        file.seek(SeekFrom::Start(0))?;

        let started = Instant::now();
        let mut buf = vec![0u8; chunk_size];
        let mut remaining = total;
        while remaining > 0 {
            let want = remaining.min(chunk_size as u64) as usize;
            let n = file.read(&mut buf[..want])?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("staging file ended {remaining} bytes early"),
                ));
            }
            dest.write_all(&buf[..n])?;
            remaining -= n as u64;
        }
        file.seek(SeekFrom::End(0))?;
        trace!(bytes = total, elapsed = ?started.elapsed(), "copied staging file");
        Ok(())
    }

    fn dispose(self: Box<Self>) -> io::Result<()> {
        if let Some(out) = self.out {
            debug!(bytes = out.count, "disposing staging file");
            // Buffered bytes are discarded, not flushed.
            let (_file, _) = out.inner.into_parts();
        }
        Ok(())
    }
}

/// A [`ByteStore`] held in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryByteStore {
    buf: Vec<u8>,
}

impl MemoryByteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

impl ByteStore for MemoryByteStore {
    fn stream(&mut self) -> io::Result<&mut dyn Write> {
        Ok(&mut self.buf)
    }

    fn position(&self) -> u64 {
        self.buf.len() as u64
    }

    fn copy_to(&mut self, dest: &mut dyn Write) -> io::Result<()> {
        dest.write_all(&self.buf)
    }

    fn dispose(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}
