// Random-access byte sources for dictionaries and targets.
//
// A source has a known length and a position cursor.  Bounded reads advance
// the cursor; `buffer_all` materializes the whole source, which is how the
// encoder takes hold of the dictionary.

use std::io::{self, Read, Seek, SeekFrom};

/// A readable byte sequence with a known length and a cursor.
pub trait ByteSource {
    /// Total length in bytes.
    fn len(&self) -> u64;

    /// Current cursor, `0..=len()`.
    fn position(&self) -> u64;

    /// Move the cursor.  Positions past the end are rejected.
    fn set_position(&mut self, pos: u64) -> io::Result<()>;

    /// Read up to `buf.len()` bytes at the cursor and advance it.
    /// Returns 0 only at the end of the source.
    fn read_bounded(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.position())
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The whole source, when it already lives in memory.
    fn as_slice(&self) -> Option<&[u8]> {
        None
    }

    /// Read the whole source from the start.  Leaves the cursor at the end.
    fn buffer_all(&mut self) -> io::Result<Vec<u8>> {
        self.set_position(0)?;
        let len = usize::try_from(self.len())
            .map_err(|_| io::Error::new(io::ErrorKind::OutOfMemory, "source too large"))?;
        let mut out = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            match self.read_bounded(&mut out[filled..])? {
                0 => return Err(io::ErrorKind::UnexpectedEof.into()),
                n => filled += n,
            }
        }
        Ok(out)
    }
}

fn past_end(pos: u64, len: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("position {pos} past end of {len}-byte source"),
    )
}

// ---------------------------------------------------------------------------
// In-memory source
// ---------------------------------------------------------------------------

/// A borrowed byte slice.
#[derive(Debug, Clone, Copy)]
pub struct MemorySource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> MemorySource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn into_inner(self) -> &'a [u8] {
        self.data
    }
}

impl<'a> From<&'a [u8]> for MemorySource<'a> {
    fn from(data: &'a [u8]) -> Self {
        Self::new(data)
    }
}

impl ByteSource for MemorySource<'_> {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn position(&self) -> u64 {
        self.pos as u64
    }

    fn set_position(&mut self, pos: u64) -> io::Result<()> {
        if pos > self.len() {
            return Err(past_end(pos, self.len()));
        }
        self.pos = pos as usize;
        Ok(())
    }

    fn read_bounded(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let rest = &self.data[self.pos..];
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.pos += n;
        Ok(n)
    }

    fn as_slice(&self) -> Option<&[u8]> {
        Some(self.data)
    }

    fn buffer_all(&mut self) -> io::Result<Vec<u8>> {
        self.pos = self.data.len();
        Ok(self.data.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Seekable reader source
// ---------------------------------------------------------------------------

/// Any `Read + Seek` (files, cursors).  The length is taken once at
/// construction.
#[derive(Debug)]
pub struct ReaderSource<R> {
    inner: R,
    len: u64,
    pos: u64,
}

impl<R: Read + Seek> ReaderSource<R> {
    /// Measure `inner` and rewind it.
    pub fn new(mut inner: R) -> io::Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self { inner, len, pos: 0 })
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> ByteSource for ReaderSource<R> {
    fn len(&self) -> u64 {
        self.len
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn set_position(&mut self, pos: u64) -> io::Result<()> {
        if pos > self.len {
            return Err(past_end(pos, self.len));
        }
        self.inner.seek(SeekFrom::Start(pos))?;
        self.pos = pos;
        Ok(())
    }

    fn read_bounded(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let want = (buf.len() as u64).min(self.remaining()) as usize;
        if want == 0 {
            return Ok(0);
        }
        let n = loop {
            match self.inner.read(&mut buf[..want]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        if n == 0 {
            // The reader shrank after it was measured.
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        self.pos += n as u64;
        Ok(n)
    }
}
