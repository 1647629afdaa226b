//! Block-data framing
//!
//! Primitive data written outside of structured records travels in
//! length-prefixed block-data records:
//!
//! ```text
//! [TC_BLOCKDATA: u8][len: u8][bytes]           len <= 255
//! [TC_BLOCKDATALONG: u8][len: i32 BE][bytes]   len > 255
//! ```
//!
//! `BlockOutput` accumulates primitive writes in a side buffer while block
//! mode is on and drains it as one record whenever the mode changes, the
//! buffer fills, or the stream is flushed. Every tagged record is written
//! with block mode off, so buffered data always lands immediately before
//! the next record.
//!
//! `BlockInput` is the mirror: in block mode reads are served from the
//! current block, refilling from the next block header. When the next
//! record is not block data the input reports end of data (a zero-length
//! read) until block mode is switched.

use crate::format::{TC_BLOCKDATA, TC_BLOCKDATALONG, TC_RESET};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use objstream_core::{Error, Result};
use std::io::{self, BufRead, BufReader, Read, Write};

/// Block-data framed output
pub(crate) struct BlockOutput<'w> {
    out: Box<dyn Write + 'w>,
    buf: Vec<u8>,
    block_size: usize,
    block_mode: bool,
}

impl<'w> BlockOutput<'w> {
    pub(crate) fn new(out: Box<dyn Write + 'w>, block_size: usize) -> Self {
        BlockOutput {
            out,
            buf: Vec::with_capacity(block_size),
            block_size,
            block_mode: false,
        }
    }

    pub(crate) fn block_mode(&self) -> bool {
        self.block_mode
    }

    /// Switch block mode, draining buffered data on any change
    ///
    /// Returns the previous mode.
    pub(crate) fn set_block_mode(&mut self, on: bool) -> io::Result<bool> {
        let old = self.block_mode;
        if old != on {
            self.drain()?;
            self.block_mode = on;
        }
        Ok(old)
    }

    /// Write buffered data as one block-data record
    pub(crate) fn drain(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let len = self.buf.len();
        if len <= crate::format::MAX_BLOCK_HEADER_LEN {
            self.out.write_u8(TC_BLOCKDATA)?;
            self.out.write_u8(len as u8)?;
        } else {
            self.out.write_u8(TC_BLOCKDATALONG)?;
            self.out.write_i32::<BigEndian>(len as i32)?;
        }
        self.out.write_all(&self.buf)?;
        self.buf.clear();
        Ok(())
    }

    /// Write a record tag; block mode must be off
    pub(crate) fn write_tag(&mut self, tag: u8) -> io::Result<()> {
        debug_assert!(!self.block_mode, "tags are never written in block mode");
        self.out.write_u8(tag)
    }

    /// Bytes currently buffered
    pub(crate) fn buffered(&self) -> usize {
        self.buf.len()
    }
}

impl Write for BlockOutput<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if !self.block_mode {
            return self.out.write(data);
        }
        if data.is_empty() {
            return Ok(0);
        }
        if self.buf.len() >= self.block_size {
            self.drain()?;
        }
        let n = data.len().min(self.block_size - self.buf.len());
        self.buf.extend_from_slice(&data[..n]);
        if self.buf.len() >= self.block_size {
            self.drain()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.drain()?;
        self.out.flush()
    }
}

/// Block-data framed input with one byte of lookahead
pub(crate) struct BlockInput<'r> {
    inner: BufReader<Box<dyn Read + 'r>>,
    block_mode: bool,
    unread: usize,
    at_end: bool,
    reset_seen: bool,
}

impl<'r> BlockInput<'r> {
    pub(crate) fn new(inner: Box<dyn Read + 'r>) -> Self {
        BlockInput {
            inner: BufReader::new(inner),
            block_mode: false,
            unread: 0,
            at_end: false,
            reset_seen: false,
        }
    }

    pub(crate) fn block_mode(&self) -> bool {
        self.block_mode
    }

    /// Switch block mode; returns the previous mode
    ///
    /// Leaving block mode with unread data in the current block is an
    /// error: the data would otherwise be parsed as records.
    pub(crate) fn set_block_mode(&mut self, on: bool) -> Result<bool> {
        let old = self.block_mode;
        if old == on {
            return Ok(old);
        }
        if old && self.unread > 0 {
            return Err(Error::InvalidOperation(format!(
                "{} bytes of unread block data",
                self.unread
            )));
        }
        self.block_mode = on;
        self.unread = 0;
        self.at_end = false;
        Ok(old)
    }

    /// Next raw byte without consuming it
    ///
    /// Only meaningful at a record boundary.
    pub(crate) fn peek(&mut self) -> io::Result<Option<u8>> {
        Ok(self.inner.fill_buf()?.first().copied())
    }

    /// Next record tag without consuming it; end of stream is an error
    pub(crate) fn peek_tag(&mut self) -> io::Result<u8> {
        self.peek()?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "unexpected end of stream")
        })
    }

    /// Bytes left in the current data block
    pub(crate) fn current_block_remaining(&self) -> usize {
        if self.block_mode {
            self.unread
        } else {
            0
        }
    }

    /// Whether block-mode reads have hit a non-block record
    pub(crate) fn at_end(&self) -> bool {
        self.at_end
    }

    /// Whether a reset record was consumed while refilling, clearing the flag
    pub(crate) fn take_reset(&mut self) -> bool {
        std::mem::take(&mut self.reset_seen)
    }

    /// Read the next block header
    ///
    /// Skips empty blocks and reset records. Sets `at_end` when the next
    /// record is not block data.
    pub(crate) fn refill(&mut self) -> io::Result<()> {
        debug_assert!(self.block_mode && self.unread == 0);
        loop {
            match self.peek()? {
                Some(TC_BLOCKDATA) => {
                    self.inner.read_u8()?;
                    let len = self.inner.read_u8()? as usize;
                    if len > 0 {
                        self.unread = len;
                        return Ok(());
                    }
                }
                Some(TC_BLOCKDATALONG) => {
                    self.inner.read_u8()?;
                    let len = self.inner.read_i32::<BigEndian>()?;
                    if len < 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("illegal block data header length: {}", len),
                        ));
                    }
                    if len > 0 {
                        self.unread = len as usize;
                        return Ok(());
                    }
                }
                Some(TC_RESET) => {
                    self.inner.read_u8()?;
                    self.reset_seen = true;
                }
                _ => {
                    self.at_end = true;
                    return Ok(());
                }
            }
        }
    }

    /// Discard the rest of the block data, stopping at the next record
    pub(crate) fn skip_block_data(&mut self) -> io::Result<()> {
        debug_assert!(self.block_mode);
        while !self.at_end {
            if self.unread > 0 {
                let want = self.unread as u64;
                let skipped = io::copy(&mut (&mut self.inner).take(want), &mut io::sink())?;
                if skipped < want {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "truncated block data",
                    ));
                }
                self.unread = 0;
            }
            self.refill()?;
        }
        Ok(())
    }

    /// Primitive bytes readable without crossing a record boundary
    pub(crate) fn available(&mut self) -> io::Result<usize> {
        if !self.block_mode {
            return Ok(self.inner.buffer().len());
        }
        if self.unread == 0 && !self.at_end {
            self.refill()?;
        }
        Ok(self.unread)
    }
}

impl Read for BlockInput<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if !self.block_mode {
            return self.inner.read(buf);
        }
        if self.unread == 0 {
            if self.at_end {
                return Ok(0);
            }
            self.refill()?;
            if self.unread == 0 {
                return Ok(0);
            }
        }
        let n = buf.len().min(self.unread);
        let got = self.inner.read(&mut buf[..n])?;
        if got == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "truncated block data",
            ));
        }
        self.unread -= got;
        Ok(got)
    }
}
