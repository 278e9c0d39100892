//! Custom stream backends.
//!
//! A [`PackOps`] implementation lets a [`crate::PackFile`] read or write
//! something other than a disk file: memory, a socket, a slice of a
//! bigger resource. Custom backends get the whole byte-level API but not
//! the chunk and compression layers, which only make sense on top of a
//! normal stream.

use slpack_core::Result;

/// Byte-level operations a custom stream backend must provide.
///
/// Read-only backends may leave `put_byte` at its default (always
/// fails), and write-only backends may do the same with `get_byte`.
pub trait PackOps {
    /// Read one byte, or `None` at end of stream.
    fn get_byte(&mut self) -> Option<u8> {
        None
    }

    /// Write one byte; false means the write was refused or failed.
    fn put_byte(&mut self, _byte: u8) -> bool {
        false
    }

    /// Push one byte back so the next read returns it. False if there is
    /// no room to unget.
    fn unget_byte(&mut self, _byte: u8) -> bool {
        false
    }

    /// Read up to `buf.len()` bytes, returning how many were read.
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        while n < buf.len() {
            match self.get_byte() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    /// Write up to `buf.len()` bytes, returning how many were written.
    fn write(&mut self, buf: &[u8]) -> usize {
        let mut n = 0;
        while n < buf.len() {
            if !self.put_byte(buf[n]) {
                break;
            }
            n += 1;
        }
        n
    }

    /// Skip forward `offset` bytes.
    fn seek_forward(&mut self, offset: usize) -> Result<()>;

    /// True once a read has hit the end of the stream.
    fn at_eof(&self) -> bool;

    /// True after an unrecoverable stream error.
    fn has_error(&self) -> bool;

    /// Release the backend. Called once by [`crate::PackFile::close`].
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
