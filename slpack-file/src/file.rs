//! The layered packfile stream.

use std::fs::File;
use std::io::{self, Read as _, Seek, SeekFrom, Write as _};
use std::path::Path;

use log::debug;
use slpack_core::{CodecStream, KeyStream, PackError, Password, Result, encrypt_id};
use slpack_lzss::{LzssDecoder, LzssEncoder};
use tempfile::TempPath;

use crate::mode::OpenMode;
use crate::vtable::PackOps;

/// Size of the stream buffer at every layer.
pub const BUF_SIZE: usize = 4096;

/// Magic prefix of a compressed stream: "slh!" as a big-endian word.
pub const PACK_MAGIC: u32 = 0x736C_6821;

/// Magic prefix of a raw stream that may be opened in packed mode:
/// "slh." as a big-endian word.
pub const NOPACK_MAGIC: u32 = 0x736C_682E;

/// Compressor or decompressor attached to a packed stream layer.
pub(crate) enum Codec {
    Encode(Box<LzssEncoder>),
    Decode(Box<LzssDecoder>),
}

/// A normal stream layer: buffered bytes over a file handle or over a
/// parent stream, optionally compressed and optionally encrypted.
pub(crate) struct NormalFile {
    /// Underlying disk file, for the raw layer.
    pub(crate) handle: Option<File>,
    /// Stream beneath this one. Compressed layers and chunks read and
    /// write through it; a write chunk merely holds it until close.
    pub(crate) parent: Option<Box<PackFile>>,
    pub(crate) codec: Option<Codec>,
    /// Password for magics and nested streams opened from this one.
    pub(crate) password: Option<Password>,
    /// Cipher cursor. Raw layers XOR whole buffers with it; old-format
    /// streams instead feed it to the codec one control byte at a time.
    pub(crate) key: Option<KeyStream>,
    /// Scratch file path of a write chunk, deleted when dropped.
    pub(crate) scratch: Option<TempPath>,
    /// Byte budget. Reading counts down the bytes still expected from
    /// below; writing counts up the bytes already flushed.
    pub(crate) todo: i64,
    pub(crate) write: bool,
    pub(crate) pack: bool,
    pub(crate) chunk: bool,
    pub(crate) eof: bool,
    pub(crate) error: bool,
    pub(crate) old_crypt: bool,
    pub(crate) buf: Box<[u8; BUF_SIZE]>,
    pub(crate) buf_pos: usize,
    /// Reading: unread bytes left in `buf`. Writing: bytes staged.
    pub(crate) buf_size: usize,
    /// Header of the chunk this layer reads, once opened.
    pub(crate) chunk_sizes: Option<ChunkSizes>,
}

/// The two length words framing a chunk being read.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChunkSizes {
    /// On-disk byte count of the chunk body.
    pub(crate) raw: u32,
    /// Logical byte count; negative when the body is compressed.
    pub(crate) logical: i32,
}

pub(crate) enum Backend {
    Normal(NormalFile),
    Custom(Box<dyn PackOps>),
}

/// A buffered, layerable packfile stream.
///
/// See the [crate docs](crate) for the layering model. Byte-level reads
/// return `Option<u8>` and writes return `bool`; failures latch a sticky
/// error flag readable through [`PackFile::has_error`], matching the
/// end-of-file flag latched by reads. [`PackFile::close`] surfaces any
/// buffered write that could not be flushed.
pub struct PackFile {
    pub(crate) backend: Backend,
}

impl NormalFile {
    pub(crate) fn new() -> Self {
        Self {
            handle: None,
            parent: None,
            codec: None,
            password: None,
            key: None,
            scratch: None,
            todo: 0,
            write: false,
            pack: false,
            chunk: false,
            eof: false,
            error: false,
            old_crypt: false,
            buf: Box::new([0; BUF_SIZE]),
            buf_pos: 0,
            buf_size: 0,
            chunk_sizes: None,
        }
    }

    /// True when the byte budget is spent. A decompressor suspended with
    /// half a match still to emit counts as more input even when the
    /// budget reads as spent, since it produces bytes without consuming
    /// any.
    fn no_more_input(&self) -> bool {
        if self.parent.is_some() && self.pack {
            if let Some(Codec::Decode(dec)) = &self.codec {
                if dec.has_pending_output() {
                    return false;
                }
            }
        }
        self.todo <= 0
    }

    pub(crate) fn getc(&mut self) -> Option<u8> {
        if self.buf_size > 1 {
            self.buf_size -= 1;
            let c = self.buf[self.buf_pos];
            self.buf_pos += 1;
            Some(c)
        } else if self.buf_size == 1 {
            // Returning the last buffered byte; latch EOF now so the
            // flag reads true the moment the stream is spent.
            self.buf_size = 0;
            if self.no_more_input() {
                self.eof = true;
            }
            let c = self.buf[self.buf_pos];
            self.buf_pos += 1;
            Some(c)
        } else {
            self.refill()
        }
    }

    /// Refill the read buffer from below and return the first byte.
    fn refill(&mut self) -> Option<u8> {
        if self.eof {
            return None;
        }
        if self.no_more_input() {
            self.eof = true;
            return None;
        }

        let want = self.todo.min(BUF_SIZE as i64) as usize;
        let n = if let Some(parent) = self.parent.as_mut() {
            let n = if self.pack {
                match self.codec.as_mut() {
                    Some(Codec::Decode(dec)) => dec.decode(parent.as_mut(), &mut self.buf[..want]),
                    _ => {
                        self.error = true;
                        return None;
                    }
                }
            } else {
                parent.read_bytes(&mut self.buf[..want])
            };
            if parent.at_eof() {
                self.todo = 0;
            }
            if parent.has_error() {
                self.error = true;
                return None;
            }
            n
        } else {
            let Some(handle) = self.handle.as_mut() else {
                self.error = true;
                return None;
            };
            let mut done = 0;
            while done < want {
                match handle.read(&mut self.buf[done..want]) {
                    Ok(0) => {
                        // File shorter than its budget: it shrank after
                        // open, so the stream is broken, not merely done.
                        self.error = true;
                        break;
                    }
                    Ok(sz) => done += sz,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(_) => {
                        self.error = true;
                        return None;
                    }
                }
            }
            if !self.old_crypt {
                if let Some(key) = self.key.as_mut() {
                    key.apply(&mut self.buf[..done]);
                }
            }
            done
        };

        self.todo -= n as i64;
        self.buf_pos = 0;
        if n == 0 {
            self.buf_size = 0;
            if self.no_more_input() {
                self.eof = true;
            }
            return None;
        }
        self.buf_size = n - 1;
        if self.buf_size == 0 && self.no_more_input() {
            self.eof = true;
        }
        self.buf_pos = 1;
        Some(self.buf[0])
    }

    pub(crate) fn putc(&mut self, c: u8) -> bool {
        if self.buf_size + 1 >= BUF_SIZE && self.flush(false).is_err() {
            return false;
        }
        self.buf[self.buf_size] = c;
        self.buf_size += 1;
        true
    }

    /// Flush staged bytes down a layer. On the final flush of a
    /// compressed layer the compressor runs even with nothing staged, so
    /// a suspended match and the trailing partial batch drain out.
    pub(crate) fn flush(&mut self, last: bool) -> Result<()> {
        if self.pack {
            if self.buf_size > 0 || last {
                let res = match (self.codec.as_mut(), self.parent.as_mut()) {
                    (Some(Codec::Encode(enc)), Some(parent)) => {
                        enc.encode(parent.as_mut(), &self.buf[..self.buf_size], last)
                    }
                    _ => Err(PackError::invalid_state(
                        "compressed writer is missing its codec or parent",
                    )),
                };
                if let Err(e) = res {
                    self.error = true;
                    return Err(e);
                }
            }
        } else if self.buf_size > 0 {
            if !self.old_crypt {
                if let Some(key) = self.key.as_mut() {
                    key.apply(&mut self.buf[..self.buf_size]);
                }
            }
            let Some(handle) = self.handle.as_mut() else {
                self.error = true;
                return Err(PackError::invalid_state("raw writer has no file handle"));
            };
            if let Err(e) = handle.write_all(&self.buf[..self.buf_size]) {
                self.error = true;
                return Err(e.into());
            }
        }
        self.todo += self.buf_size as i64;
        self.buf_pos = 0;
        self.buf_size = 0;
        Ok(())
    }

    fn unget(&mut self, c: u8) -> bool {
        if self.buf_pos == 0 {
            return false;
        }
        self.buf_pos -= 1;
        self.buf[self.buf_pos] = c;
        self.buf_size += 1;
        self.eof = false;
        true
    }

    fn seek_forward(&mut self, mut offset: usize) -> Result<()> {
        if self.write {
            return Err(PackError::invalid_state("cannot seek a write stream"));
        }

        // Skip what the buffer already holds.
        if self.buf_size > 0 {
            let i = offset.min(self.buf_size);
            self.buf_size -= i;
            self.buf_pos += i;
            offset -= i;
            if self.buf_size == 0 && self.no_more_input() {
                self.eof = true;
            }
        }

        if offset > 0 {
            let i = (offset as i64).min(self.todo.max(0)) as usize;
            if self.pack || self.key.is_some() {
                // Compressed or encrypted data has to be read through.
                for _ in 0..i {
                    if self.getc().is_none() {
                        break;
                    }
                }
            } else if let Some(parent) = self.parent.as_mut() {
                parent.seek_forward(i)?;
                self.todo -= i as i64;
                if self.no_more_input() {
                    self.eof = true;
                }
            } else if let Some(handle) = self.handle.as_mut() {
                handle.seek(SeekFrom::Current(i as i64))?;
                self.todo -= i as i64;
                if self.no_more_input() {
                    self.eof = true;
                }
            }
        }
        Ok(())
    }

    /// Close this layer and everything beneath it.
    fn close_stream(&mut self) -> Result<()> {
        let mut result = Ok(());
        if self.write {
            result = self.flush(true);
        }
        if let Some(parent) = self.parent.take() {
            let r = parent.close();
            if result.is_ok() {
                result = r;
            }
        }
        // the handle (and a chunk's scratch path) drop with self
        result
    }
}

impl PackFile {
    /// Open a file on disk.
    ///
    /// Write modes truncate or create the file; read modes open it as-is.
    /// [`OpenMode::ReadPacked`] on a file carrying [`NOPACK_MAGIC`]
    /// transparently degrades to raw reading.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        Self::open_with_password(path, mode, None)
    }

    /// Open a file on disk with an encryption password.
    ///
    /// The password masks the stream magics and XORs the raw byte
    /// stream. Old-format encrypted files, which only masked the
    /// compressor's control bytes, are detected and read transparently.
    pub fn open_with_password(
        path: impl AsRef<Path>,
        mode: OpenMode,
        password: Option<&Password>,
    ) -> Result<Self> {
        let path = path.as_ref();
        debug!("opening {} in {:?} mode", path.display(), mode);
        let file = if mode.is_write() {
            File::create(path)?
        } else {
            File::open(path)?
        };
        Self::from_file(file, mode, password.cloned())
    }

    /// Layer a packfile stream over an already open file.
    ///
    /// The file offset must be at the start of the stream; a handle that
    /// has already been read, written, or seeked is rejected rather than
    /// silently rewound.
    pub fn from_file(mut file: File, mode: OpenMode, password: Option<Password>) -> Result<Self> {
        if file.stream_position()? != 0 {
            return Err(PackError::precondition(
                "file handle must be positioned at offset 0",
            ));
        }
        match mode {
            OpenMode::Write => {
                let mut n = NormalFile::new();
                n.write = true;
                n.key = password.as_ref().map(KeyStream::new);
                n.password = password;
                n.handle = Some(file);
                Ok(Self::from_normal(n))
            }
            OpenMode::WriteNoPack => {
                let mut f = Self::from_file(file, OpenMode::Write, password)?;
                let magic = {
                    let pw = f.password();
                    encrypt_id(NOPACK_MAGIC, pw.as_ref(), true)
                };
                f.put_u32_be(magic);
                Ok(f)
            }
            OpenMode::WritePacked => {
                let mut parent = Self::from_file(file, OpenMode::Write, password.clone())?;
                parent.put_u32_be(encrypt_id(PACK_MAGIC, password.as_ref(), true));

                let mut n = NormalFile::new();
                n.write = true;
                n.pack = true;
                n.codec = Some(Codec::Encode(Box::new(LzssEncoder::new())));
                n.parent = Some(Box::new(parent));
                n.password = password;
                // the magic already sent below counts against the body
                n.todo = 4;
                Ok(Self::from_normal(n))
            }
            OpenMode::Read => {
                let size = file.seek(SeekFrom::End(0))?;
                file.seek(SeekFrom::Start(0))?;

                let mut n = NormalFile::new();
                n.todo = size as i64;
                n.key = password.as_ref().map(KeyStream::new);
                n.password = password;
                n.handle = Some(file);
                Ok(Self::from_normal(n))
            }
            OpenMode::ReadPacked => Self::open_packed_reader(file, password),
        }
    }

    fn open_packed_reader(file: File, password: Option<Password>) -> Result<Self> {
        let mut parent = Self::from_file(file, OpenMode::Read, password.clone())?;
        let Some(mut header) = parent.get_u32_be() else {
            return Err(PackError::unexpected_eof(4));
        };

        let mut old_crypt = false;
        if password.is_some()
            && (header == encrypt_id(PACK_MAGIC, password.as_ref(), false)
                || header == encrypt_id(NOPACK_MAGIC, password.as_ref(), false))
        {
            // Old-format encrypted stream: the raw bytes are not XORed,
            // only the compressor's control bytes are. Reopen the raw
            // layer without the whole-buffer cipher and re-read the
            // magic through it.
            debug!("old-format encrypted stream detected, reopening raw layer");
            let mut file = parent.into_handle()?;
            file.seek(SeekFrom::Start(0))?;
            let mut raw = Self::from_file(file, OpenMode::Read, password.clone())?;
            if let Backend::Normal(n) = &mut raw.backend {
                n.old_crypt = true;
            }
            if raw.get_u32_be().is_none() {
                return Err(PackError::unexpected_eof(4));
            }
            parent = raw;
            old_crypt = true;
            header = if header == encrypt_id(PACK_MAGIC, password.as_ref(), false) {
                encrypt_id(PACK_MAGIC, password.as_ref(), true)
            } else {
                encrypt_id(NOPACK_MAGIC, password.as_ref(), true)
            };
        }

        if header == encrypt_id(PACK_MAGIC, password.as_ref(), true) {
            let mut n = NormalFile::new();
            n.pack = true;
            n.codec = Some(Codec::Decode(Box::new(LzssDecoder::new())));
            n.parent = Some(Box::new(parent));
            n.todo = i64::MAX;
            n.old_crypt = old_crypt;
            if old_crypt {
                n.key = password.as_ref().map(KeyStream::new);
            }
            n.password = password;
            Ok(Self::from_normal(n))
        } else if header == encrypt_id(NOPACK_MAGIC, password.as_ref(), true) {
            // Raw data behind the no-pack magic; hand back the raw
            // layer, already positioned past the magic.
            Ok(parent)
        } else {
            Err(PackError::invalid_magic(PACK_MAGIC, header))
        }
    }

    /// Wrap a custom backend. Chunk and compression layers are not
    /// available on custom streams.
    pub fn from_ops(ops: Box<dyn PackOps>) -> Self {
        Self {
            backend: Backend::Custom(ops),
        }
    }

    pub(crate) fn from_normal(n: NormalFile) -> Self {
        Self {
            backend: Backend::Normal(n),
        }
    }

    /// Close the stream, flushing buffered writes all the way down.
    ///
    /// Closing an open write chunk finishes the chunk first and then
    /// closes its parent chain. Dropping a write stream without calling
    /// this loses whatever is still buffered.
    pub fn close(self) -> Result<()> {
        let is_write_chunk = matches!(&self.backend, Backend::Normal(n) if n.write && n.chunk);
        if is_write_chunk {
            return self.close_chunk()?.close();
        }
        match self.backend {
            Backend::Normal(mut n) => n.close_stream(),
            Backend::Custom(mut ops) => ops.close(),
        }
    }

    /// Read one byte, or `None` at end of stream or on error.
    pub fn getc(&mut self) -> Option<u8> {
        match &mut self.backend {
            Backend::Normal(n) => n.getc(),
            Backend::Custom(ops) => ops.get_byte(),
        }
    }

    /// Write one byte; false latches the error flag.
    pub fn putc(&mut self, byte: u8) -> bool {
        match &mut self.backend {
            Backend::Normal(n) => n.putc(byte),
            Backend::Custom(ops) => ops.put_byte(byte),
        }
    }

    /// Push one byte back so the next read returns it. Only a bounded
    /// amount of lookback is available; false means there was no room.
    pub fn unget(&mut self, byte: u8) -> bool {
        match &mut self.backend {
            Backend::Normal(n) => n.unget(byte),
            Backend::Custom(ops) => ops.unget_byte(byte),
        }
    }

    /// Read up to `buf.len()` bytes, returning how many were read.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        match &mut self.backend {
            Backend::Normal(n) => {
                let mut i = 0;
                while i < buf.len() {
                    match n.getc() {
                        Some(c) => {
                            buf[i] = c;
                            i += 1;
                        }
                        None => break,
                    }
                }
                i
            }
            Backend::Custom(ops) => ops.read(buf),
        }
    }

    /// Write up to `buf.len()` bytes, returning how many were written.
    pub fn write_bytes(&mut self, buf: &[u8]) -> usize {
        match &mut self.backend {
            Backend::Normal(n) => {
                let mut i = 0;
                while i < buf.len() {
                    if !n.putc(buf[i]) {
                        break;
                    }
                    i += 1;
                }
                i
            }
            Backend::Custom(ops) => ops.write(buf),
        }
    }

    /// Skip forward `offset` bytes. Only forward seeks are supported,
    /// and only on read streams; compressed and encrypted data is read
    /// through rather than seeked over.
    pub fn seek_forward(&mut self, offset: usize) -> Result<()> {
        match &mut self.backend {
            Backend::Normal(n) => n.seek_forward(offset),
            Backend::Custom(ops) => ops.seek_forward(offset),
        }
    }

    /// True once the stream has been read to its end.
    pub fn at_eof(&self) -> bool {
        match &self.backend {
            Backend::Normal(n) => n.eof,
            Backend::Custom(ops) => ops.at_eof(),
        }
    }

    /// True after an unrecoverable stream error.
    pub fn has_error(&self) -> bool {
        match &self.backend {
            Backend::Normal(n) => n.error,
            Backend::Custom(ops) => ops.has_error(),
        }
    }

    /// On-disk byte count of the chunk this stream reads, if it is one.
    pub fn chunk_raw_size(&self) -> Option<u32> {
        match &self.backend {
            Backend::Normal(n) => n.chunk_sizes.map(|s| s.raw),
            Backend::Custom(_) => None,
        }
    }

    /// Logical (uncompressed) byte count of the chunk this stream reads.
    pub fn chunk_data_size(&self) -> Option<u32> {
        match &self.backend {
            Backend::Normal(n) => n.chunk_sizes.map(|s| s.logical.unsigned_abs()),
            Backend::Custom(_) => None,
        }
    }

    pub(crate) fn todo(&self) -> i64 {
        match &self.backend {
            Backend::Normal(n) => n.todo,
            Backend::Custom(_) => 0,
        }
    }

    pub(crate) fn password(&self) -> Option<Password> {
        match &self.backend {
            Backend::Normal(n) => n.password.clone(),
            Backend::Custom(_) => None,
        }
    }

    /// Take back the underlying file of a raw layer.
    fn into_handle(self) -> Result<File> {
        match self.backend {
            Backend::Normal(NormalFile {
                handle: Some(handle),
                ..
            }) => Ok(handle),
            _ => Err(PackError::invalid_state("stream has no underlying file")),
        }
    }

    // ----- byte-order helpers -----

    /// Read a 16-bit little-endian word.
    pub fn get_u16_le(&mut self) -> Option<u16> {
        let b1 = self.getc()?;
        let b2 = self.getc()?;
        Some(u16::from(b1) | u16::from(b2) << 8)
    }

    /// Read a 32-bit little-endian word.
    pub fn get_u32_le(&mut self) -> Option<u32> {
        let b1 = self.getc()?;
        let b2 = self.getc()?;
        let b3 = self.getc()?;
        let b4 = self.getc()?;
        Some(u32::from(b1) | u32::from(b2) << 8 | u32::from(b3) << 16 | u32::from(b4) << 24)
    }

    /// Read a 16-bit big-endian word.
    pub fn get_u16_be(&mut self) -> Option<u16> {
        let b1 = self.getc()?;
        let b2 = self.getc()?;
        Some(u16::from(b1) << 8 | u16::from(b2))
    }

    /// Read a 32-bit big-endian word.
    pub fn get_u32_be(&mut self) -> Option<u32> {
        let b1 = self.getc()?;
        let b2 = self.getc()?;
        let b3 = self.getc()?;
        let b4 = self.getc()?;
        Some(u32::from(b1) << 24 | u32::from(b2) << 16 | u32::from(b3) << 8 | u32::from(b4))
    }

    /// Write a 16-bit little-endian word.
    pub fn put_u16_le(&mut self, w: u16) -> bool {
        self.putc(w as u8) && self.putc((w >> 8) as u8)
    }

    /// Write a 32-bit little-endian word.
    pub fn put_u32_le(&mut self, l: u32) -> bool {
        self.putc(l as u8)
            && self.putc((l >> 8) as u8)
            && self.putc((l >> 16) as u8)
            && self.putc((l >> 24) as u8)
    }

    /// Write a 16-bit big-endian word.
    pub fn put_u16_be(&mut self, w: u16) -> bool {
        self.putc((w >> 8) as u8) && self.putc(w as u8)
    }

    /// Write a 32-bit big-endian word.
    pub fn put_u32_be(&mut self, l: u32) -> bool {
        self.putc((l >> 24) as u8)
            && self.putc((l >> 16) as u8)
            && self.putc((l >> 8) as u8)
            && self.putc(l as u8)
    }

    /// Write a signed 32-bit big-endian word.
    pub fn put_i32_be(&mut self, l: i32) -> bool {
        self.put_u32_be(l as u32)
    }
}

impl CodecStream for PackFile {
    fn get_byte(&mut self) -> Option<u8> {
        self.getc()
    }

    fn put_byte(&mut self, byte: u8) -> bool {
        self.putc(byte)
    }

    fn has_error(&self) -> bool {
        PackFile::has_error(self)
    }

    fn legacy_key_byte(&mut self) -> Option<u8> {
        match &mut self.backend {
            Backend::Normal(n) if n.old_crypt => n.key.as_mut().map(KeyStream::next_byte),
            _ => None,
        }
    }
}

impl io::Read for PackFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.read_bytes(buf);
        if n == 0 && !buf.is_empty() && self.has_error() {
            return Err(io::Error::other("packfile stream error"));
        }
        Ok(n)
    }
}

impl io::Write for PackFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.write_bytes(buf);
        if n == 0 && !buf.is_empty() {
            return Err(io::Error::other("packfile stream error"));
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.backend {
            Backend::Normal(n) if n.write => n.flush(false).map_err(io::Error::other),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for PackFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.backend {
            Backend::Normal(n) => f
                .debug_struct("PackFile")
                .field("write", &n.write)
                .field("pack", &n.pack)
                .field("chunk", &n.chunk)
                .field("todo", &n.todo)
                .field("eof", &n.eof)
                .field("error", &n.error)
                .finish_non_exhaustive(),
            Backend::Custom(_) => f.debug_struct("PackFile").field("custom", &true).finish(),
        }
    }
}
