//! Length-framed sub-streams.
//!
//! A chunk frames part of a stream with two big-endian length words: the
//! on-disk size of the body, then its logical size, negated when the
//! body is separately compressed. Writing stages the body in a scratch
//! file so the sizes are known before anything reaches the parent;
//! reading bounds the byte budget so a reader cannot run past the frame.
//!
//! Opening a chunk consumes the parent stream and closing the chunk
//! returns it, so only one chunk can be active on a stream at a time.

use std::io::{Seek, SeekFrom};

use log::debug;
use slpack_core::{PackError, Result, encrypt_id};
use slpack_lzss::LzssDecoder;

use crate::file::{Backend, ChunkSizes, Codec, NormalFile, PACK_MAGIC, PackFile};
use crate::mode::OpenMode;
use crate::temp;

impl PackFile {
    /// Open a sub-chunk on this stream, consuming it.
    ///
    /// On a write stream, `pack` compresses the chunk body on its own,
    /// independently of whether the parent compresses. On a read stream
    /// `pack` is ignored; the chunk header says whether the body is
    /// compressed.
    ///
    /// Get the parent back with [`PackFile::close_chunk`]. Custom
    /// backends do not support chunks. On error the stream is gone, like
    /// any failed close.
    pub fn open_chunk(self, pack: bool) -> Result<PackFile> {
        match &self.backend {
            Backend::Normal(n) if n.write => self.open_write_chunk(pack),
            Backend::Normal(_) => self.open_read_chunk(),
            Backend::Custom(_) => Err(PackError::invalid_state(
                "chunks are not supported on custom streams",
            )),
        }
    }

    fn open_write_chunk(self, pack: bool) -> Result<PackFile> {
        debug!("opening write chunk (pack={pack})");
        let (scratch_file, scratch_path) = temp::scratch_file()?.into_parts();

        let mode = if pack {
            OpenMode::WritePacked
        } else {
            OpenMode::WriteNoPack
        };
        let mut chunk = PackFile::from_file(scratch_file, mode, self.password())?;

        if let Backend::Normal(n) = &mut chunk.backend {
            n.chunk = true;
            n.scratch = Some(scratch_path);
            if pack {
                // The real parent rides beneath the scratch writer until
                // the chunk closes.
                if let Some(raw) = n.parent.as_mut() {
                    if let Backend::Normal(r) = &mut raw.backend {
                        r.parent = Some(Box::new(self));
                    }
                }
            } else {
                n.parent = Some(Box::new(self));
            }
        }
        Ok(chunk)
    }

    fn open_read_chunk(mut self) -> Result<PackFile> {
        let Some(raw) = self.get_u32_be() else {
            return Err(PackError::unexpected_eof(8));
        };
        let Some(logical) = self.get_u32_be() else {
            return Err(PackError::unexpected_eof(4));
        };
        let logical = logical as i32;
        debug!("opening read chunk (raw={raw}, logical={logical})");

        let mut n = NormalFile::new();
        n.chunk = true;
        n.chunk_sizes = Some(ChunkSizes { raw, logical });

        if let Backend::Normal(p) = &mut self.backend {
            n.password = p.password.clone();
            if p.old_crypt {
                // Old-format cipher: the chunk freezes the current key
                // cursor while the parent rewinds to the key start for
                // the chunk body.
                n.old_crypt = true;
                n.key = p.key.clone();
                if let Some(key) = p.key.as_mut() {
                    key.set_position(0);
                }
            }
        }

        if logical < 0 {
            n.pack = true;
            n.codec = Some(Codec::Decode(Box::new(LzssDecoder::new())));
            n.todo = -i64::from(logical);
        } else {
            n.todo = i64::from(logical);
        }
        n.parent = Some(Box::new(self));
        Ok(PackFile::from_normal(n))
    }

    /// Close a chunk and get the parent stream back.
    ///
    /// Closing a read chunk drains its unread bytes so the parent lands
    /// right after the frame. Closing a write chunk writes the two
    /// length words and the staged body through the parent.
    pub fn close_chunk(self) -> Result<PackFile> {
        let Backend::Normal(n) = self.backend else {
            return Err(PackError::invalid_state(
                "chunks are not supported on custom streams",
            ));
        };
        if !n.chunk {
            return Err(PackError::precondition("stream is not an open chunk"));
        }
        if n.write {
            Self::close_write_chunk(n)
        } else {
            Self::close_read_chunk(n)
        }
    }

    fn close_read_chunk(mut n: NormalFile) -> Result<PackFile> {
        while n.todo > 0 {
            if n.getc().is_none() {
                break;
            }
        }

        let Some(mut parent) = n.parent.take() else {
            return Err(PackError::invalid_state("chunk lost its parent stream"));
        };
        if n.old_crypt {
            // Resynchronize the parent's key cursor to where the chunk
            // froze it.
            if let Backend::Normal(p) = &mut parent.backend {
                if let (Some(pk), Some(ck)) = (p.key.as_mut(), n.key.as_ref()) {
                    pk.set_position(ck.position());
                }
            }
        }
        Ok(*parent)
    }

    fn close_write_chunk(mut n: NormalFile) -> Result<PackFile> {
        // Clone the scratch handle now; the writer flushes into the same
        // file description when it closes.
        let scratch_handle = if n.pack {
            n.parent.as_ref().and_then(|raw| match &raw.backend {
                Backend::Normal(r) => r.handle.as_ref(),
                Backend::Custom(_) => None,
            })
        } else {
            n.handle.as_ref()
        };
        let Some(scratch_handle) = scratch_handle else {
            return Err(PackError::invalid_state("write chunk lost its scratch file"));
        };
        let mut reopen = scratch_handle.try_clone()?;

        // Staged plus flushed bytes, less the magic word.
        let datasize = n.todo + n.buf_size as i64 - 4;
        let password = n.password.clone();
        let scratch_path = n.scratch.take();

        // Detach the real parent before the scratch writer closes.
        let parent = if n.pack {
            n.parent
                .as_mut()
                .and_then(|raw| match &mut raw.backend {
                    Backend::Normal(r) => r.parent.take(),
                    Backend::Custom(_) => None,
                })
        } else {
            n.parent.take()
        };
        let Some(parent) = parent else {
            return Err(PackError::invalid_state("chunk lost its parent stream"));
        };

        n.chunk = false;
        PackFile::from_normal(n).close()?;

        // Read the staged body back and frame it into the parent.
        reopen.seek(SeekFrom::Start(0))?;
        let mut staged = PackFile::from_file(reopen, OpenMode::Read, password.clone())?;
        let filesize = staged.todo() - 4;
        let Some(header) = staged.get_u32_be() else {
            return Err(PackError::unexpected_eof(4));
        };
        debug!("closing write chunk (raw={filesize}, data={datasize})");

        let mut parent = *parent;
        parent.put_u32_be(filesize as u32);
        if header == encrypt_id(PACK_MAGIC, password.as_ref(), true) {
            parent.put_i32_be(-(datasize as i32));
        } else {
            parent.put_i32_be(datasize as i32);
        }
        while let Some(c) = staged.getc() {
            if !parent.putc(c) {
                break;
            }
        }
        staged.close()?;
        drop(scratch_path); // removes the staging file

        Ok(parent)
    }

    /// Skip `num_chunks` consecutive chunks without opening them, using
    /// the length words to seek over each body.
    pub fn skip_chunks(&mut self, num_chunks: u32) -> Result<()> {
        for _ in 0..num_chunks {
            let Some(raw) = self.get_u32_be() else {
                return Err(PackError::unexpected_eof(8));
            };
            if self.get_u32_be().is_none() {
                return Err(PackError::unexpected_eof(4));
            }
            debug_assert!((raw as i32) >= 0);
            self.seek_forward(raw as usize)?;
        }
        Ok(())
    }
}
