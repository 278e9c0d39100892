//! Stream open modes.

/// How to open a [`crate::PackFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read raw bytes.
    Read,
    /// Read a compressed stream. The file must start with a pack magic;
    /// a no-pack magic falls back to raw reading transparently.
    ReadPacked,
    /// Write raw bytes.
    Write,
    /// Write compressed, prefixed with the pack magic.
    WritePacked,
    /// Write raw bytes prefixed with the no-pack magic, so the file can
    /// later be opened with [`OpenMode::ReadPacked`].
    WriteNoPack,
}

impl OpenMode {
    /// True for the write modes.
    pub fn is_write(self) -> bool {
        matches!(self, Self::Write | Self::WritePacked | Self::WriteNoPack)
    }

    /// True for the modes that layer a compressor or decompressor on top
    /// of the raw stream.
    pub fn is_packed(self) -> bool {
        matches!(self, Self::ReadPacked | Self::WritePacked)
    }
}
