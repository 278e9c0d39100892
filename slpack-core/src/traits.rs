//! The seam between the LZSS codec and the stream layer.
//!
//! The codec never sees files or buffers of the container layer directly: it
//! pulls and pushes single bytes through a [`CodecStream`], which the
//! container implements on its `PackFile` handle. This keeps the codec crate
//! free of any container dependency (the codec reads its own input from, and
//! writes its own output to, the *parent* stream of the compressed layer).

/// Byte-level access the LZSS codec needs from the stream it sits on.
///
/// Failure follows the stream layer's EOF-plus-error-flag convention:
/// `get_byte` returns `None` on end of data *or* error, `put_byte` returns
/// `false` on error, and [`has_error`](CodecStream::has_error) disambiguates.
pub trait CodecStream {
    /// Read one byte. `None` means EOF or error.
    fn get_byte(&mut self) -> Option<u8>;

    /// Write one byte. `false` means the stream entered an error state.
    fn put_byte(&mut self, byte: u8) -> bool;

    /// True if a previous operation failed.
    fn has_error(&self) -> bool;

    /// Next keystream byte, only when the stream is in legacy cipher mode.
    ///
    /// In legacy mode the codec XORs each batch control byte against this;
    /// outside legacy mode whole-buffer ciphering happens at the raw layer
    /// and this returns `None`.
    fn legacy_key_byte(&mut self) -> Option<u8> {
        None
    }
}
