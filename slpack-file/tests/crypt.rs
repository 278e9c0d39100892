//! Encryption integration tests: new-format whole-stream XOR, masked
//! magics, wrong-password detection, and the old control-byte cipher.

use slpack_core::{CodecStream, KeyStream, encrypt_id};
use slpack_file::{NOPACK_MAGIC, OpenMode, PACK_MAGIC, PackError, PackFile, Password};
use slpack_lzss::LzssEncoder;
use std::path::PathBuf;

struct TestPath {
    _dir: tempfile::TempDir,
    path: PathBuf,
}

impl AsRef<std::path::Path> for TestPath {
    fn as_ref(&self) -> &std::path::Path {
        &self.path
    }
}

fn temp_path(name: &str) -> TestPath {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    TestPath { _dir: dir, path }
}

fn password() -> Password {
    Password::new("correct horse").unwrap()
}

/// First four keystream bytes as a big-endian word: what the raw layer
/// XORs over a 32-bit value at the start of a stream.
fn key_word(pw: &Password) -> u32 {
    let mut ks = KeyStream::new(pw);
    u32::from_be_bytes([
        ks.next_byte(),
        ks.next_byte(),
        ks.next_byte(),
        ks.next_byte(),
    ])
}

#[test]
fn test_encrypted_raw_roundtrip() {
    let path = temp_path("raw.enc");
    let pw = password();

    let mut f = PackFile::open_with_password(&path, OpenMode::Write, Some(&pw)).unwrap();
    f.write_bytes(b"secret payload");
    f.close().unwrap();

    let raw = std::fs::read(&path).unwrap();
    assert_ne!(&raw[..], b"secret payload", "bytes must not be in the clear");

    let mut f = PackFile::open_with_password(&path, OpenMode::Read, Some(&pw)).unwrap();
    let mut buf = [0u8; 32];
    let n = f.read_bytes(&mut buf);
    assert_eq!(&buf[..n], b"secret payload");
}

#[test]
fn test_encrypted_packed_roundtrip() {
    let path = temp_path("packed.enc");
    let pw = password();
    let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 37) as u8).collect();

    let mut f = PackFile::open_with_password(&path, OpenMode::WritePacked, Some(&pw)).unwrap();
    assert_eq!(f.write_bytes(&payload), payload.len());
    f.close().unwrap();

    // The magic is masked by the password and the raw layer's keystream.
    let raw = std::fs::read(&path).unwrap();
    let header = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
    assert_ne!(header, PACK_MAGIC);
    assert_eq!(header ^ key_word(&pw), encrypt_id(PACK_MAGIC, Some(&pw), true));

    let mut f = PackFile::open_with_password(&path, OpenMode::ReadPacked, Some(&pw)).unwrap();
    let mut back = vec![0u8; payload.len() + 16];
    let n = f.read_bytes(&mut back);
    assert_eq!(&back[..n], &payload[..]);
}

#[test]
fn test_wrong_password_is_rejected() {
    let path = temp_path("wrongpw.enc");
    let pw = password();

    let mut f = PackFile::open_with_password(&path, OpenMode::WritePacked, Some(&pw)).unwrap();
    f.write_bytes(b"data");
    f.close().unwrap();

    let other = Password::new("not the password").unwrap();
    match PackFile::open_with_password(&path, OpenMode::ReadPacked, Some(&other)) {
        Err(PackError::InvalidMagic { .. }) => {}
        other => panic!("expected InvalidMagic, got {other:?}"),
    }
}

#[test]
fn test_wrong_password_on_raw_stream_yields_garbage() {
    // A raw stream carries no magic, so a wrong key is not detectable;
    // the read succeeds but produces garbage.
    let path = temp_path("garbage.enc");
    let pw = password();

    let mut f = PackFile::open_with_password(&path, OpenMode::Write, Some(&pw)).unwrap();
    f.write_bytes(b"plaintext");
    f.close().unwrap();

    let other = Password::new("zzz").unwrap();
    let mut f = PackFile::open_with_password(&path, OpenMode::Read, Some(&other)).unwrap();
    let mut buf = [0u8; 16];
    let n = f.read_bytes(&mut buf);
    assert_eq!(n, 9);
    assert_ne!(&buf[..n], b"plaintext");
    assert!(!f.has_error());
}

#[test]
fn test_encrypted_nopack_fallback() {
    let path = temp_path("nopack.enc");
    let pw = password();

    let mut f = PackFile::open_with_password(&path, OpenMode::WriteNoPack, Some(&pw)).unwrap();
    f.write_bytes(b"unpacked but masked");
    f.close().unwrap();

    let mut f = PackFile::open_with_password(&path, OpenMode::ReadPacked, Some(&pw)).unwrap();
    let mut buf = [0u8; 32];
    let n = f.read_bytes(&mut buf);
    assert_eq!(&buf[..n], b"unpacked but masked");
}

#[test]
fn test_encrypted_chunks_roundtrip() {
    let path = temp_path("chunks.enc");
    let pw = password();
    let body = vec![b'c'; 3_000];

    let f = PackFile::open_with_password(&path, OpenMode::Write, Some(&pw)).unwrap();
    let mut chunk = f.open_chunk(true).unwrap();
    chunk.write_bytes(&body);
    let mut f = chunk.close_chunk().unwrap();
    f.write_bytes(b"outside");
    f.close().unwrap();

    let f = PackFile::open_with_password(&path, OpenMode::Read, Some(&pw)).unwrap();
    let mut chunk = f.open_chunk(false).unwrap();
    assert_eq!(chunk.chunk_data_size(), Some(3_000));
    let mut back = vec![0u8; body.len() + 16];
    let n = chunk.read_bytes(&mut back);
    assert_eq!(&back[..n], &body[..]);
    let mut f = chunk.close_chunk().unwrap();
    let mut buf = [0u8; 16];
    let n = f.read_bytes(&mut buf);
    assert_eq!(&buf[..n], b"outside");
}

/// Sink that applies the old-format cipher: the compressor asks for one
/// key byte per control byte, and nothing else is masked.
struct LegacySink {
    bytes: Vec<u8>,
    key: KeyStream,
}

impl CodecStream for LegacySink {
    fn get_byte(&mut self) -> Option<u8> {
        None
    }

    fn put_byte(&mut self, byte: u8) -> bool {
        self.bytes.push(byte);
        true
    }

    fn has_error(&self) -> bool {
        false
    }

    fn legacy_key_byte(&mut self) -> Option<u8> {
        Some(self.key.next_byte())
    }
}

fn write_legacy_file(path: impl AsRef<std::path::Path>, pw: &Password, payload: &[u8]) {
    let mut sink = LegacySink {
        bytes: Vec::new(),
        key: KeyStream::new(pw),
    };
    let mut enc = LzssEncoder::new();
    enc.encode(&mut sink, payload, true).unwrap();

    // On disk the old format stored the masked magic without the raw
    // keystream XOR; the old-format mask differs from the stored value
    // by exactly the leading keystream word.
    let stored = encrypt_id(PACK_MAGIC, Some(pw), false) ^ key_word(pw);
    let mut bytes = stored.to_be_bytes().to_vec();
    bytes.extend_from_slice(&sink.bytes);
    std::fs::write(path, bytes).unwrap();
}

#[test]
fn test_old_format_packed_file_is_detected_and_read() {
    let path = temp_path("legacy.enc");
    let pw = password();
    let payload = b"payload from the old cipher days ".repeat(40);

    write_legacy_file(&path, &pw, &payload);

    let mut f = PackFile::open_with_password(&path, OpenMode::ReadPacked, Some(&pw)).unwrap();
    let mut back = vec![0u8; payload.len() + 16];
    let n = f.read_bytes(&mut back);
    assert_eq!(&back[..n], &payload[..]);
}

#[test]
fn test_old_format_nopack_file_reads_raw() {
    let path = temp_path("legacy_nopack.enc");
    let pw = password();

    // Old no-pack files masked only the magic.
    let stored = encrypt_id(NOPACK_MAGIC, Some(&pw), false) ^ key_word(&pw);
    let mut bytes = stored.to_be_bytes().to_vec();
    bytes.extend_from_slice(b"stored in the clear");
    std::fs::write(&path, &bytes).unwrap();

    let mut f = PackFile::open_with_password(&path, OpenMode::ReadPacked, Some(&pw)).unwrap();
    let mut buf = [0u8; 32];
    let n = f.read_bytes(&mut buf);
    assert_eq!(&buf[..n], b"stored in the clear");
}
