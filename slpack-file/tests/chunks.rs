//! Chunk protocol integration tests: framing, nesting, skipping, and
//! the bounded read window.

use slpack_file::{OpenMode, PackFile};
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

#[test]
fn test_uncompressed_chunk_roundtrip() {
    let path = temp_path("plain.dat");

    let f = PackFile::open(&path, OpenMode::Write).unwrap();
    let mut chunk = f.open_chunk(false).unwrap();
    assert_eq!(chunk.write_bytes(b"chunk body"), 10);
    let f = chunk.close_chunk().unwrap();
    f.close().unwrap();

    let f = PackFile::open(&path, OpenMode::Read).unwrap();
    let mut chunk = f.open_chunk(false).unwrap();
    // Both length words carry the body size for an uncompressed chunk.
    assert_eq!(chunk.chunk_raw_size(), Some(10));
    assert_eq!(chunk.chunk_data_size(), Some(10));
    let mut buf = [0u8; 32];
    let n = chunk.read_bytes(&mut buf);
    assert_eq!(&buf[..n], b"chunk body");
    let f = chunk.close_chunk().unwrap();
    f.close().unwrap();
}

#[test]
fn test_compressed_chunk_roundtrip() {
    let path = temp_path("packed.dat");
    let payload = vec![b'x'; 4_000];

    let f = PackFile::open(&path, OpenMode::Write).unwrap();
    let mut chunk = f.open_chunk(true).unwrap();
    assert_eq!(chunk.write_bytes(&payload), payload.len());
    let f = chunk.close_chunk().unwrap();
    f.close().unwrap();

    let f = PackFile::open(&path, OpenMode::Read).unwrap();
    let mut chunk = f.open_chunk(false).unwrap();
    assert_eq!(chunk.chunk_data_size(), Some(4_000));
    let raw = chunk.chunk_raw_size().unwrap();
    assert!(raw < 4_000, "repetitive body should compress (raw={raw})");
    let mut back = vec![0u8; payload.len() + 16];
    let n = chunk.read_bytes(&mut back);
    assert_eq!(&back[..n], &payload[..]);
    let f = chunk.close_chunk().unwrap();
    f.close().unwrap();
}

#[test]
fn test_chunk_read_is_bounded() {
    let path = temp_path("bounded.dat");

    let f = PackFile::open(&path, OpenMode::Write).unwrap();
    let mut chunk = f.open_chunk(false).unwrap();
    chunk.write_bytes(b"abc");
    let mut f = chunk.close_chunk().unwrap();
    f.write_bytes(b"TRAILER");
    f.close().unwrap();

    let f = PackFile::open(&path, OpenMode::Read).unwrap();
    let mut chunk = f.open_chunk(false).unwrap();
    let mut buf = [0u8; 64];
    let n = chunk.read_bytes(&mut buf);
    // The chunk window ends at the frame even though the file goes on.
    assert_eq!(&buf[..n], b"abc");
    assert!(chunk.at_eof());
    assert_eq!(chunk.getc(), None);
    // End of the frame is not an error condition.
    assert!(!chunk.has_error());

    let mut f = chunk.close_chunk().unwrap();
    let n = f.read_bytes(&mut buf);
    assert_eq!(&buf[..n], b"TRAILER");
}

#[test]
fn test_close_chunk_drains_unread_body() {
    let path = temp_path("drain.dat");

    let f = PackFile::open(&path, OpenMode::Write).unwrap();
    let mut chunk = f.open_chunk(false).unwrap();
    chunk.write_bytes(b"0123456789");
    let mut f = chunk.close_chunk().unwrap();
    f.write_bytes(b"after");
    f.close().unwrap();

    let f = PackFile::open(&path, OpenMode::Read).unwrap();
    let mut chunk = f.open_chunk(false).unwrap();
    assert_eq!(chunk.getc(), Some(b'0'));
    assert_eq!(chunk.getc(), Some(b'1'));
    // Close with eight bytes unread; the parent must land after the frame.
    let mut f = chunk.close_chunk().unwrap();
    let mut buf = [0u8; 16];
    let n = f.read_bytes(&mut buf);
    assert_eq!(&buf[..n], b"after");
}

#[test]
fn test_nested_chunks() {
    let path = temp_path("nested.dat");

    let f = PackFile::open(&path, OpenMode::Write).unwrap();
    let mut outer = f.open_chunk(false).unwrap();
    outer.write_bytes(b"head:");
    let mut inner = outer.open_chunk(true).unwrap();
    inner.write_bytes(&[b'i'; 500]);
    let mut outer = inner.close_chunk().unwrap();
    outer.write_bytes(b":tail");
    let f = outer.close_chunk().unwrap();
    f.close().unwrap();

    let f = PackFile::open(&path, OpenMode::Read).unwrap();
    let mut outer = f.open_chunk(false).unwrap();
    let mut buf = [0u8; 5];
    outer.read_bytes(&mut buf);
    assert_eq!(&buf, b"head:");

    let mut inner = outer.open_chunk(false).unwrap();
    assert_eq!(inner.chunk_data_size(), Some(500));
    let mut body = vec![0u8; 600];
    let n = inner.read_bytes(&mut body);
    assert_eq!(&body[..n], &[b'i'; 500][..]);
    let mut outer = inner.close_chunk().unwrap();

    outer.read_bytes(&mut buf);
    assert_eq!(&buf, b":tail");
    let f = outer.close_chunk().unwrap();
    f.close().unwrap();
}

#[test]
fn test_skip_chunks_lands_on_next_frame() {
    // Ten 'A's written five times into an uncompressed chunk, then the
    // same into a compressed sibling; skipping the first and reading 40
    // bytes from the second must give exactly forty 'A's.
    let path = temp_path("skip.dat");

    let f = PackFile::open(&path, OpenMode::Write).unwrap();
    let mut chunk = f.open_chunk(false).unwrap();
    for _ in 0..5 {
        chunk.write_bytes(b"AAAAAAAAAA");
    }
    let f = chunk.close_chunk().unwrap();
    let mut chunk = f.open_chunk(true).unwrap();
    for _ in 0..5 {
        chunk.write_bytes(b"AAAAAAAAAA");
    }
    let f = chunk.close_chunk().unwrap();
    f.close().unwrap();

    let mut f = PackFile::open(&path, OpenMode::Read).unwrap();
    f.skip_chunks(1).unwrap();
    let mut chunk = f.open_chunk(false).unwrap();
    let mut buf = [0u8; 40];
    assert_eq!(chunk.read_bytes(&mut buf), 40);
    assert_eq!(&buf[..], &[b'A'; 40][..]);
    chunk.close_chunk().unwrap().close().unwrap();
}

#[test]
fn test_skip_equals_open_close() {
    // Skipping must position the parent exactly like an open and an
    // immediate close of the same chunk.
    let path = temp_path("skipeq.dat");

    let f = PackFile::open(&path, OpenMode::Write).unwrap();
    let mut chunk = f.open_chunk(true).unwrap();
    chunk.write_bytes(&[b'1'; 300]);
    let f = chunk.close_chunk().unwrap();
    let mut chunk = f.open_chunk(false).unwrap();
    chunk.write_bytes(b"sibling");
    let f = chunk.close_chunk().unwrap();
    f.close().unwrap();

    let mut skipped = PackFile::open(&path, OpenMode::Read).unwrap();
    skipped.skip_chunks(1).unwrap();

    let walked = PackFile::open(&path, OpenMode::Read).unwrap();
    let walked = walked.open_chunk(false).unwrap().close_chunk().unwrap();

    for mut f in [skipped, walked] {
        let mut chunk = f.open_chunk(false).unwrap();
        let mut buf = [0u8; 16];
        let n = chunk.read_bytes(&mut buf);
        assert_eq!(&buf[..n], b"sibling");
        f = chunk.close_chunk().unwrap();
        f.close().unwrap();
    }
}

#[test]
fn test_five_sibling_chunks_roundtrip() {
    let path = temp_path("five.dat");
    let bodies: [&[u8]; 5] = [
        b"first",
        &[b'2'; 900],
        b"third sibling, stored plain",
        &[b'4'; 2_500],
        b"fifth and last",
    ];
    let compress = [false, true, false, true, false];

    let mut f = PackFile::open(&path, OpenMode::Write).unwrap();
    for (body, pack) in bodies.iter().zip(compress) {
        let mut chunk = f.open_chunk(pack).unwrap();
        assert_eq!(chunk.write_bytes(body), body.len());
        f = chunk.close_chunk().unwrap();
    }
    f.close().unwrap();

    // Walk all five in order.
    let mut f = PackFile::open(&path, OpenMode::Read).unwrap();
    for body in bodies {
        let mut chunk = f.open_chunk(false).unwrap();
        assert_eq!(chunk.chunk_data_size(), Some(body.len() as u32));
        let mut back = vec![0u8; body.len() + 16];
        let n = chunk.read_bytes(&mut back);
        assert_eq!(&back[..n], body);
        f = chunk.close_chunk().unwrap();
    }
    assert_eq!(f.getc(), None);
    f.close().unwrap();

    // Skipping zero chunks is a no-op; skipping two more lands on the
    // third sibling regardless of how its neighbors were stored.
    let mut f = PackFile::open(&path, OpenMode::Read).unwrap();
    f.skip_chunks(0).unwrap();
    f.skip_chunks(2).unwrap();
    let mut chunk = f.open_chunk(false).unwrap();
    let mut back = [0u8; 32];
    let n = chunk.read_bytes(&mut back);
    assert_eq!(&back[..n], b"third sibling, stored plain");
    chunk.close_chunk().unwrap().close().unwrap();
}

#[test]
fn test_skip_chunks_past_end_fails() {
    let path = temp_path("skiperr.dat");

    let f = PackFile::open(&path, OpenMode::Write).unwrap();
    let mut chunk = f.open_chunk(false).unwrap();
    chunk.write_bytes(b"only one");
    chunk.close_chunk().unwrap().close().unwrap();

    let mut f = PackFile::open(&path, OpenMode::Read).unwrap();
    f.skip_chunks(1).unwrap();
    assert!(f.skip_chunks(1).is_err());
}

#[test]
fn test_chunks_inside_packed_stream() {
    // The chunk body gets compressed twice: once by the chunk, once by
    // the stream it rides on.
    let path = temp_path("double.dat");
    let payload = vec![b'd'; 2_000];

    let f = PackFile::open(&path, OpenMode::WritePacked).unwrap();
    let mut chunk = f.open_chunk(true).unwrap();
    chunk.write_bytes(&payload);
    let f = chunk.close_chunk().unwrap();
    f.close().unwrap();

    let f = PackFile::open(&path, OpenMode::ReadPacked).unwrap();
    let mut chunk = f.open_chunk(false).unwrap();
    let mut back = vec![0u8; payload.len() + 16];
    let n = chunk.read_bytes(&mut back);
    assert_eq!(&back[..n], &payload[..]);
    chunk.close_chunk().unwrap().close().unwrap();
}

#[test]
fn test_closing_write_chunk_via_close_finishes_it() {
    let path = temp_path("implicit.dat");

    let f = PackFile::open(&path, OpenMode::Write).unwrap();
    let mut chunk = f.open_chunk(false).unwrap();
    chunk.write_bytes(b"implicit");
    // close() on an open write chunk finalizes the chunk and then the
    // whole parent chain.
    chunk.close().unwrap();

    let f = PackFile::open(&path, OpenMode::Read).unwrap();
    let mut chunk = f.open_chunk(false).unwrap();
    let mut buf = [0u8; 16];
    let n = chunk.read_bytes(&mut buf);
    assert_eq!(&buf[..n], b"implicit");
}
