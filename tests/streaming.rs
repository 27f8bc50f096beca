//! Stream-level behaviour: chunking, read sizes, flushing, truncation and
//! terminal states.

use std::io::{self, ErrorKind, Read, Write};

use hex_literal::hex;
use proptest::prelude::*;

use bzstream::errors::{CodecErrorKind, Error};
use bzstream::header::{BlockKind, StreamHeader};
use bzstream::stream::{compress_to_vec, decompress_to_vec};
use bzstream::{Config, Reader, Writer, MAGIC_NUMBER};

fn compress_chunked(data: &[u8], cuts: &[usize], config: &Config) -> Vec<u8> {
    let mut writer = Writer::with_config(Vec::new(), config).unwrap();
    let mut rest = data;
    for &cut in cuts {
        let (head, tail) = rest.split_at(cut.min(rest.len()));
        assert_eq!(writer.write(head).unwrap(), head.len());
        rest = tail;
    }
    writer.write_all(rest).unwrap();
    writer.finish().unwrap()
}

fn decompress_with_buf(compressed: &[u8], buf_len: usize) -> Vec<u8> {
    let mut reader = Reader::new(compressed).unwrap();
    let mut out = Vec::new();
    let mut buf = vec![0_u8; buf_len];
    loop {
        let n = reader.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    out
}

fn codec_kind(err: &io::Error) -> Option<CodecErrorKind> {
    Error::downcast_io(err).and_then(Error::codec_kind)
}

fn compressible(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| b"the quick brown fox jumps over the lazy dog"[i % 43] ^ (i / 997) as u8)
        .collect()
}

#[test]
fn hundred_thousand_a() {
    let data = vec![b'a'; 100_000];
    let mut writer = Writer::new(Vec::new()).unwrap();
    assert_eq!(writer.write(&data).unwrap(), data.len());
    writer.close().unwrap();
    let compressed = writer.into_inner();

    assert_eq!(&compressed[..3], MAGIC_NUMBER);
    assert_eq!(&compressed[..4], b"BZh9");
    let header = StreamHeader::parse(&compressed).unwrap();
    assert_eq!(header.first_block, BlockKind::Data);

    let mut reader = Reader::new(&compressed[..]).unwrap();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    assert_eq!(out.len(), 100_000);
    assert!(out.iter().all(|&b| b == b'a'));
    let mut buf = [0_u8; 32];
    assert_eq!(reader.read(&mut buf).unwrap(), 0);
}

#[test]
fn empty_input_round_trip() {
    let compressed = compress_to_vec(&[], &Config::default()).unwrap();
    assert_eq!(&compressed[..], &hex!("425a6839 177245385090 00000000")[..]);
    assert_eq!(hex::encode(&compressed), "425a683917724538509000000000");
    let header = StreamHeader::parse(&compressed).unwrap();
    assert_eq!(header.first_block, BlockKind::EndOfStream);
    assert!(decompress_to_vec(&compressed, &Config::default())
        .unwrap()
        .is_empty());
}

#[test]
fn flush_then_continue() {
    let mut writer = Writer::new(Vec::new()).unwrap();
    writer.write_all(b"first half, ").unwrap();
    writer.flush().unwrap();
    let flushed = writer.get_ref().len();
    assert!(flushed > 0, "flush must push out a block");
    writer.flush().unwrap();
    writer.write_all(b"second half").unwrap();
    writer.close().unwrap();
    let compressed = writer.into_inner();
    assert!(compressed.len() > flushed);

    let out = decompress_to_vec(&compressed, &Config::default()).unwrap();
    assert_eq!(out, b"first half, second half");
}

#[test]
fn truncated_input_is_never_silent() {
    let data = compressible(150_000);
    let compressed = compress_to_vec(&data, &Config::fast()).unwrap();
    for cut in [4, 10, 11, 50, compressed.len() / 2, compressed.len() - 1] {
        let mut reader = Reader::new(&compressed[..cut]).unwrap();
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        let kind = codec_kind(&err);
        assert!(
            matches!(
                kind,
                Some(CodecErrorKind::UnexpectedEnd | CodecErrorKind::DataCorrupt)
            ),
            "cut at {cut}: {err}"
        );
        assert!(out.len() <= data.len());
    }
}

#[test]
fn bad_magic() {
    let garbage = b"GIF89a garbage that is certainly longer than a header".to_vec();
    let mut reader = Reader::new(&garbage[..]).unwrap();
    let mut buf = [0_u8; 128];
    let err = reader.read(&mut buf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
    assert_eq!(codec_kind(&err), Some(CodecErrorKind::BadMagic));

    // recorded, not retried
    let again = reader.read(&mut buf).unwrap_err();
    assert_eq!(codec_kind(&again), Some(CodecErrorKind::BadMagic));
    let closed = reader.close().unwrap_err();
    assert_eq!(closed.codec_kind(), Some(CodecErrorKind::BadMagic));
    let closed = reader.close().unwrap_err();
    assert_eq!(closed.codec_kind(), Some(CodecErrorKind::BadMagic));
}

#[test]
fn corrupted_block_is_detected() {
    let data = compressible(50_000);
    let mut compressed = compress_to_vec(&data, &Config::default()).unwrap();
    let middle = compressed.len() / 2;
    compressed[middle] ^= 0x55;
    let err = decompress_to_vec(&compressed, &Config::default()).unwrap_err();
    // a flipped bit can also make the block look longer than the input
    assert!(matches!(
        err.codec_kind(),
        Some(CodecErrorKind::DataCorrupt | CodecErrorKind::UnexpectedEnd)
    ));
}

/// Reads until the decoder fails, returning what it produced and the error.
fn read_until_error(compressed: &[u8], buf_len: usize) -> (Vec<u8>, io::Error) {
    let mut reader = Reader::new(compressed).unwrap();
    let mut out = Vec::new();
    let mut buf = vec![0_u8; buf_len];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => panic!("corrupt stream decoded to a clean end"),
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(e) => return (out, e),
        }
    }
}

#[test]
fn block_crc_mismatch_keeps_decoded_bytes() {
    let data = compressible(12_000);
    let mut compressed = compress_to_vec(&data, &Config::default()).unwrap();
    // "BZh9", the 48-bit block magic, then the block CRC
    compressed[10] ^= 0xff;

    let (large, err) = read_until_error(&compressed, 1 << 20);
    assert_eq!(codec_kind(&err), Some(CodecErrorKind::DataCorrupt));
    let (small, err) = read_until_error(&compressed, 1);
    assert_eq!(codec_kind(&err), Some(CodecErrorKind::DataCorrupt));

    // the whole block is decoded before its checksum is compared
    assert_eq!(large, data);
    assert_eq!(small, data);
}

#[test]
fn trailing_bytes_after_stream_end_are_ignored() {
    let mut compressed = compress_to_vec(b"payload", &Config::default()).unwrap();
    compressed.extend_from_slice(b"junk after the trailer");
    let out = decompress_to_vec(&compressed, &Config::default()).unwrap();
    assert_eq!(out, b"payload");
}

#[test]
fn idempotent_close() {
    let mut writer = Writer::new(Vec::new()).unwrap();
    writer.write_all(b"close me twice").unwrap();
    writer.close().unwrap();
    for _ in 0..2 {
        assert!(matches!(writer.close(), Err(Error::Closed)));
    }
    let compressed = writer.into_inner();

    let mut reader = Reader::new(&compressed[..]).unwrap();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    reader.close().unwrap();
    reader.close().unwrap();
    assert_eq!(out, b"close me twice");
}

#[test]
fn closed_writer_rejects_writes() {
    let mut writer = Writer::new(Vec::new()).unwrap();
    writer.close().unwrap();
    let err = writer.write(b"x").unwrap_err();
    assert!(matches!(Error::downcast_io(&err), Some(Error::Closed)));
}

#[test]
fn multi_block_stream() {
    let data = compressible(350_000);
    let compressed = compress_to_vec(&data, &Config::fast()).unwrap();
    assert_eq!(&compressed[..4], b"BZh1");
    assert_eq!(decompress_to_vec(&compressed, &Config::default()).unwrap(), data);
}

#[test]
fn one_byte_and_large_reads_agree() {
    let data = compressible(40_000);
    let compressed = compress_to_vec(&data, &Config::default()).unwrap();
    let small = decompress_with_buf(&compressed, 1);
    let large = decompress_with_buf(&compressed, 64 * 1024);
    assert_eq!(small, data);
    assert_eq!(large, data);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn round_trip(data in proptest::collection::vec(any::<u8>(), 0..20_000)) {
        let compressed = compress_to_vec(&data, &Config::fast()).unwrap();
        prop_assert_eq!(decompress_to_vec(&compressed, &Config::default()).unwrap(), data);
    }

    #[test]
    fn chunking_does_not_change_output(
        data in proptest::collection::vec(0_u8..4, 0..50_000),
        cuts in proptest::collection::vec(0_usize..5_000, 0..16),
        capacity in 1_usize..4096,
    ) {
        let config = Config::fast().buffer_capacity(capacity);
        let whole = compress_to_vec(&data, &Config::fast()).unwrap();
        let chunked = compress_chunked(&data, &cuts, &config);
        prop_assert_eq!(whole, chunked);
    }

    #[test]
    fn read_size_does_not_change_output(
        len in 0_usize..30_000,
        buf_len in 1_usize..70_000,
        capacity in 1_usize..2048,
    ) {
        let data = compressible(len);
        let compressed = compress_to_vec(&data, &Config::default()).unwrap();
        let config = Config::default().buffer_capacity(capacity);
        let mut reader = Reader::with_config(&compressed[..], &config).unwrap();
        let mut out = Vec::new();
        let mut buf = vec![0_u8; buf_len];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        prop_assert_eq!(out, data);
    }
}
