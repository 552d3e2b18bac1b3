mod common;

use std::io::SeekFrom;

use common::Fixture;
use scratchfs::{Error, FsOptions, StorageKind};

#[test]
fn non_tail_write_promotes_and_preserves_content() {
    let fixture = Fixture::with_options(FsOptions {
        max_quota: 1 << 20,
        chunk_overhead_override: Some(0),
        ..FsOptions::default()
    });
    fixture.write_file("/big", &[0u8; 10_000]);
    assert_eq!(fixture.fs.stats().chunk_count, 1);

    let mut handle = fixture.fs.open("/big", "r+b").expect("reopen");
    handle.seek(SeekFrom::Start(100)).expect("seek");
    handle.write(b"marker").expect("non-tail write");
    handle.close();

    let data = fixture.read_file("/big");
    assert_eq!(data.len(), 10_000);
    assert_eq!(&data[100..106], b"marker");
    assert!(data[..100].iter().all(|&b| b == 0));
    assert!(data[106..].iter().all(|&b| b == 0));

    let stats = fixture.fs.stats();
    assert_eq!(stats.chunk_count, 0, "the file must have promoted");
    assert_eq!(stats.used_bytes, 10_000);
}

#[test]
fn promotion_accounting_nets_out_to_the_buffer_size() {
    let fixture = Fixture::with_options(FsOptions {
        max_quota: 1 << 20,
        chunk_overhead_override: Some(16),
        ..FsOptions::default()
    });
    let mut handle = fixture.fs.open("/f", "wb").expect("open");
    for _ in 0..8 {
        handle.write(&[3u8; 64]).expect("append chunk");
    }
    assert_eq!(fixture.fs.stats().used_bytes, 8 * 64 + 8 * 16);

    handle.seek(SeekFrom::Start(0)).expect("seek");
    handle.write(&[4u8; 8]).expect("promoting write");
    handle.close();

    // Chunk overhead is gone; only the contiguous bytes remain.
    assert_eq!(fixture.fs.stats().used_bytes, 8 * 64);
}

#[test]
fn promotion_needs_headroom_for_the_copy() {
    // 600 bytes of data in a 1000-byte budget: the temporary doubling
    // during promotion cannot fit.
    let fixture = Fixture::with_options(FsOptions {
        max_quota: 1000,
        chunk_overhead_override: Some(0),
        ..FsOptions::default()
    });
    fixture.write_file("/f", &[1u8; 600]);

    let mut handle = fixture.fs.open("/f", "r+b").expect("open");
    handle.seek(SeekFrom::Start(0)).expect("seek");
    let err = handle.write(b"x").expect_err("promotion copy cannot fit");
    assert!(matches!(err, Error::QuotaExceeded { .. }));
    handle.close();

    // Nothing changed: still sequential, bytes intact.
    assert_eq!(fixture.fs.stats().chunk_count, 1);
    assert_eq!(fixture.fs.stats().used_bytes, 600);
    assert_eq!(fixture.read_file("/f"), vec![1u8; 600]);
}

#[test]
fn sequential_only_storage_never_promotes() {
    let fixture = Fixture::with_options(FsOptions {
        max_quota: 1 << 20,
        default_storage: StorageKind::Sequential,
        ..FsOptions::default()
    });
    fixture.write_file("/f", b"append only");

    let mut handle = fixture.fs.open("/f", "r+b").expect("open");
    handle.seek(SeekFrom::Start(0)).expect("seek");
    assert!(matches!(
        handle.write(b"x").expect_err("must refuse"),
        Error::Unsupported { .. }
    ));
    handle.close();
}

#[test]
fn promotion_hard_limit_refuses_oversize_files() {
    let fixture = Fixture::with_options(FsOptions {
        max_quota: 1 << 20,
        promotion_hard_limit: Some(256),
        chunk_overhead_override: Some(0),
        ..FsOptions::default()
    });
    fixture.write_file("/f", &[1u8; 512]);

    let mut handle = fixture.fs.open("/f", "r+b").expect("open");
    handle.seek(SeekFrom::Start(10)).expect("seek");
    assert!(matches!(
        handle.write(b"x").expect_err("above the hard limit"),
        Error::Unsupported { .. }
    ));
    handle.close();

    // Tail appends still work.
    let mut handle = fixture.fs.open("/f", "ab").expect("append");
    handle.write(b"more").expect("append");
    handle.close();
    assert_eq!(fixture.fs.get_size("/f").expect("size"), 516);
}
