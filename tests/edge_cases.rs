mod common;

use std::thread;
use std::time::Duration;

use common::Fixture;
use scratchfs::{Error, FsOptions, LockWait, OpenOptions};

#[test]
fn failed_preallocation_closes_the_handle_but_keeps_the_file() {
    let fixture = Fixture::with_options(FsOptions {
        max_quota: 64,
        chunk_overhead_override: Some(0),
        ..FsOptions::default()
    });

    let options = OpenOptions { preallocate: 1000, ..OpenOptions::default() };
    let err = fixture.fs.open_with("/reserved", "wb", options).expect_err("cannot fit");
    assert_eq!(err, Error::QuotaExceeded { requested: 1000, available: 64 });

    // The node was created before preallocation failed, and its lock
    // was released by the cleanup close.
    assert!(fixture.fs.exists("/reserved"));
    assert_eq!(fixture.fs.get_size("/reserved").expect("size"), 0);
    assert_eq!(fixture.fs.stats().used_bytes, 0);
    fixture.fs.remove("/reserved").expect("no lock left behind");
}

#[test]
fn append_mode_creates_missing_files() {
    let fixture = Fixture::new();
    let mut handle = fixture.fs.open("/fresh.log", "ab").expect("ab creates");
    handle.write(b"line 1\n").expect("write");
    handle.close();

    let mut handle = fixture.fs.open("/fresh.log", "ab").expect("reopen");
    handle.write(b"line 2\n").expect("write");
    handle.close();
    assert_eq!(fixture.read_file("/fresh.log"), b"line 1\nline 2\n");
}

#[test]
fn mkdir_rolls_back_partially_created_ancestors() {
    // Root + two new directories hits the cap before the third.
    let fixture = Fixture::with_options(FsOptions {
        max_quota: 4096,
        max_nodes: Some(3),
        ..FsOptions::default()
    });

    let err = fixture.fs.mkdir("/a/b/c", false).expect_err("cap reached mid-walk");
    assert_eq!(err, Error::NodeLimitExceeded { limit: 3 });
    assert!(!fixture.fs.exists("/a"), "partially created ancestors must be gone");

    fixture.fs.mkdir("/a/b", false).expect("two levels still fit");
}

#[test]
fn move_entry_rolls_back_created_ancestors_on_failure() {
    let fixture = Fixture::with_options(FsOptions {
        max_quota: 4096,
        max_nodes: Some(4),
        ..FsOptions::default()
    });
    fixture.write_file("/item", b"x"); // root + item = 2 nodes

    // Two missing ancestors fit (4 nodes total), a third does not.
    let err = fixture.fs.move_entry("/item", "/d1/d2/d3/item").expect_err("cap");
    assert_eq!(err, Error::NodeLimitExceeded { limit: 4 });
    assert!(fixture.fs.is_file("/item"), "source must be untouched");
    assert!(!fixture.fs.exists("/d1"), "created ancestors must be rolled back");

    fixture.fs.move_entry("/item", "/d1/d2/item").expect("within the cap");
    assert_eq!(fixture.read_file("/d1/d2/item"), b"x");
}

#[test]
fn copy_validates_the_destination_parent() {
    let fixture = Fixture::new();
    fixture.write_file("/src", b"data");
    fixture.write_file("/blocker", b"not a dir");

    assert!(matches!(
        fixture.fs.copy("/src", "/missing/dst").expect_err("missing parent"),
        Error::NotFound { .. }
    ));
    assert!(matches!(
        fixture.fs.copy("/src", "/blocker/dst").expect_err("file parent"),
        Error::NotADirectory { .. }
    ));
    assert!(matches!(
        fixture.fs.copy("/dir-missing", "/dst").expect_err("missing source"),
        Error::NotFound { .. }
    ));
}

#[test]
fn export_prefixes_must_be_directories() {
    let fixture = Fixture::new();
    fixture.write_file("/f", b"x");

    assert!(matches!(
        fixture.fs.export_tree("/missing", false).expect_err("missing prefix"),
        Error::NotFound { .. }
    ));
    assert!(matches!(
        fixture.fs.export_tree("/f", false).expect_err("file prefix"),
        Error::NotADirectory { .. }
    ));

    // A subdirectory prefix exports only its own subtree.
    fixture.fs.mkdir("/sub", false).expect("mkdir");
    fixture.write_file("/sub/inner", b"scoped");
    let exported = fixture.fs.export_tree("/sub", false).expect("export");
    assert_eq!(exported.len(), 1);
    assert!(exported.contains_key("/sub/inner"));
}

#[test]
fn empty_import_is_a_no_op() {
    let fixture = Fixture::new();
    fixture.fs.import_tree(Vec::new()).expect("nothing to do");
    assert_eq!(fixture.fs.stats().file_count, 0);
}

#[test]
fn import_creates_nested_directories_on_the_fly() {
    let fixture = Fixture::new();
    fixture
        .fs
        .import_tree(vec![("/very/deep/nest/file".to_string(), b"payload".to_vec())])
        .expect("import");
    assert!(fixture.fs.is_dir("/very/deep/nest"));
    assert_eq!(fixture.read_file("/very/deep/nest/file"), b"payload");
}

#[test]
fn bounded_open_succeeds_when_the_writer_leaves_in_time() {
    let fixture = Fixture::new();
    fixture.write_file("/f", b"x");
    let mut holder = fixture.fs.open("/f", "ab").expect("writer");

    let waiter = {
        let fs = fixture.fs.clone();
        thread::spawn(move || {
            let options = OpenOptions {
                lock_wait: LockWait::Bounded(Duration::from_secs(5)),
                ..OpenOptions::default()
            };
            let mut handle = fs.open_with("/f", "rb", options).expect("within deadline");
            let data = handle.read(None).expect("read");
            handle.close();
            data
        })
    };

    thread::sleep(Duration::from_millis(30));
    holder.write(b"!").expect("write");
    holder.close();
    assert_eq!(waiter.join().expect("reader thread"), b"x!");
}

#[test]
fn truncate_bumps_generation_and_modification_time() {
    let fixture = Fixture::new();
    fixture.write_file("/f", b"0123456789");
    let before = fixture.fs.stat("/f").expect("stat");

    let mut handle = fixture.fs.open("/f", "r+b").expect("open");
    handle.truncate(3).expect("shrink");
    handle.close();

    let after = fixture.fs.stat("/f").expect("stat");
    assert!(after.generation > before.generation);
    assert!(after.modified_at >= before.modified_at);
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(after.size, 3);
}

#[test]
fn relative_and_absolute_glob_patterns_agree() {
    let fixture = Fixture::new();
    fixture.fs.mkdir("/x/y", false).expect("mkdir");
    fixture.write_file("/x/y/z.dat", b"1");

    assert_eq!(
        fixture.fs.glob("x/y/*.dat").expect("relative"),
        fixture.fs.glob("/x/y/*.dat").expect("absolute")
    );
}
