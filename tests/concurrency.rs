mod common;

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use common::Fixture;
use scratchfs::{Error, LockWait, OpenOptions};

fn no_wait() -> OpenOptions {
    OpenOptions { lock_wait: LockWait::Immediate, ..OpenOptions::default() }
}

#[test]
fn writers_to_distinct_files_proceed_in_parallel() {
    let fixture = Fixture::new();
    fixture.fs.mkdir("/out", false).expect("mkdir");

    let mut workers = Vec::new();
    for index in 0..8 {
        let fs = fixture.fs.clone();
        workers.push(thread::spawn(move || {
            let path = format!("/out/part-{index}");
            let mut handle = fs.open(&path, "wb").expect("open");
            for _ in 0..50 {
                handle.write(&[index as u8; 16]).expect("write");
            }
            handle.close();
        }));
    }
    for worker in workers {
        worker.join().expect("writer thread");
    }

    let stats = fixture.fs.stats();
    assert_eq!(stats.file_count, 8);
    for index in 0..8 {
        let data = fixture.read_file(&format!("/out/part-{index}"));
        assert_eq!(data, vec![index as u8; 800]);
    }
}

#[test]
fn second_writer_fails_fast_while_the_first_holds_the_lock() {
    let fixture = Fixture::new();
    fixture.write_file("/f", b"x");

    let holder = fixture.fs.open("/f", "r+b").expect("first writer");
    assert!(matches!(
        fixture.fs.open_with("/f", "r+b", no_wait()).expect_err("contended"),
        Error::WouldBlock { .. }
    ));
    assert!(matches!(
        fixture.fs.open_with("/f", "rb", no_wait()).expect_err("readers wait for writers"),
        Error::WouldBlock { .. }
    ));
    drop(holder);
    fixture.fs.open_with("/f", "rb", no_wait()).expect("free again").close();
}

#[test]
fn readers_share_the_file_lock() {
    let fixture = Fixture::new();
    fixture.write_file("/f", b"shared");

    let first = fixture.fs.open_with("/f", "rb", no_wait()).expect("first reader");
    let second = fixture.fs.open_with("/f", "rb", no_wait()).expect("second reader");
    // A writer cannot join them.
    assert!(matches!(
        fixture.fs.open_with("/f", "wb", no_wait()).expect_err("writer excluded"),
        Error::WouldBlock { .. }
    ));
    drop(first);
    drop(second);
}

#[test]
fn bounded_open_times_out_instead_of_hanging() {
    let fixture = Fixture::new();
    fixture.write_file("/f", b"x");
    let holder = fixture.fs.open("/f", "r+b").expect("writer");

    let options = OpenOptions {
        lock_wait: LockWait::Bounded(Duration::from_millis(30)),
        ..OpenOptions::default()
    };
    let err = fixture.fs.open_with("/f", "rb", options).expect_err("must time out");
    assert!(matches!(err, Error::WouldBlock { .. }));
    drop(holder);
}

#[test]
fn blocked_open_proceeds_once_the_writer_closes() {
    let fixture = Fixture::new();
    fixture.write_file("/f", b"seed");
    let mut holder = fixture.fs.open("/f", "ab").expect("writer");

    let (started, gate) = mpsc::channel();
    let waiter = {
        let fs = fixture.fs.clone();
        thread::spawn(move || {
            started.send(()).expect("signal start");
            let mut handle = fs.open("/f", "rb").expect("open after writer leaves");
            let data = handle.read(None).expect("read");
            handle.close();
            data
        })
    };

    gate.recv().expect("waiter started");
    thread::sleep(Duration::from_millis(20));
    holder.write(b" done").expect("write before close");
    holder.close();

    assert_eq!(waiter.join().expect("reader thread"), b"seed done");
}

#[test]
fn structural_operations_serialize_with_each_other() {
    let fixture = Fixture::new();
    fixture.fs.mkdir("/spool", false).expect("mkdir");

    let mut workers = Vec::new();
    for index in 0..4 {
        let fs = fixture.fs.clone();
        workers.push(thread::spawn(move || {
            for step in 0..20 {
                let path = format!("/spool/w{index}-{step}");
                let mut handle = fs.open(&path, "xb").expect("exclusive create");
                handle.write(b"tick").expect("write");
                handle.close();
                if step % 3 == 0 {
                    fs.remove(&path).expect("remove own file");
                }
            }
        }));
    }
    for worker in workers {
        worker.join().expect("worker thread");
    }

    let remaining = fixture.fs.listdir("/spool").expect("listdir").len();
    assert_eq!(remaining, 4 * 20 - 4 * 7);
}

#[test]
fn generation_is_monotonic_per_file() {
    let fixture = Fixture::new();
    fixture.write_file("/f", b"0");

    let mut last = fixture.fs.stat("/f").expect("stat").generation;
    for _ in 0..5 {
        let mut handle = fixture.fs.open("/f", "ab").expect("append");
        handle.write(b"+").expect("write");
        handle.close();
        let generation = fixture.fs.stat("/f").expect("stat").generation;
        assert!(generation > last);
        last = generation;
    }
}
