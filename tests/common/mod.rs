#![allow(dead_code)]

use scratchfs::{FsOptions, ScratchFs};

/// A default-quota filesystem per test invocation.
pub struct Fixture {
    pub fs: ScratchFs,
}

impl Fixture {
    pub fn new() -> Self {
        Self { fs: ScratchFs::with_options(FsOptions::default()) }
    }

    pub fn with_quota(max_quota: u64) -> Self {
        Self { fs: ScratchFs::new(max_quota) }
    }

    pub fn with_options(options: FsOptions) -> Self {
        Self { fs: ScratchFs::with_options(options) }
    }

    /// Create (or truncate) a file with the given contents.
    pub fn write_file(&self, path: &str, data: &[u8]) {
        let mut handle = self.fs.open(path, "wb").expect("open for write");
        handle.write(data).expect("write fixture data");
        handle.close();
    }

    /// Read a file's full contents.
    pub fn read_file(&self, path: &str) -> Vec<u8> {
        let mut handle = self.fs.open(path, "rb").expect("open for read");
        let data = handle.read(None).expect("read fixture data");
        handle.close();
        data
    }
}
