//! Scratchfs - a quota-bounded in-memory filesystem.
//!
//! A hierarchical, POSIX-flavored namespace of byte-oriented files
//! backed entirely by process memory, with a hard byte budget enforced
//! before any allocation. Intended as an isolated scratch workspace:
//! staging areas for pipelines, archive unpack/repack in sandboxes,
//! snapshot containers, temporary namespaces where no OS-level RAM
//! disk is available.
//!
//! Instances are independent of one another; within an instance a
//! single structure lock guards the namespace and each file carries
//! its own readers-writer lock, acquired by [`ScratchFs::open`] and
//! held until the handle closes.

mod error;
mod fs;
mod handle;
mod node;
mod path;
mod quota;
mod storage;
mod sync;

pub use error::{Error, Result};
pub use fs::{
    ExportIter, FsOptions, FsStats, OpenMode, OpenOptions, ScratchFs, Stat, Walk, WalkEntry,
    DEFAULT_QUOTA,
};
pub use handle::FileHandle;
pub use path::normalize;
pub use storage::StorageKind;
pub use sync::LockWait;
