//! Bulk data exchange: export of file bytes out of the namespace and
//! all-or-nothing import back into it.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::Cursor;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::fs::tree::{ensure_dirs, remove_created_dirs};
use crate::fs::ScratchFs;
use crate::node::{FileNode, Node, NodeId, NodeTable};
use crate::path;
use crate::storage::Storage;
use crate::sync::LockWait;

/// Lazy export of `(path, bytes)` pairs.
///
/// The key set is snapshotted when the iterator is created; each
/// file's bytes are read under its own read lock at yield time.
/// Entries removed in the meantime are skipped without error.
pub struct ExportIter {
    fs: ScratchFs,
    pending: VecDeque<String>,
}

impl Iterator for ExportIter {
    type Item = (String, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let file_path = self.pending.pop_front()?;
            let file = {
                let tree = self.fs.lock_tree();
                let Some(id) = tree.resolve(&file_path) else { continue };
                let Some(file) = tree.file(id) else { continue };
                // The read lock is taken while the structure lock is
                // still held, the same discipline open uses.
                file.lock
                    .acquire_read(LockWait::Block)
                    .expect("a blocking acquire cannot time out");
                file
            };
            let data = file.read_at(0, None);
            file.lock.release_read();
            return Some((file_path, data));
        }
    }
}

/// File paths under `root_path`, pre-order, optionally restricted to
/// dirty files.
fn snapshot_file_paths(
    tree: &NodeTable,
    root_path: &str,
    root_id: NodeId,
    only_dirty: bool,
) -> VecDeque<String> {
    let mut found = VecDeque::new();
    let mut pending: Vec<(String, NodeId)> = vec![(root_path.to_owned(), root_id)];
    while let Some((current_path, id)) = pending.pop() {
        match tree.node(id) {
            Node::Directory(dir) => {
                for (name, &child) in dir.children.iter().rev() {
                    pending.push((path::join(&current_path, name), child));
                }
            }
            Node::File(file) => {
                if !only_dirty || file.generation() > 0 {
                    found.push_back(current_path);
                }
            }
        }
    }
    found
}

impl ScratchFs {
    /// Lazily export every file under `prefix`.
    pub fn iter_export_tree(&self, prefix: &str, only_dirty: bool) -> Result<ExportIter> {
        let normalized = path::normalize(prefix)?;
        let tree = self.lock_tree();
        let root_id = tree.resolve_dir(&normalized)?;
        let pending = snapshot_file_paths(&tree, &normalized, root_id, only_dirty);
        Ok(ExportIter { fs: self.clone(), pending })
    }

    /// Materialize `path → bytes` for every file under `prefix`.
    pub fn export_tree(&self, prefix: &str, only_dirty: bool) -> Result<BTreeMap<String, Vec<u8>>> {
        Ok(self.iter_export_tree(prefix, only_dirty)?.collect())
    }

    /// Deep-copy a file's current bytes into a detached in-memory
    /// reader.
    ///
    /// The returned buffer lives outside the quota; `max_size` guards
    /// against accidentally detaching something huge.
    pub fn export_as_cursor(&self, raw: &str, max_size: Option<u64>) -> Result<Cursor<Vec<u8>>> {
        let normalized = path::normalize(raw)?;
        let file = {
            let tree = self.lock_tree();
            let (_, file) = tree.resolve_file(&normalized)?;
            file.lock.acquire_read(LockWait::Block)?;
            file
        };

        let size = file.size();
        if let Some(max) = max_size {
            if size > max {
                file.lock.release_read();
                return Err(Error::invalid_argument(format!(
                    "file {normalized:?} is {size} bytes, larger than the {max} byte export cap"
                )));
            }
        }
        let data = file.read_at(0, None);
        file.lock.release_read();
        Ok(Cursor::new(data))
    }

    /// All-or-nothing insertion or replacement of `path → bytes`
    /// entries.
    ///
    /// Validation and the quota delta run before any mutation; a
    /// failure while applying restores the node graph and the ledger
    /// to their pre-call state. Entries whose paths normalize to the
    /// same key collapse to the last one given.
    pub fn import_tree<I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        let mut order: Vec<String> = Vec::new();
        let mut contents: HashMap<String, Vec<u8>> = HashMap::new();
        for (raw, data) in entries {
            let normalized = path::normalize(&raw)?;
            if normalized == "/" {
                return Err(Error::is_a_directory("/"));
            }
            if contents.insert(normalized.clone(), data).is_none() {
                order.push(normalized);
            }
        }

        let config = self.config();
        let mut tree = self.lock_tree();

        // Nothing may be mutated yet: existing targets must be
        // replaceable files, none of them lock-held.
        let mut old_quota = 0u64;
        for target in &order {
            if let Some(id) = tree.resolve(target) {
                match tree.file(id) {
                    Some(file) if file.lock.is_locked() => {
                        return Err(Error::would_block(format!("open handle on {target:?}")));
                    }
                    Some(file) => old_quota += file.quota_usage(),
                    None => return Err(Error::is_a_directory(target)),
                }
            }
        }

        let new_quota: u64 = order
            .iter()
            .map(|target| {
                Storage::bulk_usage(
                    config.default_storage,
                    contents[target].len() as u64,
                    config.chunk_overhead,
                )
            })
            .sum();
        if new_quota > old_quota {
            let net = new_quota - old_quota;
            let free = self.quota().snapshot().free;
            if net > free {
                return Err(Error::QuotaExceeded { requested: net, available: free });
            }
        }

        // The old usage leaves the ledger now; it comes back via
        // force_reserve if the batch has to roll back.
        self.quota().release(old_quota);

        let mut created_dirs = Vec::new();
        let mut created_files: Vec<(NodeId, String, NodeId)> = Vec::new();
        let mut replaced: Vec<(NodeId, String, NodeId)> = Vec::new();
        let mut failure = None;
        for target in &order {
            let data = contents.remove(target).expect("deduplicated targets are unique");
            let (parent_path, name) = path::split(target).expect("the root was rejected above");
            let parent = match ensure_dirs(&mut tree, parent_path, &mut created_dirs) {
                Ok(id) => id,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            };
            if let Some(old_id) = tree.detach(parent, name) {
                replaced.push((parent, name.to_owned(), old_id));
            }
            let node = Arc::new(FileNode::with_contents(Storage::bulk_load(
                config.default_storage,
                data,
                config.chunk_overhead,
                config.promotion_hard_limit,
            )));
            match tree.insert(Node::File(node)) {
                Ok(id) => {
                    tree.attach(parent, name, id);
                    created_files.push((parent, name.to_owned(), id));
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        match failure {
            None => {
                for (_, _, old_id) in replaced {
                    tree.remove(old_id);
                }
                self.quota().force_reserve(new_quota);
                debug!(files = order.len(), bytes = new_quota, "imported tree");
                Ok(())
            }
            Some(err) => {
                for (parent, name, id) in created_files.into_iter().rev() {
                    tree.detach(parent, &name);
                    tree.remove(id);
                }
                for (parent, name, old_id) in replaced.into_iter().rev() {
                    tree.attach(parent, &name, old_id);
                }
                remove_created_dirs(&mut tree, created_dirs);
                self.quota().force_reserve(old_quota);
                Err(err)
            }
        }
    }
}
