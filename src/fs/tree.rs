//! Structural mutation: mkdir, rename, move, remove, rmtree, copy and
//! copy_tree.
//!
//! Every operation here runs start-to-finish under the structure lock.
//! Batch operations validate and compute quota deltas before touching
//! the node graph, and restore the pre-call state if a later step
//! fails.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::fs::ScratchFs;
use crate::node::{DirectoryNode, FileNode, Node, NodeId, NodeTable, ROOT_ID};
use crate::path;
use crate::storage::Storage;
use crate::sync::LockWait;

/// Record of a directory created on the fly, kept so a failed batch
/// can take it back out.
pub(crate) struct CreatedDir {
    parent: NodeId,
    name: String,
    id: NodeId,
}

/// Walk `normalized`, creating missing directories, and return the id
/// of the final one. Components that exist as files fail with
/// already-exists.
pub(crate) fn ensure_dirs(
    tree: &mut NodeTable,
    normalized: &str,
    created: &mut Vec<CreatedDir>,
) -> Result<NodeId> {
    let mut current = ROOT_ID;
    let mut walked = String::new();
    for segment in path::segments(normalized) {
        walked.push('/');
        walked.push_str(segment);
        match tree.directory(current).children.get(segment).copied() {
            Some(id) if tree.is_dir(id) => current = id,
            Some(_) => return Err(Error::already_exists(&walked)),
            None => {
                let id = tree.insert(Node::Directory(DirectoryNode::default()))?;
                tree.attach(current, segment, id);
                created.push(CreatedDir { parent: current, name: segment.to_owned(), id });
                current = id;
            }
        }
    }
    Ok(current)
}

/// Undo a list of [`ensure_dirs`] creations, children first.
pub(crate) fn remove_created_dirs(tree: &mut NodeTable, created: Vec<CreatedDir>) {
    for dir in created.into_iter().rev() {
        tree.detach(dir.parent, &dir.name);
        tree.remove(dir.id);
    }
}

impl ScratchFs {
    /// Create a directory and any missing ancestors.
    pub fn mkdir(&self, raw: &str, exist_ok: bool) -> Result<()> {
        let normalized = path::normalize(raw)?;
        let mut tree = self.lock_tree();

        if let Some(id) = tree.resolve(&normalized) {
            return if tree.is_dir(id) && exist_ok {
                Ok(())
            } else {
                Err(Error::already_exists(&normalized))
            };
        }

        let mut created = Vec::new();
        match ensure_dirs(&mut tree, &normalized, &mut created) {
            Ok(_) => {
                debug!(path = %normalized, "created directory");
                Ok(())
            }
            Err(err) => {
                remove_created_dirs(&mut tree, created);
                Err(err)
            }
        }
    }

    /// Relocate `src` to `dst`. `dst` must not exist and its parent
    /// must already exist.
    ///
    /// Node id, storage, timestamps and generation travel unchanged.
    pub fn rename(&self, src: &str, dst: &str) -> Result<()> {
        self.relocate(src, dst, false)
    }

    /// Like [`ScratchFs::rename`], but missing ancestors of `dst` are
    /// created first.
    pub fn move_entry(&self, src: &str, dst: &str) -> Result<()> {
        self.relocate(src, dst, true)
    }

    fn relocate(&self, src: &str, dst: &str, create_parents: bool) -> Result<()> {
        let src_path = path::normalize(src)?;
        let dst_path = path::normalize(dst)?;
        if src_path == "/" {
            return Err(Error::invalid_argument("cannot relocate the root directory"));
        }

        let mut tree = self.lock_tree();
        let src_id = tree.resolve(&src_path).ok_or_else(|| Error::not_found(&src_path))?;
        if tree.resolve(&dst_path).is_some() {
            return Err(Error::already_exists(&dst_path));
        }
        if path::is_within(&dst_path, &src_path) {
            return Err(Error::invalid_argument(format!(
                "cannot relocate {src_path:?} into itself at {dst_path:?}"
            )));
        }

        // A held lock anywhere under the source means an open handle.
        let subtree = tree.collect_subtree(src_id);
        if subtree.files.iter().any(|file| file.lock.is_locked()) {
            return Err(Error::would_block(format!("open handle under {src_path:?}")));
        }

        let (dst_parent_path, dst_name) =
            path::split(&dst_path).expect("destination cannot be the root");
        let mut created = Vec::new();
        let dst_parent = if create_parents {
            match ensure_dirs(&mut tree, dst_parent_path, &mut created) {
                Ok(id) => id,
                Err(err) => {
                    remove_created_dirs(&mut tree, created);
                    return Err(err);
                }
            }
        } else {
            let id = tree
                .resolve(dst_parent_path)
                .ok_or_else(|| Error::not_found(dst_parent_path))?;
            if !tree.is_dir(id) {
                return Err(Error::not_a_directory(dst_parent_path));
            }
            id
        };

        let (src_parent_path, src_name) = path::split(&src_path).expect("source is not the root");
        let src_parent = tree.resolve(src_parent_path).expect("source parent resolved already");
        tree.detach(src_parent, src_name);
        tree.attach(dst_parent, dst_name, src_id);
        debug!(src = %src_path, dst = %dst_path, "relocated entry");
        Ok(())
    }

    /// Remove a single file. Directories and lock-held files are
    /// refused.
    pub fn remove(&self, raw: &str) -> Result<()> {
        let normalized = path::normalize(raw)?;
        let mut tree = self.lock_tree();
        let (id, file) = tree.resolve_file(&normalized)?;
        if file.lock.is_locked() {
            return Err(Error::would_block(format!("open handle on {normalized:?}")));
        }

        let (parent_path, name) = path::split(&normalized).expect("a file is not the root");
        let parent = tree.resolve(parent_path).expect("parent resolved already");
        tree.detach(parent, name);
        tree.remove(id);
        self.quota().release(file.quota_usage());
        debug!(path = %normalized, "removed file");
        Ok(())
    }

    /// Remove a directory and everything below it.
    pub fn rmtree(&self, raw: &str) -> Result<()> {
        let normalized = path::normalize(raw)?;
        if normalized == "/" {
            return Err(Error::invalid_argument("cannot remove the root directory"));
        }

        let mut tree = self.lock_tree();
        let id = tree.resolve_dir(&normalized)?;
        let subtree = tree.collect_subtree(id);
        if subtree.files.iter().any(|file| file.lock.is_locked()) {
            return Err(Error::would_block(format!("open handle under {normalized:?}")));
        }

        let total: u64 = subtree.files.iter().map(|file| file.quota_usage()).sum();
        let (parent_path, name) = path::split(&normalized).expect("target is not the root");
        let parent = tree.resolve(parent_path).expect("parent resolved already");
        tree.detach(parent, name);
        for node_id in subtree.ids {
            tree.remove(node_id);
        }
        self.quota().release(total);
        debug!(path = %normalized, released = total, "removed directory tree");
        Ok(())
    }

    /// Deep-copy a single file to a fresh node.
    ///
    /// The copy gets a new id, fresh timestamps and generation one.
    pub fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let src_path = path::normalize(src)?;
        let dst_path = path::normalize(dst)?;

        let mut tree = self.lock_tree();
        let (_, src_file) = tree.resolve_file(&src_path)?;
        if tree.resolve(&dst_path).is_some() {
            return Err(Error::already_exists(&dst_path));
        }
        let (dst_parent_path, dst_name) =
            path::split(&dst_path).expect("destination cannot be the root");
        let dst_parent = tree
            .resolve(dst_parent_path)
            .ok_or_else(|| Error::not_found(dst_parent_path))?;
        if !tree.is_dir(dst_parent) {
            return Err(Error::not_a_directory(dst_parent_path));
        }

        src_file.lock.acquire_read(LockWait::Block)?;
        let data = src_file.read_at(0, None);
        src_file.lock.release_read();

        let config = self.config();
        let usage =
            Storage::bulk_usage(config.default_storage, data.len() as u64, config.chunk_overhead);
        let reservation = self.quota().reserve(usage)?;
        let node = Arc::new(FileNode::with_contents(Storage::bulk_load(
            config.default_storage,
            data,
            config.chunk_overhead,
            config.promotion_hard_limit,
        )));
        let id = tree.insert(Node::File(node))?;
        tree.attach(dst_parent, dst_name, id);
        reservation.commit();
        debug!(src = %src_path, dst = %dst_path, "copied file");
        Ok(())
    }

    /// Deep-copy a directory subtree to a new directory.
    ///
    /// The total byte cost is checked against the ledger before any
    /// node is created and force-reserved once the duplicate is
    /// complete; a failure mid-duplication takes the partial copy back
    /// out.
    pub fn copy_tree(&self, src: &str, dst: &str) -> Result<()> {
        let src_path = path::normalize(src)?;
        let dst_path = path::normalize(dst)?;

        let mut tree = self.lock_tree();
        let src_id = tree.resolve_dir(&src_path)?;
        if tree.resolve(&dst_path).is_some() {
            return Err(Error::already_exists(&dst_path));
        }
        if path::is_within(&dst_path, &src_path) {
            return Err(Error::invalid_argument(format!(
                "cannot copy {src_path:?} into itself at {dst_path:?}"
            )));
        }
        let (dst_parent_path, dst_name) =
            path::split(&dst_path).expect("destination cannot be the root");
        let dst_parent = tree
            .resolve(dst_parent_path)
            .ok_or_else(|| Error::not_found(dst_parent_path))?;
        if !tree.is_dir(dst_parent) {
            return Err(Error::not_a_directory(dst_parent_path));
        }

        let plan = collect_plan(&tree, src_id);
        let config = self.config();
        let estimate: u64 = plan
            .iter()
            .filter_map(|entry| match &entry.node {
                PlanNode::File(file) => Some(Storage::bulk_usage(
                    config.default_storage,
                    file.size(),
                    config.chunk_overhead,
                )),
                PlanNode::Dir => None,
            })
            .sum();
        let free = self.quota().snapshot().free;
        if estimate > free {
            return Err(Error::QuotaExceeded { requested: estimate, available: free });
        }

        let mut created: Vec<NodeId> = Vec::new();
        match self.duplicate_plan(&mut tree, &plan, &mut created) {
            Ok((dst_root, actual_usage)) => {
                tree.attach(dst_parent, dst_name, dst_root);
                self.quota().force_reserve(actual_usage);
                debug!(src = %src_path, dst = %dst_path, bytes = actual_usage, "copied tree");
                Ok(())
            }
            Err(err) => {
                for id in created {
                    tree.remove(id);
                }
                Err(err)
            }
        }
    }

    /// Materialise a collected plan as fresh detached nodes, returning
    /// the new subtree root and its total quota usage.
    fn duplicate_plan(
        &self,
        tree: &mut NodeTable,
        plan: &[PlanEntry],
        created: &mut Vec<NodeId>,
    ) -> Result<(NodeId, u64)> {
        let config = self.config();
        let dst_root = tree.insert(Node::Directory(DirectoryNode::default()))?;
        created.push(dst_root);

        let mut by_rel: HashMap<&str, NodeId> = HashMap::from([("", dst_root)]);
        let mut usage = 0;
        for entry in plan {
            let (parent_rel, name) = match entry.rel.rfind('/') {
                Some(cut) => (&entry.rel[..cut], &entry.rel[cut + 1..]),
                None => ("", entry.rel.as_str()),
            };
            let parent = by_rel[parent_rel];
            match &entry.node {
                PlanNode::Dir => {
                    let id = tree.insert(Node::Directory(DirectoryNode::default()))?;
                    created.push(id);
                    tree.attach(parent, name, id);
                    by_rel.insert(&entry.rel, id);
                }
                PlanNode::File(source) => {
                    source.lock.acquire_read(LockWait::Block)?;
                    let data = source.read_at(0, None);
                    source.lock.release_read();
                    usage += Storage::bulk_usage(
                        config.default_storage,
                        data.len() as u64,
                        config.chunk_overhead,
                    );
                    let node = Arc::new(FileNode::with_contents(Storage::bulk_load(
                        config.default_storage,
                        data,
                        config.chunk_overhead,
                        config.promotion_hard_limit,
                    )));
                    let id = tree.insert(Node::File(node))?;
                    created.push(id);
                    tree.attach(parent, name, id);
                }
            }
        }
        Ok((dst_root, usage))
    }
}

struct PlanEntry {
    /// Path relative to the subtree root, without a leading separator.
    rel: String,
    node: PlanNode,
}

enum PlanNode {
    Dir,
    File(Arc<FileNode>),
}

/// Pre-order listing of a subtree, excluding its root.
fn collect_plan(tree: &NodeTable, root: NodeId) -> Vec<PlanEntry> {
    let mut plan = Vec::new();
    let mut pending: Vec<(String, NodeId)> = vec![(String::new(), root)];
    while let Some((rel, id)) = pending.pop() {
        if !rel.is_empty() {
            let node = match tree.node(id) {
                Node::Directory(_) => PlanNode::Dir,
                Node::File(file) => PlanNode::File(Arc::clone(file)),
            };
            plan.push(PlanEntry { rel: rel.clone(), node });
        }
        if let Node::Directory(dir) = tree.node(id) {
            for (name, &child) in dir.children.iter().rev() {
                let child_rel =
                    if rel.is_empty() { name.clone() } else { format!("{rel}/{name}") };
                pending.push((child_rel, child));
            }
        }
    }
    plan
}
