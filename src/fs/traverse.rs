//! Defines [`Walk`] --- lazy pre-order traversal with per-directory
//! snapshots.

use crate::error::Result;
use crate::fs::ScratchFs;
use crate::node::Node;
use crate::path;

/// One directory visited by [`Walk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// Normalized path of the directory itself.
    pub path: String,
    /// Names of its child directories.
    pub dirs: Vec<String>,
    /// Names of its child files.
    pub files: Vec<String>,
}

/// Lazy pre-order directory traversal.
///
/// Each step snapshots one directory's children under the structure
/// lock, then releases it for the descent. The traversal as a whole is
/// weakly consistent: entries removed while it runs are skipped
/// silently, entries added may or may not be observed.
pub struct Walk {
    fs: ScratchFs,
    pending: Vec<String>,
}

impl std::fmt::Debug for Walk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Walk").field("pending", &self.pending).finish()
    }
}

impl Iterator for Walk {
    type Item = WalkEntry;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let dir_path = self.pending.pop()?;
            let (dirs, files) = {
                let tree = self.fs.lock_tree();
                let Some(id) = tree.resolve(&dir_path) else { continue };
                let Node::Directory(dir) = tree.node(id) else { continue };
                let mut dirs = Vec::new();
                let mut files = Vec::new();
                for (name, &child) in &dir.children {
                    if tree.is_dir(child) {
                        dirs.push(name.clone());
                    } else {
                        files.push(name.clone());
                    }
                }
                (dirs, files)
            };

            // Reverse push keeps the pre-order visit in name order.
            for name in dirs.iter().rev() {
                self.pending.push(path::join(&dir_path, name));
            }
            return Some(WalkEntry { path: dir_path, dirs, files });
        }
    }
}

impl ScratchFs {
    /// Walk the tree under `raw` in pre-order, one directory per step.
    ///
    /// The starting directory must exist when the walk is created;
    /// everything after that follows weak-consistency rules.
    pub fn walk(&self, raw: &str) -> Result<Walk> {
        let normalized = path::normalize(raw)?;
        self.lock_tree().resolve_dir(&normalized)?;
        Ok(Walk { fs: self.clone(), pending: vec![normalized] })
    }
}
