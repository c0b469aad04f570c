//! In-memory snapshot of a directory tree.
//!
//! A snapshot is a flat, order-preserving list of [`DirectoryNode`]s covering
//! every folder and file below the root (the root itself excluded). Nodes are
//! immutable once built; taking a new snapshot rebuilds from scratch.

use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{PackagerError, Result};

/// Indentation unit used by [`DirectoryModel::render`].
const INDENT: &str = "  ";

/// One file or folder inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryNode {
    /// Path relative to the snapshot root, `/`-separated.
    pub name: String,
    pub basename: String,
    pub is_directory: bool,
    /// 0 for immediate children of the root.
    pub depth: usize,
    /// Relative name of the containing folder; `None` directly under the
    /// root. Resolve with [`DirectoryModel::parent_of`].
    pub parent: Option<String>,
    /// For folders: immediate file children, sorted by name.
    pub files: Vec<DirectoryNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectoryModel {
    root: PathBuf,
    nodes: Vec<DirectoryNode>,
}

impl DirectoryModel {
    /// Walk `root` and build a snapshot. Symlinks and special files are
    /// skipped, as are entries that can't be read.
    pub fn snapshot(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(PackagerError::InvalidPath {
                role: "directory",
                path: root.to_path_buf(),
            });
        }

        debug!(root = %root.display(), "Building directory snapshot");

        let mut nodes = Vec::new();
        for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(root = %root.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            let file_type = entry.file_type();
            if !file_type.is_dir() && !file_type.is_file() {
                debug!(path = %entry.path().display(), "Skipping special file");
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            nodes.push(DirectoryNode {
                name: normalize(relative),
                basename: entry.file_name().to_string_lossy().into_owned(),
                is_directory: file_type.is_dir(),
                depth: entry.depth() - 1,
                parent: relative
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(normalize),
                files: Vec::new(),
            });
        }

        Ok(Self::from_nodes(root.to_path_buf(), nodes))
    }

    /// Assemble a model from loose nodes, attaching each folder's file
    /// children.
    pub fn from_nodes(root: PathBuf, mut nodes: Vec<DirectoryNode>) -> Self {
        let mut children: HashMap<String, Vec<DirectoryNode>> = HashMap::new();
        for node in nodes.iter().filter(|n| !n.is_directory) {
            if let Some(parent) = &node.parent {
                children.entry(parent.clone()).or_default().push(node.clone());
            }
        }

        for node in nodes.iter_mut().filter(|n| n.is_directory) {
            if let Some(mut files) = children.remove(&node.name) {
                files.sort_by(|a, b| a.name.cmp(&b.name));
                node.files = files;
            }
        }

        Self { root, nodes }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root folder's own name, as shown on the first line of a listing.
    pub fn root_name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| normalize(&self.root))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DirectoryNode> {
        self.nodes.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DirectoryNode> {
        self.nodes.iter()
    }

    pub fn directories(&self) -> impl Iterator<Item = &DirectoryNode> {
        self.nodes.iter().filter(|n| n.is_directory)
    }

    pub fn files(&self) -> impl Iterator<Item = &DirectoryNode> {
        self.nodes.iter().filter(|n| !n.is_directory)
    }

    pub fn names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    pub fn basenames(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.basename.as_str()).collect()
    }

    pub fn parent_of(&self, node: &DirectoryNode) -> Option<&DirectoryNode> {
        let parent = node.parent.as_deref()?;
        self.find(parent).and_then(|i| self.nodes.get(i))
    }

    /// Index of the first node named exactly `name`.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    /// Indices of every node whose name matches the regex `pattern`.
    pub fn search(&self, pattern: &str) -> Result<Vec<usize>> {
        let regex = Regex::new(pattern).map_err(|source| {
            warn!(pattern = %pattern, error = %source, "Search term is invalid; aborting search");
            PackagerError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            }
        })?;

        Ok(self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| regex.is_match(&n.name))
            .map(|(i, _)| i)
            .collect())
    }

    /// New model ordered by name, one path component at a time (byte order,
    /// so case-sensitive). A folder's descendants follow it directly.
    pub fn sort(&self) -> Self {
        Self {
            root: self.root.clone(),
            nodes: self.sorted().into_iter().cloned().collect(),
        }
    }

    /// Indented listing: root name, then each folder followed by its files,
    /// then the root-level files.
    pub fn render(&self) -> String {
        let sorted = self.sorted();
        let mut out = format!("{}\n", self.root_name());

        for dir in sorted.iter().filter(|n| n.is_directory) {
            out.push_str(&format!("{}{}/\n", INDENT.repeat(dir.depth), dir.basename));
            for file in &dir.files {
                out.push_str(&format!("{}{}\n", INDENT.repeat(file.depth), file.basename));
            }
        }

        for file in sorted.iter().filter(|n| !n.is_directory && n.depth == 0) {
            out.push_str(&format!("{}\n", file.name));
        }

        out
    }

    fn sorted(&self) -> Vec<&DirectoryNode> {
        let mut nodes: Vec<&DirectoryNode> = self.nodes.iter().collect();
        nodes.sort_by(|a, b| a.name.split('/').cmp(b.name.split('/')));
        nodes
    }
}

fn normalize(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
