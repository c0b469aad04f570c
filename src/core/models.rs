use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{PackagerError, Result};

/// Email account identifier. Doubles as the file-basename filter for source
/// data and as the AIP folder name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let reason = if value.is_empty() {
            Some("must not be empty")
        } else if value == "." || value == ".." {
            Some("must not be a relative path component")
        } else if value.contains('/') || value.contains('\\') {
            Some("must not contain a path separator")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(PackagerError::InvalidAccountId { value, reason }),
            None => Ok(Self(value)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How candidates are selected inside a category's source location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Files whose stem equals the account id.
    File,
    /// Every immediate child of `<category>/<account id>`.
    Subtree,
}

/// Kinds of data relocated into an AIP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Pst,
    Mime,
    Eaxs,
    Metadata,
}

impl Category {
    pub const ALL: [Category; 4] = [Self::Pst, Self::Mime, Self::Eaxs, Self::Metadata];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pst => "pst",
            Self::Mime => "mime",
            Self::Eaxs => "eaxs",
            Self::Metadata => "metadata",
        }
    }

    pub fn match_mode(&self) -> MatchMode {
        match self {
            Self::Pst => MatchMode::File,
            Self::Mime | Self::Eaxs | Self::Metadata => MatchMode::Subtree,
        }
    }

    /// Required categories must be present and non-empty for a valid AIP.
    pub fn is_required(&self) -> bool {
        matches!(self, Self::Mime | Self::Eaxs)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attempted/passed/failed accounting for one assembly run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferRecord {
    attempted: Vec<PathBuf>,
    passed: Vec<PathBuf>,
    failed: Vec<PathBuf>,
}

impl TransferRecord {
    pub fn attempted(&self) -> &[PathBuf] {
        &self.attempted
    }

    pub fn passed(&self) -> &[PathBuf] {
        &self.passed
    }

    pub fn failed(&self) -> &[PathBuf] {
        &self.failed
    }

    /// True when every attempt has a recorded outcome and nothing failed.
    pub fn is_clean(&self) -> bool {
        self.attempted == self.passed && self.failed.is_empty()
    }

    pub(crate) fn attempt(&mut self, path: &Path) {
        self.attempted.push(path.to_path_buf());
    }

    pub(crate) fn pass(&mut self, path: &Path) {
        self.passed.push(path.to_path_buf());
    }

    pub(crate) fn fail(&mut self, path: &Path) {
        self.failed.push(path.to_path_buf());
    }
}

/// Destination layout of an AIP. A category path is `None` when no source
/// data existed for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AipStructure {
    pub root: PathBuf,
    pub pst: Option<PathBuf>,
    pub mime: Option<PathBuf>,
    pub eaxs: Option<PathBuf>,
    pub metadata: Option<PathBuf>,
}

impl AipStructure {
    pub fn new(root: PathBuf) -> Self {
        Self {
            pst: Some(root.join(Category::Pst.as_str())),
            mime: Some(root.join(Category::Mime.as_str())),
            eaxs: Some(root.join(Category::Eaxs.as_str())),
            metadata: Some(root.join(Category::Metadata.as_str())),
            root,
        }
    }

    pub fn category(&self, category: Category) -> Option<&Path> {
        match category {
            Category::Pst => self.pst.as_deref(),
            Category::Mime => self.mime.as_deref(),
            Category::Eaxs => self.eaxs.as_deref(),
            Category::Metadata => self.metadata.as_deref(),
        }
    }

    pub(crate) fn clear_category(&mut self, category: Category) {
        match category {
            Category::Pst => self.pst = None,
            Category::Mime => self.mime = None,
            Category::Eaxs => self.eaxs = None,
            Category::Metadata => self.metadata = None,
        }
    }
}
