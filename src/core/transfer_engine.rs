pub mod mover;

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, info_span, warn};

use crate::core::models::{AccountId, AipStructure, Category, MatchMode, TransferRecord};
use crate::error::{PackagerError, Result};

/// Builds the AIP skeleton for one account and relocates its source data.
///
/// Source layout (relative to `source_dir`):
/// - `pst/<account>.*` (file-match)
/// - `mime/<account>/*`, `eaxs/<account>/*`, `metadata/<account>/*` (subtree-match)
/// - loose `<account>.*` files, swept into `metadata`
///
/// Every relocation is recorded in a [`TransferRecord`]. A failed move is
/// logged and recorded, and the remaining moves still run.
#[derive(Debug)]
pub struct TransferEngine {
    account_id: AccountId,
    source_dir: PathBuf,
    structure: AipStructure,
    record: TransferRecord,
}

impl TransferEngine {
    pub fn new(
        account_id: AccountId,
        source_dir: impl Into<PathBuf>,
        destination_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let source_dir = source_dir.into();
        let destination_dir = destination_dir.into();

        if !source_dir.is_dir() {
            error!(path = %source_dir.display(), "Can't find source");
            return Err(PackagerError::InvalidPath {
                role: "source",
                path: source_dir,
            });
        }
        if !destination_dir.is_dir() {
            error!(path = %destination_dir.display(), "Can't find destination");
            return Err(PackagerError::InvalidPath {
                role: "destination",
                path: destination_dir,
            });
        }

        let structure = AipStructure::new(destination_dir.join(account_id.as_str()));

        Ok(Self {
            account_id,
            source_dir,
            structure,
            record: TransferRecord::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.structure.root
    }

    pub fn structure(&self) -> &AipStructure {
        &self.structure
    }

    pub fn transfers(&self) -> &TransferRecord {
        &self.record
    }

    /// Create the AIP root and move every candidate into it.
    ///
    /// Fails without touching the filesystem if the root already exists.
    /// Returns the root path.
    pub fn assemble(&mut self) -> Result<PathBuf> {
        let root = self.structure.root.clone();
        let _span = info_span!("assemble", account = %self.account_id).entered();

        if root.symlink_metadata().is_ok() {
            error!(root = %root.display(), "AIP destination already exists");
            return Err(PackagerError::AlreadyExists { path: root });
        }

        info!(root = %root.display(), "Creating AIP structure");
        fs::create_dir(&root).map_err(|e| {
            PackagerError::io(format!("Unable to create folder: {}", root.display()), e)
        })?;

        for category in Category::ALL {
            let mut candidates = Vec::new();
            let mut subtree_source = None;

            match category.match_mode() {
                MatchMode::File => {
                    candidates.extend(self.file_candidates(&self.source_dir.join(category.as_str())));
                }
                MatchMode::Subtree => {
                    let folder = self
                        .source_dir
                        .join(category.as_str())
                        .join(self.account_id.as_str());
                    let found = subtree_candidates(&folder);
                    if !found.is_empty() {
                        subtree_source = Some(folder);
                    }
                    candidates.extend(found);
                }
            }

            // Stray account files at the top of the source go to metadata
            if category == Category::Metadata {
                candidates.extend(self.file_candidates(&self.source_dir));
            }

            self.transfer_category(category, candidates);

            if let Some(folder) = subtree_source {
                remove_if_empty(&folder);
            }
        }

        info!(
            attempted = self.record.attempted().len(),
            passed = self.record.passed().len(),
            failed = self.record.failed().len(),
            "AIP assembly finished"
        );

        Ok(root)
    }

    /// Whether the assembled AIP looks ready for packaging.
    ///
    /// Requires the root to exist, every attempted transfer to have passed,
    /// and non-empty `mime` and `eaxs` folders. `pst` and `metadata` are
    /// optional.
    pub fn validate(&self) -> bool {
        info!(root = %self.structure.root.display(), "Testing if AIP structure is valid");

        if !self.structure.root.is_dir() {
            warn!(root = %self.structure.root.display(), "AIP folder doesn't exist");
            return false;
        }

        let mut is_valid = true;

        if self.record.attempted() != self.record.passed() {
            warn!("Not all attempted transfers passed");
            is_valid = false;
        }

        if !self.record.failed().is_empty() {
            warn!(failed = ?self.record.failed(), "Failed transfers");
            is_valid = false;
        }

        for category in Category::ALL.into_iter().filter(Category::is_required) {
            let Some(folder) = self.structure.category(category) else {
                warn!(category = %category, "Missing required folder");
                is_valid = false;
                continue;
            };

            if !is_non_empty_dir(folder) {
                warn!(
                    category = %category,
                    folder = %folder.display(),
                    "Required folder is missing or empty"
                );
                is_valid = false;
            }
        }

        if is_valid {
            info!("AIP structure appears to be valid");
        } else {
            warn!("AIP structure appears to be invalid");
        }
        is_valid
    }

    /// Files directly in `folder` whose stem equals the account id.
    fn file_candidates(&self, folder: &Path) -> Vec<PathBuf> {
        debug!(folder = %folder.display(), "Looking for candidate files");

        let Some(entries) = read_sorted(folder) else {
            return Vec::new();
        };

        entries
            .into_iter()
            .filter(|path| {
                path.symlink_metadata().is_ok_and(|m| m.is_file())
                    && path.extension().is_some()
                    && path
                        .file_stem()
                        .is_some_and(|stem| stem == self.account_id.as_str())
            })
            .collect()
    }

    fn transfer_category(&mut self, category: Category, candidates: Vec<PathBuf>) {
        if candidates.is_empty() {
            info!(category = %category, "Unable to find any candidate data to move");
            self.structure.clear_category(category);
            return;
        }

        let Some(destination) = self.structure.category(category).map(Path::to_path_buf) else {
            return;
        };

        info!(
            category = %category,
            count = candidates.len(),
            destination = %destination.display(),
            "Moving candidate data"
        );

        if !destination.is_dir() {
            info!(folder = %destination.display(), "Making folder");
            if let Err(e) = fs::create_dir(&destination) {
                error!(
                    folder = %destination.display(),
                    error = %e,
                    "Unable to create folder; every candidate for it fails"
                );
                for item in &candidates {
                    self.record.attempt(item);
                    self.record.fail(item);
                }
                return;
            }
        }

        for item in &candidates {
            self.record.attempt(item);
            match mover::move_item(item, &destination) {
                Ok(moved) => {
                    info!(from = %item.display(), to = %moved.display(), "Moved");
                    self.record.pass(item);
                }
                Err(e) => {
                    warn!(
                        item = %item.display(),
                        destination = %destination.display(),
                        error = %format!("{:#}", e),
                        "Can't move item"
                    );
                    self.record.fail(item);
                }
            }
        }
    }
}

/// Every immediate child of `folder`, files and folders alike.
fn subtree_candidates(folder: &Path) -> Vec<PathBuf> {
    debug!(folder = %folder.display(), "Looking for candidate subtree");
    read_sorted(folder).unwrap_or_default()
}

/// Entries of `folder` in name order, or `None` if it can't be listed.
fn read_sorted(folder: &Path) -> Option<Vec<PathBuf>> {
    if !folder.is_dir() {
        info!(folder = %folder.display(), "Can't find folder; skipping");
        return None;
    }

    let entries = match fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(folder = %folder.display(), error = %e, "Can't read folder; skipping");
            return None;
        }
    };

    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(entry) => paths.push(entry.path()),
            Err(e) => {
                warn!(folder = %folder.display(), error = %e, "Skipping unreadable entry");
            }
        }
    }
    paths.sort();
    Some(paths)
}

/// Best-effort removal of an emptied source folder.
fn remove_if_empty(folder: &Path) {
    match fs::read_dir(folder).map(|mut entries| entries.next().is_none()) {
        Ok(true) => {
            info!(folder = %folder.display(), "Deleting folder");
            if let Err(e) = fs::remove_dir(folder) {
                warn!(folder = %folder.display(), error = %e, "Can't delete source folder");
            }
        }
        Ok(false) => {
            warn!(folder = %folder.display(), "Can't delete non-empty folder");
        }
        Err(e) => {
            warn!(folder = %folder.display(), error = %e, "Can't inspect source folder");
        }
    }
}

fn is_non_empty_dir(folder: &Path) -> bool {
    fs::read_dir(folder)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}
