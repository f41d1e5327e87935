use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dirs::{ensure_parent_dirs, prune_empty_ancestors, FileMover, LocalFs};
use crate::error::{RelocationFailure, SyncError, SyncResult};
use crate::models::DocumentView;
use crate::naming::{self, NamingConfig};
use crate::paths::{DocumentPath, StorageRoots, Tree};
use crate::store::DocumentStore;

/// Highest `_NN` suffix tried before giving up on a colliding name.
pub const MAX_COLLISION_COUNTER: u32 = 99;

#[derive(Debug)]
pub enum ReconcileOutcome {
    Unchanged,
    Moved { from: String, to: String },
    Skipped { reason: SkipReason },
    /// A rename failed part way; every completed rename was reversed.
    RolledBack { failure: RelocationFailure },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    SourceMissing(PathBuf),
    DestinationOccupied(PathBuf),
    NoFreeName,
}

#[derive(Debug, Default)]
pub struct RetireReport {
    pub removed: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, io::Error)>,
}

impl RetireReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RenameSummary {
    pub unchanged: usize,
    pub moved: usize,
    pub skipped: usize,
    pub rolled_back: usize,
    pub failed: usize,
}

#[derive(Debug)]
struct PlannedMove {
    tree: Tree,
    from: PathBuf,
    to: PathBuf,
}

/// Keeps the three storage trees in line with what the naming template says each document
/// should be called.
#[derive(Clone)]
pub struct Synchronizer {
    roots: StorageRoots,
    naming: NamingConfig,
    mover: Arc<dyn FileMover>,
}

impl Synchronizer {
    pub fn new(roots: StorageRoots, naming: NamingConfig) -> Self {
        Self::with_mover(roots, naming, Arc::new(LocalFs))
    }

    pub fn with_mover(roots: StorageRoots, naming: NamingConfig, mover: Arc<dyn FileMover>) -> Self {
        Self {
            roots,
            naming,
            mover,
        }
    }

    pub fn roots(&self) -> &StorageRoots {
        &self.roots
    }

    pub fn naming(&self) -> &NamingConfig {
        &self.naming
    }

    pub fn canonical_path(&self, document: &DocumentView) -> DocumentPath {
        naming::resolve(document, &self.naming)
    }

    /// Moves the document's files to their canonical location and records the new filename.
    /// On success `document.filename` is updated in place.
    pub fn reconcile(
        &self,
        store: &dyn DocumentStore,
        document: &mut DocumentView,
    ) -> SyncResult<ReconcileOutcome> {
        let Some(current_name) = document.filename.clone().filter(|name| !name.is_empty()) else {
            debug!(document_id = document.id, "document has no filename yet; nothing to move");
            return Ok(ReconcileOutcome::Unchanged);
        };

        let canonical = self.canonical_path(document);
        if canonical.filename() == current_name {
            debug!(document_id = document.id, filename = %current_name, "already in place");
            return Ok(ReconcileOutcome::Unchanged);
        }

        let Some(target) = self.claim_path(store, document.id, canonical)? else {
            warn!(
                document_id = document.id,
                "no free filename left for document; leaving files in place"
            );
            return Ok(ReconcileOutcome::Skipped {
                reason: SkipReason::NoFreeName,
            });
        };

        let target_name = target.filename();
        if target_name == current_name {
            return Ok(ReconcileOutcome::Unchanged);
        }

        let current = DocumentPath::parse(&current_name);
        let moves = match self.plan(&current, &target) {
            Ok(moves) => moves,
            Err(reason) => {
                warn!(
                    document_id = document.id,
                    from = %current_name,
                    to = %target_name,
                    reason = ?reason,
                    "skipping file relocation"
                );
                return Ok(ReconcileOutcome::Skipped { reason });
            }
        };

        if let Err(failure) = self.apply(document.id, &moves) {
            warn!(
                document_id = document.id,
                error = %failure,
                "file relocation failed; previous names restored"
            );
            return Ok(ReconcileOutcome::RolledBack { failure });
        }

        if let Err(source) = store.update_placement(document.id, &target_name, document.storage_type)
        {
            self.revert(document.id, &moves);
            return Err(SyncError::Persist {
                document_id: document.id,
                path: target_name,
                source,
            });
        }

        for planned in &moves {
            prune_empty_ancestors(&planned.from, self.roots.root(planned.tree));
        }

        info!(
            document_id = document.id,
            from = %current_name,
            to = %target_name,
            "moved document files"
        );
        document.filename = Some(target_name.clone());

        Ok(ReconcileOutcome::Moved {
            from: current_name,
            to: target_name,
        })
    }

    /// Reconciles every document in the store. A failure for one document is logged and
    /// counted; the batch carries on.
    pub fn reconcile_all(&self, store: &dyn DocumentStore) -> SyncResult<RenameSummary> {
        let mut summary = RenameSummary::default();

        for mut document in store.list_documents()? {
            match self.reconcile(store, &mut document) {
                Ok(ReconcileOutcome::Unchanged) => summary.unchanged += 1,
                Ok(ReconcileOutcome::Moved { .. }) => summary.moved += 1,
                Ok(ReconcileOutcome::Skipped { .. }) => summary.skipped += 1,
                Ok(ReconcileOutcome::RolledBack { .. }) => summary.rolled_back += 1,
                Err(err) => {
                    warn!(document_id = document.id, error = %err, "failed to reconcile document");
                    summary.failed += 1;
                }
            }
        }

        info!(
            moved = summary.moved,
            unchanged = summary.unchanged,
            skipped = summary.skipped,
            rolled_back = summary.rolled_back,
            failed = summary.failed,
            "reconciled storage trees"
        );
        Ok(summary)
    }

    /// Deletes the document's files from every tree and prunes directories left empty.
    /// Problems are reported, never raised, since the record is already gone.
    pub fn retire(&self, document: &DocumentView) -> RetireReport {
        let path = document.current_path();
        let mut report = RetireReport::default();

        for tree in Tree::RELOCATION_ORDER {
            let file = path.under(&self.roots, tree);
            match fs::remove_file(&file) {
                Ok(()) => {
                    debug!(document_id = document.id, path = %file.display(), "removed file");
                    report.removed.push(file.clone());
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(
                        document_id = document.id,
                        path = %file.display(),
                        error = %err,
                        "failed to remove document file"
                    );
                    report.failures.push((file.clone(), err));
                    continue;
                }
            }
            prune_empty_ancestors(&file, self.roots.root(tree));
        }

        report
    }

    /// First name starting at `canonical` that no other document has recorded.
    fn claim_path(
        &self,
        store: &dyn DocumentStore,
        document_id: i32,
        canonical: DocumentPath,
    ) -> SyncResult<Option<DocumentPath>> {
        let candidates = std::iter::once(canonical.clone())
            .chain((1..=MAX_COLLISION_COUNTER).map(|n| canonical.with_counter(n)));

        for candidate in candidates {
            let filename = candidate.filename();
            let owner = store.find_by_filename(&filename).map_err(|source| {
                SyncError::CollisionCheckFailed {
                    document_id,
                    path: filename.clone(),
                    source,
                }
            })?;

            match owner {
                Some(other) if other != document_id => {
                    debug!(document_id, path = %filename, owner = other, "filename taken");
                }
                _ => return Ok(Some(candidate)),
            }
        }

        Ok(None)
    }

    fn plan(
        &self,
        current: &DocumentPath,
        target: &DocumentPath,
    ) -> Result<Vec<PlannedMove>, SkipReason> {
        let mut moves = Vec::new();

        for tree in Tree::RELOCATION_ORDER {
            let from = current.under(&self.roots, tree);
            let to = target.under(&self.roots, tree);

            // Only regular files move; a directory here holds other documents.
            if !from.is_file() {
                if tree == Tree::Originals {
                    return Err(SkipReason::SourceMissing(from));
                }
                continue;
            }
            if from == to {
                continue;
            }
            if fs::symlink_metadata(&to).is_ok() {
                return Err(SkipReason::DestinationOccupied(to));
            }

            moves.push(PlannedMove { tree, from, to });
        }

        Ok(moves)
    }

    fn apply(&self, document_id: i32, moves: &[PlannedMove]) -> Result<(), RelocationFailure> {
        for (index, planned) in moves.iter().enumerate() {
            let result = ensure_parent_dirs(&planned.to)
                .and_then(|()| self.mover.rename(&planned.from, &planned.to));

            if let Err(source) = result {
                self.revert(document_id, &moves[..index]);
                prune_empty_ancestors(&planned.to, self.roots.root(planned.tree));
                return Err(RelocationFailure {
                    document_id,
                    tree: planned.tree,
                    from: planned.from.clone(),
                    to: planned.to.clone(),
                    source,
                });
            }
        }
        Ok(())
    }

    /// Undoes completed renames, newest first, and drops directories made for the new names.
    fn revert(&self, document_id: i32, completed: &[PlannedMove]) {
        for planned in completed.iter().rev() {
            if let Err(err) = self.mover.rename(&planned.to, &planned.from) {
                warn!(
                    document_id,
                    tree = %planned.tree,
                    from = %planned.to.display(),
                    to = %planned.from.display(),
                    error = %err,
                    "failed to restore file after aborted relocation"
                );
            }
            prune_empty_ancestors(&planned.to, self.roots.root(planned.tree));
        }
    }
}
