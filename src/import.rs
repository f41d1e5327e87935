use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::dirs::ensure_parent_dirs;
use crate::error::{ImportError, ImportResult};
use crate::manifest::{ManifestEntity, ManifestRecord, MANIFEST_FILE_NAME};
use crate::models::StorageType;
use crate::naming::{self, NamingConfig};
use crate::paths::{StorageRoots, Tree};
use crate::store::DocumentStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub documents: usize,
    pub entities: usize,
    pub checksum_mismatches: usize,
}

/// Loads an export directory back into the store and the storage trees.
pub struct Importer {
    roots: StorageRoots,
    naming: NamingConfig,
}

impl Importer {
    pub fn new(roots: StorageRoots, naming: NamingConfig) -> Self {
        Self { roots, naming }
    }

    pub fn import(&self, store: &dyn DocumentStore, source: &Path) -> ImportResult<ImportSummary> {
        if !source.is_dir() {
            return Err(ImportError::SourceMissing(source.to_path_buf()));
        }

        let manifest_path = source.join(MANIFEST_FILE_NAME);
        if !manifest_path.is_file() {
            return Err(ImportError::ManifestMissing(source.to_path_buf()));
        }

        let raw = fs::read_to_string(&manifest_path).map_err(|err| ImportError::ManifestRead {
            path: manifest_path.clone(),
            source: err,
        })?;
        let records: Vec<ManifestRecord> = serde_json::from_str(&raw)?;

        check_references(&records, source)?;

        let mut entities = records
            .iter()
            .map(ManifestRecord::to_entity)
            .collect::<Result<Vec<_>, _>>()?;

        // Files are decrypted on export, and placement is recorded only once they are copied.
        for entity in &mut entities {
            if let ManifestEntity::Document { document, .. } = entity {
                document.storage_type = StorageType::Unencrypted.as_str().to_string();
                document.filename = None;
            }
        }

        store.load_entities(&entities)?;
        self.roots.ensure_exist().map_err(ImportError::Storage)?;

        let mut summary = ImportSummary {
            entities: entities.len(),
            ..ImportSummary::default()
        };

        for record in records.iter().filter(|record| record.is_document()) {
            if !self.place_document(store, source, record)? {
                summary.checksum_mismatches += 1;
            }
            summary.documents += 1;
        }

        info!(
            documents = summary.documents,
            entities = summary.entities,
            source = %source.display(),
            "imported document collection"
        );
        Ok(summary)
    }

    /// Copies one document's files into the trees and records the placement. Returns whether
    /// the copied original matched the recorded checksum.
    fn place_document(
        &self,
        store: &dyn DocumentStore,
        source: &Path,
        record: &ManifestRecord,
    ) -> ImportResult<bool> {
        let pk = record.pk;
        let mut document = store.load_document(pk)?;
        document.storage_type = StorageType::Unencrypted;

        let path = naming::resolve(&document, &self.naming);
        let exported = [
            (Tree::Originals, record.exported_file.as_deref()),
            (Tree::Thumbnails, record.exported_thumbnail.as_deref()),
            (Tree::Archive, record.exported_archive.as_deref()),
        ];

        let copies: Vec<(PathBuf, PathBuf)> = exported
            .iter()
            .filter_map(|(tree, name)| {
                name.map(|name| (source.join(name), path.under(&self.roots, *tree)))
            })
            .collect();

        if let Some((_, occupied)) = copies.iter().find(|(_, to)| to.exists()) {
            return Err(ImportError::DestinationCollision {
                pk,
                path: occupied.clone(),
            });
        }

        for (from, to) in &copies {
            ensure_parent_dirs(to)
                .and_then(|()| fs::copy(from, to).map(|_| ()))
                .map_err(|err| ImportError::Copy {
                    pk,
                    from: from.clone(),
                    to: to.clone(),
                    source: err,
                })?;
        }

        let original = path.under_originals(&self.roots);
        let checksum_ok = match sha256_file(&original) {
            Ok(actual) => {
                if actual != document.checksum {
                    warn!(
                        document_id = pk,
                        expected = %document.checksum,
                        actual = %actual,
                        "checksum of imported file does not match the manifest"
                    );
                }
                actual == document.checksum
            }
            Err(err) => {
                warn!(
                    document_id = pk,
                    path = %original.display(),
                    error = %err,
                    "could not verify imported file"
                );
                false
            }
        };

        let filename = path.filename();
        store.update_placement(pk, &filename, StorageType::Unencrypted)?;
        debug!(document_id = pk, filename = %filename, "placed imported document");

        Ok(checksum_ok)
    }
}

/// Every file a document record names must sit directly in `source` and be present before
/// anything is written.
fn check_references(records: &[ManifestRecord], source: &Path) -> ImportResult<()> {
    for record in records.iter().filter(|record| record.is_document()) {
        let Some(file) = record.exported_file.as_deref() else {
            return Err(ImportError::MissingFileKey { pk: record.pk });
        };

        let declared = std::iter::once(file)
            .chain(record.exported_thumbnail.as_deref())
            .chain(record.exported_archive.as_deref());

        for name in declared {
            if !is_plain_file_name(name) {
                return Err(ImportError::InvalidManifestReference {
                    pk: record.pk,
                    file: name.to_string(),
                });
            }
            if !source.join(name).is_file() {
                return Err(ImportError::MissingManifestReference {
                    pk: record.pk,
                    file: name.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// A single normal component: no separators, no `..`, not absolute.
fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
