use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use filetime::FileTime;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::cipher::{DocumentCipher, NoCipher};
use crate::error::{ExportError, ExportResult};
use crate::manifest::{ManifestRecord, MANIFEST_FILE_NAME};
use crate::models::DocumentView;
use crate::naming::public_filename;
use crate::paths::{StorageRoots, THUMBNAIL_SUFFIX};
use crate::store::DocumentStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub documents: usize,
    pub files: usize,
    pub manifest: PathBuf,
}

/// Writes every document, decrypted, into a flat directory together with `manifest.json`.
pub struct Exporter {
    roots: StorageRoots,
    cipher: Arc<dyn DocumentCipher>,
}

impl Exporter {
    pub fn new(roots: StorageRoots) -> Self {
        Self::with_cipher(roots, Arc::new(NoCipher))
    }

    pub fn with_cipher(roots: StorageRoots, cipher: Arc<dyn DocumentCipher>) -> Self {
        Self { roots, cipher }
    }

    pub fn export(&self, store: &dyn DocumentStore, target: &Path) -> ExportResult<ExportSummary> {
        if !target.is_dir() {
            return Err(ExportError::TargetMissing(target.to_path_buf()));
        }

        // Creating the manifest's temp file up front doubles as the writability check.
        let mut manifest_file =
            NamedTempFile::new_in(target).map_err(|source| ExportError::TargetNotWritable {
                path: target.to_path_buf(),
                source,
            })?;

        let mut records = Vec::new();
        let mut files = 0;

        let documents = store.list_documents()?;
        for document in &documents {
            let mut record = ManifestRecord::from_document(document)?;
            let stored = document.current_path();

            let file_name = format!("{:07}_{}", document.id, public_filename(document, false));
            self.write_file(document, &stored.under_originals(&self.roots), &target.join(&file_name))?;
            files += 1;

            let thumbnail = stored.under_thumbnails(&self.roots);
            if thumbnail.is_file() {
                let thumbnail_name = format!("{file_name}{THUMBNAIL_SUFFIX}");
                self.write_file(document, &thumbnail, &target.join(&thumbnail_name))?;
                record.exported_thumbnail = Some(thumbnail_name);
                files += 1;
            } else {
                warn!(
                    document_id = document.id,
                    path = %thumbnail.display(),
                    "thumbnail missing; exporting without it"
                );
            }

            let archive = stored.under_archive(&self.roots);
            if archive.is_file() {
                let archive_name = format!(
                    "{:07}_archive_{}",
                    document.id,
                    public_filename(document, true)
                );
                self.write_file(document, &archive, &target.join(&archive_name))?;
                record.exported_archive = Some(archive_name);
                files += 1;
            }

            record.exported_file = Some(file_name);
            debug!(document_id = document.id, "exported document");
            records.push(record);
        }

        for correspondent in store.list_correspondents()? {
            records.push(ManifestRecord::from_correspondent(&correspondent)?);
        }
        for tag in store.list_tags()? {
            records.push(ManifestRecord::from_tag(&tag)?);
        }
        for document_type in store.list_document_types()? {
            records.push(ManifestRecord::from_document_type(&document_type)?);
        }

        let manifest = target.join(MANIFEST_FILE_NAME);
        serde_json::to_writer_pretty(manifest_file.as_file_mut(), &records).map_err(|err| {
            ExportError::ManifestWrite {
                path: manifest.clone(),
                source: err.into(),
            }
        })?;
        manifest_file
            .persist(&manifest)
            .map_err(|err| ExportError::ManifestWrite {
                path: manifest.clone(),
                source: err.error,
            })?;

        info!(
            documents = documents.len(),
            files,
            target = %target.display(),
            "exported document collection"
        );

        Ok(ExportSummary {
            documents: documents.len(),
            files,
            manifest,
        })
    }

    fn write_file(&self, document: &DocumentView, from: &Path, to: &Path) -> ExportResult<()> {
        if document.storage_type.is_encrypted() {
            let ciphertext = fs::read(from).map_err(io_error(document.id, from))?;
            let plaintext =
                self.cipher
                    .decrypt(&ciphertext)
                    .map_err(|source| ExportError::Decrypt {
                        document_id: document.id,
                        path: from.to_path_buf(),
                        source,
                    })?;
            fs::write(to, plaintext).map_err(io_error(document.id, to))?;
        } else {
            fs::copy(from, to).map_err(io_error(document.id, from))?;
        }

        // Copies keep the source's permission bits, so the file may not be writable.
        let mtime = FileTime::from_system_time(SystemTime::from(document.created));
        filetime::set_file_mtime(to, mtime).map_err(io_error(document.id, to))
    }
}

fn io_error(document_id: i32, path: &Path) -> impl FnOnce(io::Error) -> ExportError {
    let path = path.to_path_buf();
    move |source| ExportError::Io {
        document_id,
        path,
        source,
    }
}
