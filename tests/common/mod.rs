use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use diesel::connection::SimpleConnection;
use once_cell::sync::Lazy;
use paperfile::db::{self, PgPool};
use paperfile::error::{StoreError, StoreResult};
use paperfile::manifest::ManifestEntity;
use paperfile::models::{Correspondent, Document, DocumentType, DocumentView, StorageType, Tag};
use paperfile::{DocumentStore, StorageRoots};
use sha2::{Digest, Sha256};
use tempfile::TempDir;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[allow(dead_code)]
#[derive(Default)]
struct State {
    documents: BTreeMap<i32, (Document, Vec<i32>)>,
    correspondents: BTreeMap<i32, Correspondent>,
    document_types: BTreeMap<i32, DocumentType>,
    tags: BTreeMap<i32, Tag>,
}

/// In-memory `DocumentStore` with switches for injecting store failures.
#[allow(dead_code)]
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<State>,
    fail_lookups: AtomicBool,
    fail_updates: AtomicBool,
}

#[allow(dead_code)]
impl FakeStore {
    pub fn insert(&self, document: &DocumentView) {
        let mut state = self.state.lock().unwrap();
        if let Some(correspondent) = &document.correspondent {
            state
                .correspondents
                .insert(correspondent.id, correspondent.clone());
        }
        if let Some(document_type) = &document.document_type {
            state
                .document_types
                .insert(document_type.id, document_type.clone());
        }
        for tag in &document.tags {
            state.tags.insert(tag.id, tag.clone());
        }
        state
            .documents
            .insert(document.id, (to_row(document), document.tag_ids()));
    }

    pub fn filename_of(&self, id: i32) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .documents
            .get(&id)
            .and_then(|(row, _)| row.filename.clone())
    }

    pub fn storage_type_of(&self, id: i32) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.documents.get(&id).map(|(row, _)| row.storage_type.clone())
    }

    pub fn document_count(&self) -> usize {
        self.state.lock().unwrap().documents.len()
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

impl DocumentStore for FakeStore {
    fn load_document(&self, id: i32) -> StoreResult<DocumentView> {
        let state = self.state.lock().unwrap();
        let (row, tag_ids) = state
            .documents
            .get(&id)
            .cloned()
            .ok_or(StoreError::DocumentNotFound(id))?;
        let correspondent = row
            .correspondent_id
            .and_then(|id| state.correspondents.get(&id).cloned());
        let document_type = row
            .document_type_id
            .and_then(|id| state.document_types.get(&id).cloned());
        let tags = tag_ids
            .iter()
            .filter_map(|id| state.tags.get(id).cloned())
            .collect();
        DocumentView::from_row(row, correspondent, document_type, tags)
    }

    fn list_documents(&self) -> StoreResult<Vec<DocumentView>> {
        let ids: Vec<i32> = self.state.lock().unwrap().documents.keys().copied().collect();
        ids.into_iter().map(|id| self.load_document(id)).collect()
    }

    fn list_correspondents(&self) -> StoreResult<Vec<Correspondent>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .correspondents
            .values()
            .cloned()
            .collect())
    }

    fn list_tags(&self) -> StoreResult<Vec<Tag>> {
        Ok(self.state.lock().unwrap().tags.values().cloned().collect())
    }

    fn list_document_types(&self) -> StoreResult<Vec<DocumentType>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .document_types
            .values()
            .cloned()
            .collect())
    }

    fn find_by_filename(&self, filename: &str) -> StoreResult<Option<i32>> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("lookup disabled".to_string()));
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .documents
            .values()
            .find(|(row, _)| row.filename.as_deref() == Some(filename))
            .map(|(row, _)| row.id))
    }

    fn update_placement(
        &self,
        id: i32,
        filename: &str,
        storage_type: StorageType,
    ) -> StoreResult<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("updates disabled".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        let (row, _) = state
            .documents
            .get_mut(&id)
            .ok_or(StoreError::DocumentNotFound(id))?;
        row.filename = Some(filename.to_string());
        row.storage_type = storage_type.as_str().to_string();
        Ok(())
    }

    fn load_entities(&self, entities: &[ManifestEntity]) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        for entity in entities {
            match entity {
                ManifestEntity::Correspondent(row) => {
                    state.correspondents.insert(row.id, row.clone());
                }
                ManifestEntity::DocumentType(row) => {
                    state.document_types.insert(row.id, row.clone());
                }
                ManifestEntity::Tag(row) => {
                    state.tags.insert(row.id, row.clone());
                }
                ManifestEntity::Document { document, tag_ids } => {
                    state
                        .documents
                        .insert(document.id, (document.clone(), tag_ids.clone()));
                }
            }
        }
        Ok(())
    }

    fn delete_document(&self, id: i32) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .documents
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::DocumentNotFound(id))
    }
}

#[allow(dead_code)]
fn to_row(document: &DocumentView) -> Document {
    Document {
        id: document.id,
        correspondent_id: document.correspondent.as_ref().map(|c| c.id),
        document_type_id: document.document_type.as_ref().map(|t| t.id),
        title: document.title.clone(),
        content: document.content.clone(),
        mime_type: document.mime_type.clone(),
        checksum: document.checksum.clone(),
        archive_checksum: document.archive_checksum.clone(),
        storage_type: document.storage_type.as_str().to_string(),
        filename: document.filename.clone(),
        archive_serial_number: document.archive_serial_number,
        created: document.created,
        modified: document.modified,
        added: document.added,
    }
}

/// Three storage trees inside a temporary media directory.
#[allow(dead_code)]
pub struct Media {
    _dir: TempDir,
    pub roots: StorageRoots,
}

#[allow(dead_code)]
impl Media {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("failed to create media dir")?;
        let roots = StorageRoots::under_media_root(dir.path());
        roots.ensure_exist()?;
        Ok(Self { _dir: dir, roots })
    }

    pub fn originals(&self) -> &Path {
        &self.roots.originals
    }

    pub fn archive(&self) -> &Path {
        &self.roots.archive
    }

    pub fn thumbnails(&self) -> &Path {
        &self.roots.thumbnails
    }

    /// Writes `bytes` at `relative` below `root`, creating parents.
    pub fn put(&self, root: &Path, relative: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(path)
    }
}

#[allow(dead_code)]
pub fn created_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 3, 14, 9, 26, 53).unwrap()
}

#[allow(dead_code)]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// A plain PDF document with no metadata beyond its id.
#[allow(dead_code)]
pub fn document(id: i32) -> DocumentView {
    DocumentView {
        id,
        storage_type: StorageType::Unencrypted,
        mime_type: "application/pdf".to_string(),
        checksum: format!("checksum-{id}"),
        archive_checksum: None,
        filename: None,
        title: None,
        content: String::new(),
        correspondent: None,
        document_type: None,
        tags: Vec::new(),
        archive_serial_number: None,
        created: created_at(),
        modified: created_at(),
        added: created_at(),
    }
}

#[allow(dead_code)]
pub fn correspondent(id: i32, name: &str) -> Correspondent {
    Correspondent {
        id,
        name: name.to_string(),
        slug: name.to_lowercase(),
        match_pattern: String::new(),
        matching_algorithm: 1,
        is_insensitive: true,
    }
}

#[allow(dead_code)]
pub fn document_type(id: i32, name: &str) -> DocumentType {
    DocumentType {
        id,
        name: name.to_string(),
        slug: name.to_lowercase(),
        match_pattern: String::new(),
        matching_algorithm: 1,
        is_insensitive: true,
    }
}

#[allow(dead_code)]
pub fn tag(id: i32, name: &str) -> Tag {
    Tag {
        id,
        name: name.to_string(),
        slug: name.to_lowercase(),
        colour: 1,
        match_pattern: String::new(),
        matching_algorithm: 1,
        is_insensitive: true,
        is_inbox_tag: false,
    }
}

/// Postgres pool for store tests, or `None` when `TEST_DATABASE_URL` is not set.
#[allow(dead_code)]
pub fn test_pool() -> Result<Option<PgPool>> {
    let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
        return Ok(None);
    };
    let pool = db::init_pool(&database_url)?;
    db::run_migrations(&pool)?;
    let mut conn = pool
        .get()
        .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
    truncate_all(&mut conn)?;
    Ok(Some(pool))
}

#[allow(dead_code)]
pub fn acquire_db_lock() -> std::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn truncate_all(conn: &mut diesel::PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE document_tags, documents, tags, correspondents, document_types RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
