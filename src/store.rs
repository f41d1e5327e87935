use std::collections::HashMap;

use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use tracing::{debug, info};

use crate::db::PgPool;
use crate::error::{StoreError, StoreResult};
use crate::manifest::ManifestEntity;
use crate::models::{
    Correspondent, Document, DocumentType, DocumentView, NewDocumentTag, StorageType, Tag,
};
use crate::schema::{correspondents, document_tags, document_types, documents, tags};

/// The record store behind the file handling layer. Everything that moves or copies files
/// talks to the database through this trait so tests can substitute an in-memory store.
pub trait DocumentStore: Send + Sync {
    fn load_document(&self, id: i32) -> StoreResult<DocumentView>;

    /// All documents ordered by id.
    fn list_documents(&self) -> StoreResult<Vec<DocumentView>>;

    fn list_correspondents(&self) -> StoreResult<Vec<Correspondent>>;

    fn list_tags(&self) -> StoreResult<Vec<Tag>>;

    fn list_document_types(&self) -> StoreResult<Vec<DocumentType>>;

    /// The id of the document whose recorded filename equals `filename`, if any.
    fn find_by_filename(&self, filename: &str) -> StoreResult<Option<i32>>;

    fn update_placement(
        &self,
        id: i32,
        filename: &str,
        storage_type: StorageType,
    ) -> StoreResult<()>;

    /// Inserts or replaces every entity in one transaction, keeping the primary keys given.
    fn load_entities(&self, entities: &[ManifestEntity]) -> StoreResult<()>;

    fn delete_document(&self, id: i32) -> StoreResult<()>;
}

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> StoreResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| StoreError::Pool(err.to_string()))
    }
}

impl DocumentStore for PgDocumentStore {
    fn load_document(&self, id: i32) -> StoreResult<DocumentView> {
        let mut conn = self.conn()?;
        let row: Option<Document> = documents::table
            .find(id)
            .first(&mut conn)
            .optional()?;
        let row = row.ok_or(StoreError::DocumentNotFound(id))?;

        hydrate(&mut conn, vec![row])?
            .pop()
            .ok_or(StoreError::DocumentNotFound(id))
    }

    fn list_documents(&self) -> StoreResult<Vec<DocumentView>> {
        let mut conn = self.conn()?;
        let rows: Vec<Document> = documents::table
            .order(documents::id.asc())
            .load(&mut conn)?;
        hydrate(&mut conn, rows)
    }

    fn list_correspondents(&self) -> StoreResult<Vec<Correspondent>> {
        let mut conn = self.conn()?;
        Ok(correspondents::table
            .order(correspondents::id.asc())
            .load(&mut conn)?)
    }

    fn list_tags(&self) -> StoreResult<Vec<Tag>> {
        let mut conn = self.conn()?;
        Ok(tags::table.order(tags::id.asc()).load(&mut conn)?)
    }

    fn list_document_types(&self) -> StoreResult<Vec<DocumentType>> {
        let mut conn = self.conn()?;
        Ok(document_types::table
            .order(document_types::id.asc())
            .load(&mut conn)?)
    }

    fn find_by_filename(&self, filename: &str) -> StoreResult<Option<i32>> {
        let mut conn = self.conn()?;
        Ok(documents::table
            .filter(documents::filename.eq(filename))
            .select(documents::id)
            .first(&mut conn)
            .optional()?)
    }

    fn update_placement(
        &self,
        id: i32,
        filename: &str,
        storage_type: StorageType,
    ) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let updated = diesel::update(documents::table.find(id))
            .set((
                documents::filename.eq(filename),
                documents::storage_type.eq(storage_type.as_str()),
            ))
            .execute(&mut conn)?;

        if updated == 0 {
            return Err(StoreError::DocumentNotFound(id));
        }
        Ok(())
    }

    fn load_entities(&self, entities: &[ManifestEntity]) -> StoreResult<()> {
        let mut conn = self.conn()?;
        conn.transaction::<(), StoreError, _>(|conn| {
            // Referenced rows first so foreign keys resolve.
            for entity in entities {
                match entity {
                    ManifestEntity::Correspondent(row) => {
                        diesel::insert_into(correspondents::table)
                            .values(row)
                            .on_conflict(correspondents::id)
                            .do_update()
                            .set(row)
                            .execute(conn)?;
                    }
                    ManifestEntity::DocumentType(row) => {
                        diesel::insert_into(document_types::table)
                            .values(row)
                            .on_conflict(document_types::id)
                            .do_update()
                            .set(row)
                            .execute(conn)?;
                    }
                    ManifestEntity::Tag(row) => {
                        diesel::insert_into(tags::table)
                            .values(row)
                            .on_conflict(tags::id)
                            .do_update()
                            .set(row)
                            .execute(conn)?;
                    }
                    ManifestEntity::Document { .. } => {}
                }
            }

            for entity in entities {
                let ManifestEntity::Document { document, tag_ids } = entity else {
                    continue;
                };

                diesel::insert_into(documents::table)
                    .values(document)
                    .on_conflict(documents::id)
                    .do_update()
                    .set(document)
                    .execute(conn)?;

                diesel::delete(
                    document_tags::table.filter(document_tags::document_id.eq(document.id)),
                )
                .execute(conn)?;

                let links: Vec<NewDocumentTag> = tag_ids
                    .iter()
                    .map(|&tag_id| NewDocumentTag {
                        document_id: document.id,
                        tag_id,
                    })
                    .collect();
                if !links.is_empty() {
                    diesel::insert_into(document_tags::table)
                        .values(&links)
                        .on_conflict_do_nothing()
                        .execute(conn)?;
                }
            }

            for table in ["correspondents", "document_types", "tags", "documents"] {
                reset_sequence(conn, table)?;
            }

            Ok(())
        })?;

        info!(count = entities.len(), "loaded manifest entities");
        Ok(())
    }

    fn delete_document(&self, id: i32) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let deleted = diesel::delete(documents::table.find(id)).execute(&mut conn)?;
        if deleted == 0 {
            return Err(StoreError::DocumentNotFound(id));
        }
        debug!(document_id = id, "deleted document record");
        Ok(())
    }
}

/// Explicit primary keys bypass the serial sequences; move them past the loaded rows.
fn reset_sequence(conn: &mut PgConnection, table: &str) -> StoreResult<()> {
    let statement = format!(
        "SELECT setval(pg_get_serial_sequence('{table}', 'id'), \
         COALESCE((SELECT MAX(id) FROM {table}), 0) + 1, false)"
    );
    diesel::sql_query(statement).execute(conn)?;
    Ok(())
}

fn hydrate(conn: &mut PgConnection, rows: Vec<Document>) -> StoreResult<Vec<DocumentView>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let document_ids: Vec<i32> = rows.iter().map(|row| row.id).collect();
    let correspondent_ids: Vec<i32> = rows.iter().filter_map(|row| row.correspondent_id).collect();
    let type_ids: Vec<i32> = rows.iter().filter_map(|row| row.document_type_id).collect();

    let correspondent_map: HashMap<i32, Correspondent> = correspondents::table
        .filter(correspondents::id.eq_any(&correspondent_ids))
        .load::<Correspondent>(conn)?
        .into_iter()
        .map(|row| (row.id, row))
        .collect();

    let type_map: HashMap<i32, DocumentType> = document_types::table
        .filter(document_types::id.eq_any(&type_ids))
        .load::<DocumentType>(conn)?
        .into_iter()
        .map(|row| (row.id, row))
        .collect();

    let tag_rows: Vec<(i32, Tag)> = document_tags::table
        .inner_join(tags::table)
        .filter(document_tags::document_id.eq_any(&document_ids))
        .select((document_tags::document_id, tags::all_columns))
        .load(conn)?;

    let mut tag_map: HashMap<i32, Vec<Tag>> = HashMap::new();
    for (document_id, tag) in tag_rows {
        tag_map.entry(document_id).or_default().push(tag);
    }

    rows.into_iter()
        .map(|row| {
            let correspondent = row
                .correspondent_id
                .and_then(|id| correspondent_map.get(&id).cloned());
            let document_type = row
                .document_type_id
                .and_then(|id| type_map.get(&id).cloned());
            let tags = tag_map.remove(&row.id).unwrap_or_default();
            DocumentView::from_row(row, correspondent, document_type, tags)
        })
        .collect()
}
