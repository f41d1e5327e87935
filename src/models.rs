use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::naming;
use crate::paths::DocumentPath;
use crate::schema::*;

pub const STORAGE_UNENCRYPTED: &str = "unencrypted";
pub const STORAGE_GPG: &str = "gpg";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageType {
    #[default]
    #[serde(rename = "unencrypted")]
    Unencrypted,
    #[serde(rename = "gpg")]
    EncryptedAtRest,
}

impl StorageType {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageType::Unencrypted => STORAGE_UNENCRYPTED,
            StorageType::EncryptedAtRest => STORAGE_GPG,
        }
    }

    pub fn is_encrypted(self) -> bool {
        matches!(self, StorageType::EncryptedAtRest)
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageType {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            STORAGE_UNENCRYPTED => Ok(StorageType::Unencrypted),
            STORAGE_GPG => Ok(StorageType::EncryptedAtRest),
            other => Err(StoreError::InvalidRecord(format!(
                "unknown storage type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Insertable, AsChangeset)]
#[diesel(table_name = documents)]
#[diesel(treat_none_as_null = true)]
pub struct Document {
    pub id: i32,
    pub correspondent_id: Option<i32>,
    pub document_type_id: Option<i32>,
    pub title: Option<String>,
    pub content: String,
    pub mime_type: String,
    pub checksum: String,
    pub archive_checksum: Option<String>,
    pub storage_type: String,
    pub filename: Option<String>,
    pub archive_serial_number: Option<i32>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub added: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Insertable, AsChangeset)]
#[diesel(table_name = correspondents)]
pub struct Correspondent {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub match_pattern: String,
    pub matching_algorithm: i32,
    pub is_insensitive: bool,
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Insertable, AsChangeset)]
#[diesel(table_name = document_types)]
pub struct DocumentType {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub match_pattern: String,
    pub matching_algorithm: i32,
    pub is_insensitive: bool,
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Insertable, AsChangeset)]
#[diesel(table_name = tags)]
pub struct Tag {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub colour: i32,
    pub match_pattern: String,
    pub matching_algorithm: i32,
    pub is_insensitive: bool,
    pub is_inbox_tag: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = document_tags)]
pub struct NewDocumentTag {
    pub document_id: i32,
    pub tag_id: i32,
}

/// A document together with the entities its naming template can reference.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentView {
    pub id: i32,
    pub storage_type: StorageType,
    pub mime_type: String,
    pub checksum: String,
    pub archive_checksum: Option<String>,
    pub filename: Option<String>,
    pub title: Option<String>,
    pub content: String,
    pub correspondent: Option<Correspondent>,
    pub document_type: Option<DocumentType>,
    /// Ordered by tag id, i.e. creation order.
    pub tags: Vec<Tag>,
    pub archive_serial_number: Option<i32>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub added: DateTime<Utc>,
}

impl DocumentView {
    pub fn from_row(
        row: Document,
        correspondent: Option<Correspondent>,
        document_type: Option<DocumentType>,
        mut tags: Vec<Tag>,
    ) -> StoreResult<Self> {
        tags.sort_by_key(|tag| tag.id);
        Ok(Self {
            id: row.id,
            storage_type: row.storage_type.parse()?,
            mime_type: row.mime_type,
            checksum: row.checksum,
            archive_checksum: row.archive_checksum,
            filename: row.filename,
            title: row.title,
            content: row.content,
            correspondent,
            document_type,
            tags,
            archive_serial_number: row.archive_serial_number,
            created: row.created,
            modified: row.modified,
            added: row.added,
        })
    }

    /// Where the files currently live: the recorded filename, or the numeric default for
    /// records that never had one.
    pub fn current_path(&self) -> DocumentPath {
        match self.filename.as_deref() {
            Some(filename) if !filename.is_empty() => DocumentPath::parse(filename),
            _ => naming::fallback_path(self),
        }
    }

    pub fn tag_ids(&self) -> Vec<i32> {
        self.tags.iter().map(|tag| tag.id).collect()
    }
}
