use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ManifestError;
use crate::models::{Correspondent, Document, DocumentType, DocumentView, StorageType, Tag};

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

pub const MODEL_DOCUMENT: &str = "documents.document";
pub const MODEL_CORRESPONDENT: &str = "documents.correspondent";
pub const MODEL_TAG: &str = "documents.tag";
pub const MODEL_DOCUMENT_TYPE: &str = "documents.documenttype";

/// One element of `manifest.json`. Document records also name the files written for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub model: String,
    pub pk: i32,
    pub fields: Value,
    #[serde(
        rename = "__exported_file_name__",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub exported_file: Option<String>,
    #[serde(
        rename = "__exported_thumbnail_name__",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub exported_thumbnail: Option<String>,
    #[serde(
        rename = "__exported_archive_name__",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub exported_archive: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentFields {
    pub correspondent: Option<i32>,
    pub document_type: Option<i32>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: String,
    pub mime_type: String,
    pub checksum: String,
    #[serde(default)]
    pub archive_checksum: Option<String>,
    #[serde(default)]
    pub storage_type: StorageType,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub archive_serial_number: Option<i32>,
    #[serde(default)]
    pub tags: Vec<i32>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub added: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrespondentFields {
    pub name: String,
    pub slug: String,
    #[serde(rename = "match", default)]
    pub match_pattern: String,
    #[serde(default = "default_matching_algorithm")]
    pub matching_algorithm: i32,
    #[serde(default = "default_true")]
    pub is_insensitive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTypeFields {
    pub name: String,
    pub slug: String,
    #[serde(rename = "match", default)]
    pub match_pattern: String,
    #[serde(default = "default_matching_algorithm")]
    pub matching_algorithm: i32,
    #[serde(default = "default_true")]
    pub is_insensitive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagFields {
    pub name: String,
    pub slug: String,
    #[serde(default = "default_colour")]
    pub colour: i32,
    #[serde(rename = "match", default)]
    pub match_pattern: String,
    #[serde(default = "default_matching_algorithm")]
    pub matching_algorithm: i32,
    #[serde(default = "default_true")]
    pub is_insensitive: bool,
    #[serde(default)]
    pub is_inbox_tag: bool,
}

fn default_matching_algorithm() -> i32 {
    1
}

fn default_colour() -> i32 {
    1
}

fn default_true() -> bool {
    true
}

/// A manifest record decoded into the rows the store persists.
#[derive(Debug, Clone, PartialEq)]
pub enum ManifestEntity {
    Correspondent(Correspondent),
    DocumentType(DocumentType),
    Tag(Tag),
    Document { document: Document, tag_ids: Vec<i32> },
}

impl ManifestRecord {
    fn new<T: Serialize>(model: &'static str, pk: i32, fields: &T) -> Result<Self, ManifestError> {
        let fields = serde_json::to_value(fields)
            .map_err(|source| ManifestError::Serialize { model, pk, source })?;
        Ok(Self {
            model: model.to_string(),
            pk,
            fields,
            exported_file: None,
            exported_thumbnail: None,
            exported_archive: None,
        })
    }

    /// Export always describes the plaintext copy, so the storage type is reset.
    pub fn from_document(document: &DocumentView) -> Result<Self, ManifestError> {
        let fields = DocumentFields {
            correspondent: document.correspondent.as_ref().map(|c| c.id),
            document_type: document.document_type.as_ref().map(|t| t.id),
            title: document.title.clone(),
            content: document.content.clone(),
            mime_type: document.mime_type.clone(),
            checksum: document.checksum.clone(),
            archive_checksum: document.archive_checksum.clone(),
            storage_type: StorageType::Unencrypted,
            filename: document.filename.clone(),
            archive_serial_number: document.archive_serial_number,
            tags: document.tag_ids(),
            created: document.created,
            modified: document.modified,
            added: document.added,
        };
        Self::new(MODEL_DOCUMENT, document.id, &fields)
    }

    pub fn from_correspondent(correspondent: &Correspondent) -> Result<Self, ManifestError> {
        let fields = CorrespondentFields {
            name: correspondent.name.clone(),
            slug: correspondent.slug.clone(),
            match_pattern: correspondent.match_pattern.clone(),
            matching_algorithm: correspondent.matching_algorithm,
            is_insensitive: correspondent.is_insensitive,
        };
        Self::new(MODEL_CORRESPONDENT, correspondent.id, &fields)
    }

    pub fn from_document_type(document_type: &DocumentType) -> Result<Self, ManifestError> {
        let fields = DocumentTypeFields {
            name: document_type.name.clone(),
            slug: document_type.slug.clone(),
            match_pattern: document_type.match_pattern.clone(),
            matching_algorithm: document_type.matching_algorithm,
            is_insensitive: document_type.is_insensitive,
        };
        Self::new(MODEL_DOCUMENT_TYPE, document_type.id, &fields)
    }

    pub fn from_tag(tag: &Tag) -> Result<Self, ManifestError> {
        let fields = TagFields {
            name: tag.name.clone(),
            slug: tag.slug.clone(),
            colour: tag.colour,
            match_pattern: tag.match_pattern.clone(),
            matching_algorithm: tag.matching_algorithm,
            is_insensitive: tag.is_insensitive,
            is_inbox_tag: tag.is_inbox_tag,
        };
        Self::new(MODEL_TAG, tag.id, &fields)
    }

    pub fn is_document(&self) -> bool {
        self.model == MODEL_DOCUMENT
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, ManifestError> {
        serde_json::from_value(self.fields.clone()).map_err(|source| ManifestError::InvalidFields {
            model: self.model.clone(),
            pk: self.pk,
            source,
        })
    }

    pub fn to_entity(&self) -> Result<ManifestEntity, ManifestError> {
        let pk = self.pk;
        match self.model.as_str() {
            MODEL_DOCUMENT => {
                let fields: DocumentFields = self.decode()?;
                Ok(ManifestEntity::Document {
                    document: Document {
                        id: pk,
                        correspondent_id: fields.correspondent,
                        document_type_id: fields.document_type,
                        title: fields.title,
                        content: fields.content,
                        mime_type: fields.mime_type,
                        checksum: fields.checksum,
                        archive_checksum: fields.archive_checksum,
                        storage_type: fields.storage_type.as_str().to_string(),
                        filename: fields.filename,
                        archive_serial_number: fields.archive_serial_number,
                        created: fields.created,
                        modified: fields.modified,
                        added: fields.added,
                    },
                    tag_ids: fields.tags,
                })
            }
            MODEL_CORRESPONDENT => {
                let fields: CorrespondentFields = self.decode()?;
                Ok(ManifestEntity::Correspondent(Correspondent {
                    id: pk,
                    name: fields.name,
                    slug: fields.slug,
                    match_pattern: fields.match_pattern,
                    matching_algorithm: fields.matching_algorithm,
                    is_insensitive: fields.is_insensitive,
                }))
            }
            MODEL_DOCUMENT_TYPE => {
                let fields: DocumentTypeFields = self.decode()?;
                Ok(ManifestEntity::DocumentType(DocumentType {
                    id: pk,
                    name: fields.name,
                    slug: fields.slug,
                    match_pattern: fields.match_pattern,
                    matching_algorithm: fields.matching_algorithm,
                    is_insensitive: fields.is_insensitive,
                }))
            }
            MODEL_TAG => {
                let fields: TagFields = self.decode()?;
                Ok(ManifestEntity::Tag(Tag {
                    id: pk,
                    name: fields.name,
                    slug: fields.slug,
                    colour: fields.colour,
                    match_pattern: fields.match_pattern,
                    matching_algorithm: fields.matching_algorithm,
                    is_insensitive: fields.is_insensitive,
                    is_inbox_tag: fields.is_inbox_tag,
                }))
            }
            other => Err(ManifestError::UnknownModel(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn document_record_keeps_file_keys_at_top_level() {
        let raw = json!({
            "model": "documents.document",
            "pk": 3,
            "fields": {
                "correspondent": 1,
                "document_type": null,
                "title": "Letter",
                "mime_type": "application/pdf",
                "checksum": "abc",
                "storage_type": "gpg",
                "tags": [2, 5],
                "created": "2020-01-01T00:00:00Z",
                "modified": "2020-01-02T00:00:00Z",
                "added": "2020-01-03T00:00:00Z"
            },
            "__exported_file_name__": "0000003_letter.pdf",
            "__exported_thumbnail_name__": "0000003_letter.pdf-thumbnail.png"
        });

        let record: ManifestRecord = serde_json::from_value(raw).unwrap();
        assert!(record.is_document());
        assert_eq!(record.exported_file.as_deref(), Some("0000003_letter.pdf"));
        assert!(record.exported_archive.is_none());

        match record.to_entity().unwrap() {
            ManifestEntity::Document { document, tag_ids } => {
                assert_eq!(document.id, 3);
                assert_eq!(document.correspondent_id, Some(1));
                assert_eq!(document.storage_type, "gpg");
                assert_eq!(document.content, "");
                assert_eq!(tag_ids, vec![2, 5]);
            }
            other => panic!("unexpected entity {other:?}"),
        }

        let encoded = serde_json::to_value(&record).unwrap();
        assert!(encoded.get("__exported_archive_name__").is_none());
        assert_eq!(encoded["__exported_file_name__"], "0000003_letter.pdf");
    }

    #[test]
    fn tag_fields_use_match_key() {
        let tag = Tag {
            id: 9,
            name: "type_demo".to_string(),
            slug: "type_demo".to_string(),
            colour: 4,
            match_pattern: "invoice".to_string(),
            matching_algorithm: 2,
            is_insensitive: false,
            is_inbox_tag: true,
        };

        let record = ManifestRecord::from_tag(&tag).unwrap();
        assert_eq!(record.model, MODEL_TAG);
        assert_eq!(record.fields["match"], "invoice");
        assert_eq!(record.to_entity().unwrap(), ManifestEntity::Tag(tag));
    }

    #[test]
    fn unknown_models_are_rejected() {
        let record = ManifestRecord {
            model: "auth.user".to_string(),
            pk: 1,
            fields: json!({}),
            exported_file: None,
            exported_thumbnail: None,
            exported_archive: None,
        };
        assert!(matches!(
            record.to_entity(),
            Err(ManifestError::UnknownModel(model)) if model == "auth.user"
        ));
    }
}
