use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::cipher::CipherError;
use crate::paths::Tree;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("database pool error: {0}")]
    Pool(String),
    #[error("document {0} not found")]
    DocumentNotFound(i32),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("document store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A rename in one of the trees failed; everything already moved was put back.
#[derive(Debug, Error)]
#[error(
    "failed to move {tree} file of document {document_id} from {} to {}: {source}",
    .from.display(),
    .to.display()
)]
pub struct RelocationFailure {
    pub document_id: i32,
    pub tree: Tree,
    pub from: PathBuf,
    pub to: PathBuf,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("could not check whether {path} is in use (document {document_id}): {source}")]
    CollisionCheckFailed {
        document_id: i32,
        path: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to record filename {path} for document {document_id}: {source}")]
    Persist {
        document_id: i32,
        path: String,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("unknown manifest model '{0}'")]
    UnknownModel(String),
    #[error("manifest record {model}:{pk} has invalid fields: {source}")]
    InvalidFields {
        model: String,
        pk: i32,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize {model}:{pk}: {source}")]
    Serialize {
        model: &'static str,
        pk: i32,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export target {} does not exist or is not a directory", .0.display())]
    TargetMissing(PathBuf),
    #[error("export target {} is not writable: {source}", .path.display())]
    TargetNotWritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to export {} for document {document_id}: {source}", .path.display())]
    Io {
        document_id: i32,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decrypt {} for document {document_id}: {source}", .path.display())]
    Decrypt {
        document_id: i32,
        path: PathBuf,
        #[source]
        source: CipherError,
    },
    #[error("failed to write manifest {}: {source}", .path.display())]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ExportResult<T> = Result<T, ExportError>;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("import source {} does not exist or is not a directory", .0.display())]
    SourceMissing(PathBuf),
    #[error("{} does not contain a manifest.json file", .0.display())]
    ManifestMissing(PathBuf),
    #[error("failed to read manifest {}: {source}", .path.display())]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("manifest is not valid JSON: {0}")]
    ManifestFormat(#[from] serde_json::Error),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("manifest record for document {pk} does not refer to an exported file")]
    MissingFileKey { pk: i32 },
    #[error("manifest record for document {pk} refers to {file}, which is not in the source directory")]
    MissingManifestReference { pk: i32, file: String },
    #[error("manifest record for document {pk} names {file}, which is not a plain file name")]
    InvalidManifestReference { pk: i32, file: String },
    #[error("refusing to overwrite {} while importing document {pk}", .path.display())]
    DestinationCollision { pk: i32, path: PathBuf },
    #[error("failed to copy {} to {} for document {pk}: {source}", .from.display(), .to.display())]
    Copy {
        pk: i32,
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to prepare storage directories: {0}")]
    Storage(#[source] io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ImportResult<T> = Result<T, ImportError>;
