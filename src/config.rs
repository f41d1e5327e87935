use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;
use crate::naming::NamingConfig;
use crate::paths::StorageRoots;

pub const DEFAULT_MEDIA_ROOT: &str = "./media";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub media_root: PathBuf,
    pub originals_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub thumbnail_dir: PathBuf,
    pub filename_format: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = match env::var("DATABASE_MAX_POOL_SIZE") {
            Ok(value) => value
                .parse()
                .context("DATABASE_MAX_POOL_SIZE must be a positive integer")?,
            Err(_) => DEFAULT_MAX_POOL_SIZE,
        };

        let media_root = env::var("MEDIA_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_MEDIA_ROOT));
        let defaults = StorageRoots::under_media_root(&media_root);
        let originals_dir = path_var("ORIGINALS_DIR").unwrap_or(defaults.originals);
        let archive_dir = path_var("ARCHIVE_DIR").unwrap_or(defaults.archive);
        let thumbnail_dir = path_var("THUMBNAIL_DIR").unwrap_or(defaults.thumbnails);

        let filename_format = env::var("FILENAME_FORMAT")
            .ok()
            .filter(|value| !value.trim().is_empty());

        Ok(Self {
            database_url,
            database_max_pool_size,
            media_root,
            originals_dir,
            archive_dir,
            thumbnail_dir,
            filename_format,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }

    pub fn storage_roots(&self) -> StorageRoots {
        StorageRoots::new(
            self.originals_dir.clone(),
            self.archive_dir.clone(),
            self.thumbnail_dir.clone(),
        )
    }

    pub fn naming(&self) -> NamingConfig {
        NamingConfig::new(self.filename_format.clone())
    }
}

fn path_var(name: &str) -> Option<PathBuf> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            let _ = parsed.set_password(Some("*****"));
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
