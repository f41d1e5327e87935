use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Archive renditions are always PDF, whatever the original was.
pub const ARCHIVE_EXTENSION: &str = "pdf";
pub const ENCRYPTED_SUFFIX: &str = ".gpg";
pub const THUMBNAIL_SUFFIX: &str = "-thumbnail.png";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tree {
    Originals,
    Thumbnails,
    Archive,
}

impl Tree {
    /// Order in which relocations are applied. Originals go first so permission problems
    /// surface before anything else has moved.
    pub const RELOCATION_ORDER: [Tree; 3] = [Tree::Originals, Tree::Thumbnails, Tree::Archive];

    pub fn as_str(self) -> &'static str {
        match self {
            Tree::Originals => "originals",
            Tree::Thumbnails => "thumbnails",
            Tree::Archive => "archive",
        }
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRoots {
    pub originals: PathBuf,
    pub archive: PathBuf,
    pub thumbnails: PathBuf,
}

impl StorageRoots {
    pub fn new(
        originals: impl Into<PathBuf>,
        archive: impl Into<PathBuf>,
        thumbnails: impl Into<PathBuf>,
    ) -> Self {
        Self {
            originals: originals.into(),
            archive: archive.into(),
            thumbnails: thumbnails.into(),
        }
    }

    /// Lays the three trees out beneath a single media directory.
    pub fn under_media_root(media_root: &Path) -> Self {
        let documents = media_root.join("documents");
        Self::new(
            documents.join("originals"),
            documents.join("archive"),
            documents.join("thumbnails"),
        )
    }

    pub fn root(&self, tree: Tree) -> &Path {
        match tree {
            Tree::Originals => &self.originals,
            Tree::Thumbnails => &self.thumbnails,
            Tree::Archive => &self.archive,
        }
    }

    pub fn ensure_exist(&self) -> io::Result<()> {
        for tree in Tree::RELOCATION_ORDER {
            fs::create_dir_all(self.root(tree))?;
        }
        Ok(())
    }
}

/// Location of a document relative to any of the storage roots.
///
/// `stem` holds the directory part and the leaf name without extension, joined with `/`.
/// The three trees share the stem and differ only in how the leaf is finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPath {
    stem: String,
    extension: String,
    encrypted: bool,
}

impl DocumentPath {
    pub fn new(stem: impl Into<String>, extension: impl Into<String>, encrypted: bool) -> Self {
        Self {
            stem: stem.into(),
            extension: extension.into(),
            encrypted,
        }
    }

    /// Splits a stored `filename` back into stem, extension and encryption marker.
    pub fn parse(filename: &str) -> Self {
        let (rest, encrypted) = match filename.strip_suffix(ENCRYPTED_SUFFIX) {
            Some(rest) => (rest, true),
            None => (filename, false),
        };

        let leaf_start = rest.rfind('/').map(|idx| idx + 1).unwrap_or(0);
        match rest[leaf_start..].rfind('.') {
            Some(dot) if dot > 0 => {
                let split = leaf_start + dot;
                Self::new(&rest[..split], &rest[split + 1..], encrypted)
            }
            _ => Self::new(rest, "", encrypted),
        }
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Same location with `_NN` appended to the stem, used to step around a path that
    /// already belongs to another document.
    pub fn with_counter(&self, counter: u32) -> Self {
        Self::new(
            format!("{}_{counter:02}", self.stem),
            self.extension.clone(),
            self.encrypted,
        )
    }

    /// The value stored in `documents.filename`.
    pub fn filename(&self) -> String {
        self.relative(Tree::Originals)
    }

    pub fn relative(&self, tree: Tree) -> String {
        let mut name = match tree {
            Tree::Originals if self.extension.is_empty() => self.stem.clone(),
            Tree::Originals => format!("{}.{}", self.stem, self.extension),
            Tree::Archive => format!("{}.{ARCHIVE_EXTENSION}", self.stem),
            Tree::Thumbnails => format!("{}{THUMBNAIL_SUFFIX}", self.stem),
        };
        if self.encrypted {
            name.push_str(ENCRYPTED_SUFFIX);
        }
        name
    }

    pub fn under(&self, roots: &StorageRoots, tree: Tree) -> PathBuf {
        let mut path = roots.root(tree).to_path_buf();
        for segment in self.relative(tree).split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path
    }

    pub fn under_originals(&self, roots: &StorageRoots) -> PathBuf {
        self.under(roots, Tree::Originals)
    }

    pub fn under_archive(&self, roots: &StorageRoots) -> PathBuf {
        self.under(roots, Tree::Archive)
    }

    pub fn under_thumbnails(&self, roots: &StorageRoots) -> PathBuf {
        self.under(roots, Tree::Thumbnails)
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.filename())
    }
}
