//! Output directory management
//!
//! Every fetched segment maps to exactly one document file whose name is a
//! pure function of the descriptor. Documents are written once, through a
//! hidden temp file that is renamed into place, so a reader never sees a
//! partially written document.

use crate::error::{Error, Result};
use crate::types::SegmentDescriptor;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

/// Extension of finished documents
pub const DOCUMENT_EXTENSION: &str = "txt";

#[allow(clippy::expect_used)]
static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w]+").expect("literal pattern compiles"));

/// Result of [`OutputStore::write_document`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The document was created
    Written,
    /// A document with the same name already existed and was left untouched
    AlreadyPresent,
}

/// Document file name for a segment
///
/// Runs of non-word characters in the archive filename collapse to a single
/// `_`, followed by `--{offset}-{offset_end}.txt`.
///
/// ```
/// use warc_harvest::storage::document_name;
/// use warc_harvest::SegmentDescriptor;
///
/// let descriptor = SegmentDescriptor {
///     filename: "crawl-data/seg/warc/a.warc.gz".to_string(),
///     offset: 100,
///     length: 50,
///     mime_detected: "text/html".to_string(),
///     http_status: "200".to_string(),
///     language: "eng".to_string(),
/// };
/// assert_eq!(document_name(&descriptor), "crawl_data_seg_warc_a_warc_gz--100-149.txt");
/// ```
pub fn document_name(descriptor: &SegmentDescriptor) -> String {
    format!(
        "{}--{}-{}.{}",
        NON_WORD.replace_all(&descriptor.filename, "_"),
        descriptor.offset,
        descriptor.offset_end(),
        DOCUMENT_EXTENSION
    )
}

fn is_document(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(true);
    !hidden
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(DOCUMENT_EXTENSION))
}

/// Write-once document store rooted at the output directory
#[derive(Clone, Debug)]
pub struct OutputStore {
    dir: PathBuf,
}

impl OutputStore {
    /// Store rooted at `dir` (not created until [`ensure_dir`](Self::ensure_dir))
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of the document for `descriptor`
    pub fn path_for(&self, descriptor: &SegmentDescriptor) -> PathBuf {
        self.dir.join(document_name(descriptor))
    }

    /// Create the output directory and any missing parents
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| Error::PathIo {
                path: self.dir.clone(),
                source,
            })
    }

    /// Whether a finished document exists for `descriptor`
    pub async fn exists(&self, descriptor: &SegmentDescriptor) -> Result<bool> {
        let path = self.path_for(descriptor);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|source| document_error(path, source))
    }

    /// Persist `content` as the document for `descriptor`
    ///
    /// Existing documents are never overwritten. Two concurrent writers of the
    /// same descriptor each use their own temp file; the last rename wins and
    /// both carry identical content.
    pub async fn write_document(
        &self,
        descriptor: &SegmentDescriptor,
        content: &str,
    ) -> Result<WriteOutcome> {
        let name = document_name(descriptor);
        let path = self.dir.join(&name);

        if tokio::fs::try_exists(&path)
            .await
            .map_err(|source| document_error(path.clone(), source))?
        {
            debug!(path = %path.display(), "document already present");
            return Ok(WriteOutcome::AlreadyPresent);
        }

        let temp = self
            .dir
            .join(format!(".{}.{:016x}.tmp", name, rand::random::<u64>()));

        if let Err(source) = tokio::fs::write(&temp, content.as_bytes()).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(document_error(temp, source));
        }

        if let Err(source) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(document_error(path, source));
        }

        debug!(path = %path.display(), bytes = content.len(), "document written");
        Ok(WriteOutcome::Written)
    }

    /// Finished documents in the directory, sorted by name
    ///
    /// Hidden files (including in-progress temp files) are excluded.
    pub async fn list_documents(&self) -> Result<Vec<PathBuf>> {
        list_documents(&self.dir).await
    }

    /// Number of finished documents in the directory
    pub async fn count_documents(&self) -> Result<usize> {
        Ok(self.list_documents().await?.len())
    }
}

/// Errors caused by a document's own name stay with that document; anything
/// else about the directory is fatal
fn document_error(path: PathBuf, source: std::io::Error) -> Error {
    match source.kind() {
        std::io::ErrorKind::InvalidFilename | std::io::ErrorKind::InvalidInput => {
            Error::InvalidDocumentName { path, source }
        }
        _ => Error::PathIo { path, source },
    }
}

/// Finished documents in `dir`, sorted by name
pub(crate) async fn list_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|source| Error::PathIo {
            path: dir.to_path_buf(),
            source,
        })?;

    let mut documents = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|source| Error::PathIo {
        path: dir.to_path_buf(),
        source,
    })? {
        let path = entry.path();
        let file_type = entry.file_type().await.map_err(|source| Error::PathIo {
            path: path.clone(),
            source,
        })?;
        if file_type.is_file() && is_document(&path) {
            documents.push(path);
        }
    }

    documents.sort();
    Ok(documents)
}
