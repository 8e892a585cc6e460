//! Corpus compaction
//!
//! Folds a directory of harvested documents into a few large shard files for
//! downstream tooling. Each document is cleaned on the way: short lines are
//! dropped and repeated lines within the document keep only their first
//! occurrence. Documents left empty are not written at all.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::storage;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Counts from one compaction
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompactionReport {
    /// Documents found in the input directory
    pub documents_read: usize,
    /// Documents with at least one surviving line
    pub documents_kept: usize,
    /// Lines written across all shards
    pub lines_kept: usize,
    /// Repeated lines removed within documents
    pub duplicate_lines: usize,
    /// Shard files written, in order
    pub shards: Vec<PathBuf>,
}

/// Packs harvested documents into fixed-size shards
#[derive(Clone, Debug)]
pub struct CorpusCompactor {
    min_line_chars: usize,
    docs_per_shard: usize,
}

impl CorpusCompactor {
    /// Compactor keeping lines of at least `min_line_chars` characters and
    /// writing `docs_per_shard` documents per shard
    pub fn new(min_line_chars: usize, docs_per_shard: usize) -> Self {
        Self {
            min_line_chars,
            docs_per_shard,
        }
    }

    /// Compactor using the extraction and corpus settings of `config`
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.extraction.min_line_chars,
            config.corpus.docs_per_shard,
        )
    }

    /// Clean one document
    ///
    /// Returns the surviving lines joined by `'\n'` (no trailing newline) and
    /// the number of duplicate lines removed.
    ///
    /// ```
    /// use warc_harvest::CorpusCompactor;
    ///
    /// let compactor = CorpusCompactor::new(3, 1000);
    /// let (text, dupes) = compactor.compact_document("abc\nxy\nabc\ndef\n");
    /// assert_eq!(text, "abc\ndef");
    /// assert_eq!(dupes, 1);
    /// ```
    pub fn compact_document(&self, text: &str) -> (String, usize) {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        let mut duplicates = 0;

        for line in text.lines().map(str::trim) {
            if line.chars().count() < self.min_line_chars {
                continue;
            }
            if seen.insert(line) {
                kept.push(line);
            } else {
                duplicates += 1;
            }
        }

        (kept.join("\n"), duplicates)
    }

    /// Compact every finished document in `input_dir` into
    /// `{output_prefix}-{n}.txt` shards
    ///
    /// Documents are read in file-name order. Each shard holds up to
    /// `docs_per_shard` documents, each terminated by `'\n'`. Documents that
    /// are not valid UTF-8 are an error.
    pub async fn compact(&self, input_dir: &Path, output_prefix: &Path) -> Result<CompactionReport> {
        if self.docs_per_shard == 0 {
            return Err(Error::config("corpus.docs_per_shard", "must be at least 1"));
        }

        let documents = storage::list_documents(input_dir).await?;
        let mut report = CompactionReport {
            documents_read: documents.len(),
            ..Default::default()
        };

        if let Some(parent) = output_prefix.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| Error::PathIo {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let mut shard = String::new();
        let mut in_shard = 0;

        for path in &documents {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|source| Error::PathIo {
                    path: path.clone(),
                    source,
                })?;

            let (cleaned, duplicates) = self.compact_document(&text);
            report.duplicate_lines += duplicates;
            if cleaned.is_empty() {
                debug!(path = %path.display(), "document empty after cleaning");
                continue;
            }

            report.documents_kept += 1;
            report.lines_kept += cleaned.lines().count();
            shard.push_str(&cleaned);
            shard.push('\n');
            in_shard += 1;

            if in_shard == self.docs_per_shard {
                let path = self.write_shard(output_prefix, report.shards.len(), &shard, in_shard).await?;
                report.shards.push(path);
                shard.clear();
                in_shard = 0;
            }
        }

        if in_shard > 0 {
            let path = self.write_shard(output_prefix, report.shards.len(), &shard, in_shard).await?;
            report.shards.push(path);
        }

        info!(
            documents = report.documents_read,
            kept = report.documents_kept,
            shards = report.shards.len(),
            "corpus compacted"
        );
        Ok(report)
    }

    async fn write_shard(
        &self,
        prefix: &Path,
        index: usize,
        content: &str,
        documents: usize,
    ) -> Result<PathBuf> {
        let path = shard_path(prefix, index);
        tokio::fs::write(&path, content)
            .await
            .map_err(|source| Error::PathIo {
                path: path.clone(),
                source,
            })?;
        info!(shard = %path.display(), documents, "shard written");
        Ok(path)
    }
}

/// `{prefix}-{index}.txt`
fn shard_path(prefix: &Path, index: usize) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(format!("-{}.txt", index));
    PathBuf::from(name)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const A: &str = "Alpha line that is comfortably longer than fifty characters in total";
    const B: &str = "Bravo line that is comfortably longer than fifty characters in total";
    const C: &str = "Charlie line that is comfortably longer than fifty characters, too";

    #[test]
    fn test_compact_document_filters_and_dedupes() {
        let compactor = CorpusCompactor::new(50, 1000);
        let text = format!("{A}\nshort nav\n{B}\n  {A}  \n\n{C}\n{B}\n");
        let (cleaned, dupes) = compactor.compact_document(&text);
        assert_eq!(cleaned, format!("{A}\n{B}\n{C}"));
        assert_eq!(dupes, 2);
    }

    #[test]
    fn test_shard_path() {
        assert_eq!(
            shard_path(Path::new("/data/corpus"), 3),
            PathBuf::from("/data/corpus-3.txt")
        );
    }

    #[tokio::test]
    async fn test_compact_writes_shards_in_order() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();

        for (name, body) in [
            ("a--0-9.txt", format!("{A}\n{A}\n")),
            ("b--0-9.txt", "too short\n".to_string()),
            ("c--0-9.txt", format!("{B}\n")),
            ("d--0-9.txt", format!("{C}\n")),
            (".e--0-9.txt.123.tmp", format!("{C}\n")),
        ] {
            tokio::fs::write(input.path().join(name), body).await.unwrap();
        }

        let prefix = output.path().join("nested").join("cc");
        let report = CorpusCompactor::new(50, 2)
            .compact(input.path(), &prefix)
            .await
            .unwrap();

        assert_eq!(report.documents_read, 4);
        assert_eq!(report.documents_kept, 3);
        assert_eq!(report.lines_kept, 3);
        assert_eq!(report.duplicate_lines, 1);
        assert_eq!(report.shards.len(), 2);

        let first = tokio::fs::read_to_string(&report.shards[0]).await.unwrap();
        assert_eq!(first, format!("{A}\n{B}\n"));
        let second = tokio::fs::read_to_string(&report.shards[1]).await.unwrap();
        assert_eq!(second, format!("{C}\n"));
        assert!(report.shards[1].ends_with("cc-1.txt"));
    }

    #[tokio::test]
    async fn test_empty_input_writes_nothing() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        let report = CorpusCompactor::new(50, 10)
            .compact(input.path(), &output.path().join("cc"))
            .await
            .unwrap();
        assert_eq!(report, CompactionReport::default());
    }

    #[tokio::test]
    async fn test_zero_docs_per_shard_rejected() {
        let input = tempdir().unwrap();
        let err = CorpusCompactor::new(50, 0)
            .compact(input.path(), &input.path().join("cc"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
