//! Finding document files in an input directory by file-name prefix.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use gstcheck_recon::{Corpus, Dataset, DocumentKind, GstConfig};

use crate::error::IoError;

/// Extensions the loaders understand, lowercase.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "tsv", "json", "xlsx", "xls", "xlsb", "ods"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Delimited,
    Json,
    Spreadsheet,
}

impl Format {
    pub fn of(path: &Path) -> Option<Format> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "tsv" => Some(Format::Delimited),
            "json" => Some(Format::Json),
            "xlsx" | "xls" | "xlsb" | "ods" => Some(Format::Spreadsheet),
            _ => None,
        }
    }
}

/// Load one file, choosing the loader by extension.
pub fn load_file(path: &Path) -> Result<Dataset, IoError> {
    match Format::of(path) {
        Some(Format::Delimited) => crate::csv::load(path),
        Some(Format::Json) => crate::json::load(path),
        Some(Format::Spreadsheet) => crate::xlsx::load(path),
        None => Err(IoError::Unsupported {
            path: path.to_path_buf(),
        }),
    }
}

/// The document kind whose prefix starts `file_name` (case-insensitive).
/// When several prefixes match, the longest wins.
pub fn classify(file_name: &str, config: &GstConfig) -> Option<DocumentKind> {
    let name = file_name.to_lowercase();
    DocumentKind::ALL
        .iter()
        .copied()
        .map(|kind| (kind, config.prefix(kind).to_lowercase()))
        .filter(|(_, prefix)| name.starts_with(prefix.as_str()))
        .max_by_key(|(_, prefix)| prefix.len())
        .map(|(kind, _)| kind)
}

/// Map each document kind to the file that supplies it. Files are visited
/// in name order; a later file for the same kind replaces an earlier one.
pub fn discover(dir: &Path, config: &GstConfig) -> Result<BTreeMap<DocumentKind, PathBuf>, IoError> {
    let read_err = |source| IoError::Read {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(read_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_err)?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && Format::of(p).is_some())
        .collect();
    paths.sort();

    let mut found: BTreeMap<DocumentKind, PathBuf> = BTreeMap::new();
    for path in paths {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(kind) = classify(name, config) else {
            tracing::debug!(file = %path.display(), "no document prefix matches, ignored");
            continue;
        };
        if let Some(previous) = found.insert(kind, path.clone()) {
            tracing::warn!(
                kind = kind.as_str(),
                replaced = %previous.display(),
                by = %path.display(),
                "several files for one document kind, using the last"
            );
        }
    }
    Ok(found)
}

/// Everything loaded from an input directory.
#[derive(Debug, Default)]
pub struct LoadedCorpus {
    pub corpus: Corpus,
    /// The file each loaded document came from.
    pub files: BTreeMap<DocumentKind, PathBuf>,
    /// Files that matched a prefix but could not be loaded.
    pub failures: Vec<IoError>,
}

/// Discover and load every document in `dir`. A file that fails to load is
/// recorded and the rest still load; only an unreadable directory is an error.
pub fn load_corpus(dir: &Path, config: &GstConfig) -> Result<LoadedCorpus, IoError> {
    let mut loaded = LoadedCorpus::default();
    for (kind, path) in discover(dir, config)? {
        match load_file(&path) {
            Ok(ds) => {
                tracing::info!(kind = kind.as_str(), file = %path.display(), rows = ds.len(), "loaded");
                loaded.corpus.insert(kind, ds);
                loaded.files.insert(kind, path);
            }
            Err(e) => {
                tracing::warn!(kind = kind.as_str(), error = %e, "failed to load");
                loaded.failures.push(e);
            }
        }
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_classify_longest_prefix() {
        let config = GstConfig::default();
        assert_eq!(classify("GSTR2B_April.csv", &config), Some(DocumentKind::Gstr2b));
        assert_eq!(classify("export_invoice_q1.xlsx", &config), Some(DocumentKind::ExportInvoice));
        assert_eq!(classify("invoice_q1.xlsx", &config), Some(DocumentKind::Invoice));
        assert_eq!(classify("notes.csv", &config), None);

        let config = GstConfig::from_toml("[file_prefixes]\ninvoice = \"inv\"\nexport_invoice = \"inv_exp\"\n").unwrap();
        assert_eq!(classify("inv_exp_1.csv", &config), Some(DocumentKind::ExportInvoice));
        assert_eq!(classify("inv_1.csv", &config), Some(DocumentKind::Invoice));
    }

    #[test]
    fn test_discover_later_file_wins() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("gstr1_a.csv"), "x\n1\n").unwrap();
        fs::write(dir.path().join("gstr1_b.csv"), "x\n2\n").unwrap();
        fs::write(dir.path().join("gstr1_c.txt"), "x\n3\n").unwrap();
        fs::write(dir.path().join("readme.md"), "hi").unwrap();

        let found = discover(dir.path(), &GstConfig::default()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[&DocumentKind::Gstr1], dir.path().join("gstr1_b.csv"));
    }

    #[test]
    fn test_load_corpus_collects_failures() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("gstr1.csv"), "taxable_value\n100\n").unwrap();
        fs::write(dir.path().join("gstr3b.json"), "{broken").unwrap();

        let loaded = load_corpus(dir.path(), &GstConfig::default()).unwrap();
        assert_eq!(loaded.corpus.len(), 1);
        assert!(loaded.corpus.get(DocumentKind::Gstr1).is_some());
        assert_eq!(loaded.failures.len(), 1);
        assert!(matches!(loaded.failures[0], IoError::Json { .. }));
    }

    #[test]
    fn test_missing_directory() {
        assert!(discover(Path::new("/nonexistent/dir"), &GstConfig::default()).is_err());
    }
}
