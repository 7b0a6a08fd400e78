//! Directory loader for knowledge-base documents.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{KbError, Result};

use super::frontmatter::{DocMetadata, parse_metadata, split_front_matter};

/// A parsed knowledge-base document: metadata plus the body with the
/// front-matter block already removed.
#[derive(Debug, Clone)]
pub struct KbDocument {
    /// Parsed front-matter metadata.
    pub metadata: DocMetadata,
    /// Document body. Never contains the front-matter delimiter block.
    pub body: String,
    /// Source file, for diagnostics.
    pub path: PathBuf,
}

/// Outcome of loading a directory tree.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Documents that parsed cleanly.
    pub documents: Vec<KbDocument>,
    /// Files skipped because no front-matter block was recognised.
    pub skipped: Vec<PathBuf>,
    /// Files rejected for malformed or missing metadata. The rest of the
    /// run is unaffected.
    pub failed: Vec<KbError>,
}

/// Loads every regular file under `root` (recursively) as a knowledge-base
/// document.
///
/// Files without a front-matter block are skipped with a warning; files
/// whose metadata fails validation are recorded in [`LoadReport::failed`]
/// and ingestion continues.
///
/// # Errors
///
/// Returns an error only when the directory tree itself cannot be read.
pub fn load_directory(root: &Path) -> Result<LoadReport> {
    let mut report = LoadReport::default();
    let mut files = Vec::new();
    collect_files(root, &mut files)?;
    files.sort();

    for path in files {
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                report.failed.push(KbError::ReadFailed {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let Some((yaml, body)) = split_front_matter(&raw) else {
            warn!(path = %path.display(), "no front-matter block, skipping file");
            report.skipped.push(path);
            continue;
        };

        match parse_metadata(&path, yaml) {
            Ok(metadata) => report.documents.push(KbDocument {
                metadata,
                body: body.trim().to_string(),
                path,
            }),
            Err(e) => {
                warn!(error = %e, "rejected knowledge-base file");
                report.failed.push(e);
            }
        }
    }

    Ok(report)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| KbError::ReadFailed {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| KbError::ReadFailed {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn write_file(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap_or_else(|e| panic!("write failed: {e}"));
    }

    const GOOD: &str = "---\ndoc_id: SLA_001\ntype: sla\ncategory: Maintenance\nbuilding_id: all_buildings\nversion: 1.2.0\neffective_date: 2025-02-01\nlast_updated: 2025-05-01\n---\nEmergency HVAC response within 4 hours.\n";

    #[test]
    fn test_load_directory_mixed() {
        let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        write_file(tmp.path(), "sla_001.md", GOOD);
        write_file(tmp.path(), "notes.txt", "no metadata here\n");
        write_file(
            tmp.path(),
            "broken.md",
            "---\ntype: policy\ncategory: Billing\nbuilding_id: B1\nversion: 1.0.0\n---\nbody\n",
        );

        let report = load_directory(tmp.path()).unwrap_or_else(|e| panic!("load failed: {e}"));
        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.failed.len(), 1);

        let doc = &report.documents[0];
        assert_eq!(doc.metadata.doc_id, "SLA_001");
        assert_eq!(doc.body, "Emergency HVAC response within 4 hours.");
        assert!(matches!(
            report.failed[0],
            KbError::MissingMetadata { ref field, .. } if field == "doc_id"
        ));
    }

    #[test]
    fn test_load_directory_recursive() {
        let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
        let nested = tmp.path().join("policies");
        std::fs::create_dir(&nested).unwrap_or_else(|e| panic!("mkdir failed: {e}"));
        write_file(&nested, "sla_001.md", GOOD);

        let report = load_directory(tmp.path()).unwrap_or_else(|e| panic!("load failed: {e}"));
        assert_eq!(report.documents.len(), 1);
    }

    #[test]
    fn test_load_missing_directory_errors() {
        let result = load_directory(Path::new("/nonexistent/kb/path"));
        assert!(result.is_err());
    }
}
