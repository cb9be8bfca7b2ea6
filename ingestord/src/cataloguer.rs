//! Cataloguer: wraps the external tagging/import tool that turns a staged
//! folder into a cataloged library entry. The pipeline only needs to shell
//! out to it and interpret its exit status plus what's left on disk
//! afterward — the tool itself, and its configuration, is out of scope.

use ingest_common::dates;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// File counts after an import pass, used for the post-run log line and
/// for deciding whether `staging/failed_imports/` needs quarantining.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportStats {
    pub staging_remaining: usize,
    pub library_total: usize,
    pub failed_imports: usize,
}

pub struct Cataloguer {
    pub binary_path: String,
    pub import_log_path: String,
}

impl Cataloguer {
    pub fn new(binary_path: impl Into<String>, import_log_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            import_log_path: import_log_path.into(),
        }
    }

    /// Import every file currently under `staging_root` into the library.
    /// A no-op (not an error) if staging is empty.
    pub async fn run_import(&self, staging_root: &Path) -> anyhow::Result<()> {
        if !has_any_entry(staging_root) {
            tracing::debug!("staging area empty, skipping import");
            return Ok(());
        }

        let output = Command::new(&self.binary_path)
            .arg("import")
            .arg("--quiet")
            .arg(format!("--log={}", self.import_log_path))
            .arg(staging_root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            anyhow::bail!(
                "cataloguer import exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }

        let remaining = count_audio_files_excluding(staging_root, crate::paths::FAILED_IMPORTS_NAME);
        if remaining > 0 {
            tracing::warn!(
                remaining,
                "files still present in staging after import, check {}",
                self.import_log_path
            );
        }

        Ok(())
    }

    /// Scope `update`/`move` to material staged in roughly the last day,
    /// using a literal calendar date the cataloguer's query syntax accepts
    /// (a relative offset like `-24h` is not valid for this tool).
    pub async fn run_post_import(&self, library_root: &Path, staging_root: &Path) -> anyhow::Result<ImportStats> {
        let since = dates::as_query_literal(dates::days_ago(1));
        let date_query = format!("added:{since}..");

        for op in ["update", "move"] {
            let output = Command::new(&self.binary_path)
                .arg(op)
                .arg(&date_query)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .await;

            match output {
                Ok(output) if !output.status.success() => {
                    tracing::warn!(
                        op,
                        status = %output.status,
                        stderr = %String::from_utf8_lossy(&output.stderr),
                        "cataloguer post-import step failed"
                    );
                }
                Err(e) => {
                    tracing::warn!(op, error = %e, "cataloguer post-import step failed to launch");
                }
                Ok(_) => {}
            }
        }

        Ok(self.verify_import_success(library_root, staging_root))
    }

    /// Log and return file counts after an import: how many are still
    /// sitting in staging, how many landed in the library, and how many
    /// were rejected.
    pub fn verify_import_success(&self, library_root: &Path, staging_root: &Path) -> ImportStats {
        let stats = ImportStats {
            staging_remaining: count_audio_files_excluding(staging_root, crate::paths::FAILED_IMPORTS_NAME),
            library_total: count_audio_files(library_root),
            failed_imports: count_audio_files(&staging_root.join(crate::paths::FAILED_IMPORTS_NAME)),
        };

        tracing::info!(
            library_total = stats.library_total,
            staging_remaining = stats.staging_remaining,
            failed_imports = stats.failed_imports,
            "import statistics"
        );

        if stats.staging_remaining > 0 {
            tracing::warn!(
                count = stats.staging_remaining,
                "files remain in staging after import, check {}",
                self.import_log_path
            );
        }
        if stats.failed_imports > 0 {
            tracing::warn!(
                count = stats.failed_imports,
                "files in failed_imports, check {}",
                self.import_log_path
            );
        }

        stats
    }
}

fn has_any_entry(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

fn count_audio_files(root: &Path) -> usize {
    if !root.exists() {
        return 0;
    }
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && crate::paths::is_audio_file(e.path()))
        .count()
}

fn count_audio_files_excluding(root: &Path, excluded_component: &str) -> usize {
    if !root.exists() {
        return 0;
    }
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && crate::paths::is_audio_file(e.path()))
        .filter(|e| {
            !e.path()
                .components()
                .any(|c| c.as_os_str() == excluded_component)
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn counts_exclude_failed_imports_subtree() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.flac"), b"x").unwrap();
        let failed = dir.path().join("failed_imports");
        fs::create_dir_all(&failed).unwrap();
        fs::write(failed.join("b.flac"), b"y").unwrap();

        let total = count_audio_files(dir.path());
        let excluding_failed =
            count_audio_files_excluding(dir.path(), crate::paths::FAILED_IMPORTS_NAME);

        assert_eq!(total, 2);
        assert_eq!(excluding_failed, 1);
    }

    #[test]
    fn has_any_entry_is_false_for_empty_dir() {
        let dir = TempDir::new().unwrap();
        assert!(!has_any_entry(dir.path()));
        fs::write(dir.path().join("x"), b"1").unwrap();
        assert!(has_any_entry(dir.path()));
    }

    #[tokio::test]
    async fn run_import_is_noop_on_empty_staging() {
        let dir = TempDir::new().unwrap();
        let cataloguer = Cataloguer::new("beet", "/tmp/does-not-matter.log");
        cataloguer.run_import(dir.path()).await.unwrap();
    }
}
