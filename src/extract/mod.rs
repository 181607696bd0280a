//! Extraction façade
//!
//! Turns source files into [`ExtractionResult`]s. The supported formats
//! form a closed set keyed by lowercase extension; unsupported types fail
//! fast with a typed error. Folder extraction fans out one worker per file
//! and collects failures instead of aborting the batch.

#[cfg(feature = "pdf")]
mod pdf;
mod txt;

#[cfg(feature = "pdf")]
pub use pdf::PdfExtractor;
pub use txt::TxtExtractor;

use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};

use crate::error::{Result, VellumError};
use crate::types::ExtractionResult;

/// Format-specific extractor
pub trait Extractor: Send + Sync {
    /// Extract content (and optionally images) from the file at `path`
    fn extract(&self, path: &Path, extract_images: bool) -> Result<ExtractionResult>;
}

/// Lowercase extensions with a registered extractor
pub fn supported_extensions() -> Vec<&'static str> {
    let mut extensions = vec!["txt"];
    if cfg!(feature = "pdf") {
        extensions.push("pdf");
    }
    extensions
}

/// Closed extractor registry keyed by lowercase extension
pub fn extractor_for(extension: &str) -> Result<Box<dyn Extractor>> {
    match extension {
        "txt" => Ok(Box::new(TxtExtractor)),
        #[cfg(feature = "pdf")]
        "pdf" => Ok(Box::new(PdfExtractor)),
        _ => Err(VellumError::UnsupportedType(extension.to_string())),
    }
}

/// Extraction results for a folder; failed files never abort the batch
#[derive(Debug)]
pub struct FolderExtraction {
    pub succeeded: Vec<(PathBuf, ExtractionResult)>,
    pub failed: Vec<(PathBuf, VellumError)>,
}

/// Façade over the extractor registry
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractionManager;

impl ExtractionManager {
    pub fn new() -> Self {
        Self
    }

    /// Supported files directly inside `folder`, sorted by name
    pub fn list_files(&self, folder: &Path) -> Result<Vec<PathBuf>> {
        if !folder.exists() {
            return Err(VellumError::FileNotFound(folder.to_path_buf()));
        }
        if !folder.is_dir() {
            return Err(VellumError::InvalidInput(format!(
                "path is not a directory: {}",
                folder.display()
            )));
        }

        let supported = supported_extensions();
        let mut files: Vec<PathBuf> = std::fs::read_dir(folder)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && extension_of(path)
                        .map(|ext| supported.contains(&ext.as_str()))
                        .unwrap_or(false)
            })
            .collect();
        files.sort();

        tracing::debug!(folder = %folder.display(), files = files.len(), "listed supported files");
        Ok(files)
    }

    /// Files directly inside `folder` with the given extension
    pub fn list_files_by_extension(&self, folder: &Path, extension: &str) -> Result<Vec<PathBuf>> {
        let wanted = extension.trim_start_matches('.').to_lowercase();
        Ok(self
            .list_files(folder)?
            .into_iter()
            .filter(|path| extension_of(path).as_deref() == Some(wanted.as_str()))
            .collect())
    }

    /// Extract a single file through the registry
    pub fn extract_file(&self, path: &Path, extract_images: bool) -> Result<ExtractionResult> {
        if !path.exists() {
            return Err(VellumError::FileNotFound(path.to_path_buf()));
        }
        if !path.is_file() {
            return Err(VellumError::NotAFile(path.to_path_buf()));
        }

        let extension = extension_of(path)
            .ok_or_else(|| VellumError::UnsupportedType(path.display().to_string()))?;
        let extractor = extractor_for(&extension)?;

        let result = extractor.extract(path, extract_images)?;
        result.validate()?;

        // Worker results cross task boundaries as structured data, not raw
        // memory; the same round-trip keeps single-file extraction honest.
        let intermediate = serde_json::to_value(&result)?;
        let result: ExtractionResult = serde_json::from_value(intermediate)?;

        tracing::info!(
            path = %path.display(),
            pages = result.page_count(),
            images = result.image_count(),
            "file extracted"
        );
        Ok(result)
    }

    /// Extract every supported file in `folder`, one blocking worker per
    /// file, bounded by `max_workers` (defaults to available parallelism).
    pub async fn extract_folder(
        &self,
        folder: &Path,
        extract_images: bool,
        max_workers: Option<usize>,
    ) -> Result<FolderExtraction> {
        let files = self.list_files(folder)?;
        let workers = max_workers.unwrap_or_else(available_parallelism).max(1);

        tracing::info!(
            folder = %folder.display(),
            files = files.len(),
            workers,
            "starting folder extraction"
        );

        let manager = *self;
        let outcomes: Vec<(PathBuf, Result<ExtractionResult>)> =
            stream::iter(files.into_iter().map(|path| {
                let worker_path = path.clone();
                async move {
                    let result = tokio::task::spawn_blocking(move || {
                        manager.extract_file(&worker_path, extract_images)
                    })
                    .await
                    .map_err(|join_error| VellumError::ExtractorFailure {
                        path: path.clone(),
                        message: join_error.to_string(),
                    })
                    .and_then(|inner| inner);
                    (path, result)
                }
            }))
            .buffer_unordered(workers)
            .collect()
            .await;

        let mut extraction = FolderExtraction {
            succeeded: Vec::new(),
            failed: Vec::new(),
        };
        for (path, outcome) in outcomes {
            match outcome {
                Ok(result) => extraction.succeeded.push((path, result)),
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "file extraction failed");
                    extraction.failed.push((path, error));
                }
            }
        }
        extraction.succeeded.sort_by(|a, b| a.0.cmp(&b.0));
        extraction.failed.sort_by(|a, b| a.0.cmp(&b.0));

        tracing::info!(
            succeeded = extraction.succeeded.len(),
            failed = extraction.failed.len(),
            "folder extraction completed"
        );
        Ok(extraction)
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_registry_is_closed() {
        assert!(extractor_for("txt").is_ok());
        assert!(matches!(
            extractor_for("docx"),
            Err(VellumError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = ExtractionManager::new()
            .extract_file(Path::new("/definitely/not/here.txt"), false)
            .unwrap_err();
        assert!(matches!(err, VellumError::FileNotFound(_)));
    }

    #[test]
    fn test_directory_is_not_a_file() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("sub.txt");
        fs::create_dir(&nested).unwrap();

        let err = ExtractionManager::new()
            .extract_file(&nested, false)
            .unwrap_err();
        assert!(matches!(err, VellumError::NotAFile(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.docx");
        fs::write(&path, "hello").unwrap();

        let err = ExtractionManager::new().extract_file(&path, false).unwrap_err();
        assert!(matches!(err, VellumError::UnsupportedType(_)));
    }

    #[test]
    fn test_list_files_filters_and_sorts() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("skip.docx"), "x").unwrap();

        let files = ExtractionManager::new().list_files(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_list_files_by_extension() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();

        let manager = ExtractionManager::new();
        assert_eq!(
            manager
                .list_files_by_extension(dir.path(), ".TXT")
                .unwrap()
                .len(),
            1
        );
        assert!(manager
            .list_files_by_extension(dir.path(), "pdf")
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_folder_extraction_collects_results() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("one.txt"), "first file").unwrap();
        fs::write(dir.path().join("two.txt"), "second file").unwrap();

        let extraction = ExtractionManager::new()
            .extract_folder(dir.path(), false, Some(2))
            .await
            .unwrap();
        assert_eq!(extraction.succeeded.len(), 2);
        assert!(extraction.failed.is_empty());
        assert_eq!(extraction.succeeded[0].1.content, vec!["first file"]);
    }

    #[cfg(feature = "pdf")]
    #[tokio::test]
    async fn test_folder_extraction_reports_failures_without_aborting() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("good.txt"), "fine").unwrap();
        fs::write(dir.path().join("broken.pdf"), b"not a pdf at all").unwrap();

        let extraction = ExtractionManager::new()
            .extract_folder(dir.path(), false, None)
            .await
            .unwrap();
        assert_eq!(extraction.succeeded.len(), 1);
        assert_eq!(extraction.failed.len(), 1);
        assert!(matches!(
            extraction.failed[0].1,
            VellumError::ExtractorFailure { .. }
        ));
    }
}
