//! Plain text extractor

use std::path::Path;

use crate::error::{Result, VellumError};
use crate::extract::Extractor;
use crate::types::{ExtractionResult, FileMetadata};

/// Extractor for plain text files. The whole file becomes a single page
/// so the data contract stays aligned with paginated formats.
pub struct TxtExtractor;

impl Extractor for TxtExtractor {
    fn extract(&self, path: &Path, _extract_images: bool) -> Result<ExtractionResult> {
        let bytes = std::fs::read(path).map_err(|error| VellumError::ExtractorFailure {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;
        let text = String::from_utf8_lossy(&bytes).to_string();

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(ExtractionResult {
            content: vec![text],
            images: None,
            metadata: FileMetadata::new(file_name, "txt"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_extracts_single_page() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "Hello world.").unwrap();

        let result = TxtExtractor.extract(&path, false).unwrap();
        assert_eq!(result.content, vec!["Hello world."]);
        assert!(result.images.is_none());
        assert_eq!(result.metadata.file_name, "a.txt");
        assert_eq!(result.metadata.file_type, "txt");
        assert!(result.metadata.pdf.is_none());
    }

    #[test]
    fn test_non_utf8_is_lossy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latin.txt");
        fs::write(&path, [0x68, 0x6f, 0x6c, 0x61, 0xff]).unwrap();

        let result = TxtExtractor.extract(&path, false).unwrap();
        assert!(result.content[0].starts_with("hola"));
    }
}
