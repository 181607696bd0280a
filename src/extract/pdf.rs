//! PDF extractor
//!
//! Text-only: `pdf-extract` renders page texts separated by form feeds.
//! Image payloads are not available through this parser, so `images` stays
//! `None`; richer extractors feed the same data contract with `ImageData`.

use std::path::Path;

use crate::chunking::{ChapterPolicy, HeadingPolicy};
use crate::error::{Result, VellumError};
use crate::extract::Extractor;
use crate::types::{ExtractionResult, FileMetadata, PdfMetadata};

pub struct PdfExtractor;

impl PdfExtractor {
    fn detect_chapters(pages: &[String]) -> bool {
        let policy = HeadingPolicy;
        pages
            .iter()
            .flat_map(|page| page.lines())
            .any(|line| policy.is_chapter_start(line))
    }
}

impl Extractor for PdfExtractor {
    fn extract(&self, path: &Path, _extract_images: bool) -> Result<ExtractionResult> {
        let text =
            pdf_extract::extract_text(path).map_err(|error| VellumError::ExtractorFailure {
                path: path.to_path_buf(),
                message: error.to_string(),
            })?;

        // pdf-extract separates pages with form feeds
        let pages: Vec<String> = if text.contains('\x0C') {
            text.split('\x0C').map(|page| page.to_string()).collect()
        } else {
            vec![text]
        };

        if pages.iter().all(|page| page.trim().is_empty()) {
            return Err(VellumError::ExtractorFailure {
                path: path.to_path_buf(),
                message: "no text extracted from PDF".to_string(),
            });
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        let metadata = FileMetadata {
            file_name,
            file_type: "pdf".to_string(),
            pdf: Some(PdfMetadata {
                total_pages: pages.len() as u32,
                total_images: 0,
                has_chapters: Self::detect_chapters(&pages),
            }),
        };

        Ok(ExtractionResult {
            content: pages,
            images: None,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_invalid_pdf_is_extractor_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"definitely not a pdf").unwrap();

        let err = PdfExtractor.extract(&path, false).unwrap_err();
        assert!(matches!(err, VellumError::ExtractorFailure { .. }));
    }

    #[test]
    fn test_chapter_detection_over_pages() {
        let with = vec!["intro".to_string(), "Capítulo I\nbody".to_string()];
        assert!(PdfExtractor::detect_chapters(&with));

        let without = vec!["intro".to_string(), "more body".to_string()];
        assert!(!PdfExtractor::detect_chapters(&without));
    }
}
