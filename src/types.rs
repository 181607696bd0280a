//! Core types for Vellum
//!
//! The extraction data model is the contract between format-specific
//! extractors and the ingestion pipeline. It serializes losslessly so
//! worker results can cross task boundaries as structured data.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VellumError};

/// A single image extracted from a document.
///
/// `image_number` counts images across the whole document in traversal
/// order; `image_number_in_page` restarts at 1 on every page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    /// Page the image appears on (1-based)
    pub page: u32,
    /// Image number within that page (1-based)
    pub image_number_in_page: u32,
    /// Document-wide image number (1-based, strictly monotonic)
    pub image_number: u32,
    /// Base64-encoded payload
    pub image_base64: String,
    /// Image format (png, jpeg, ...)
    pub image_format: String,
}

impl ImageData {
    /// Validate the positional fields and payload
    pub fn validate(&self) -> Result<()> {
        if self.page < 1 {
            return Err(VellumError::InvalidInput(
                "image page must be >= 1".to_string(),
            ));
        }
        if self.image_number < 1 || self.image_number_in_page < 1 {
            return Err(VellumError::InvalidInput(
                "image numbers must be >= 1".to_string(),
            ));
        }
        if self.image_base64.is_empty() {
            return Err(VellumError::InvalidInput(
                "image payload must not be empty".to_string(),
            ));
        }
        if self.image_format.is_empty() {
            return Err(VellumError::InvalidInput(
                "image format must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Render as a data URL. Payloads that already carry a `data:image/`
    /// prefix are passed through unchanged; bare base64 is wrapped as PNG.
    pub fn to_data_url(&self) -> String {
        wrap_data_url(&self.image_base64)
    }
}

/// Wrap a base64 payload as a data URL unless it already is one
pub fn wrap_data_url(payload: &str) -> String {
    if payload.starts_with("data:image/") {
        payload.to_string()
    } else {
        format!("data:image/png;base64,{}", payload)
    }
}

/// PDF-specific metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfMetadata {
    /// Total number of pages (>= 1)
    pub total_pages: u32,
    /// Total number of images in the document
    pub total_images: u32,
    /// Whether chapter headings were detected
    pub has_chapters: bool,
}

/// Metadata attached to an extraction result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Original file name
    pub file_name: String,
    /// Source type ("txt", "pdf", ...)
    pub file_type: String,
    /// Present only for PDF sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf: Option<PdfMetadata>,
}

impl FileMetadata {
    pub fn new(file_name: impl Into<String>, file_type: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            file_type: file_type.into(),
            pdf: None,
        }
    }

    /// Total pages for catalog rendering: PDF metadata when present,
    /// otherwise the page count is supplied by the caller.
    pub fn total_pages(&self) -> Option<u32> {
        self.pdf.as_ref().map(|p| p.total_pages)
    }

    pub fn total_images(&self) -> u32 {
        self.pdf.as_ref().map(|p| p.total_images).unwrap_or(0)
    }

    pub fn has_chapters(&self) -> bool {
        self.pdf.as_ref().map(|p| p.has_chapters).unwrap_or(false)
    }
}

/// Result of extracting a single document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Page texts, one entry per page (index + 1 = page number)
    pub content: Vec<String>,
    /// Extracted images; None when images were not requested or the
    /// extractor does not support them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageData>>,
    /// File metadata
    pub metadata: FileMetadata,
}

impl ExtractionResult {
    /// Validate the structural invariants of the data contract
    pub fn validate(&self) -> Result<()> {
        if self.content.is_empty() {
            return Err(VellumError::InvalidInput(
                "extraction result must contain at least one page".to_string(),
            ));
        }
        if let Some(images) = &self.images {
            let mut last_number = 0;
            for image in images {
                image.validate()?;
                if image.image_number <= last_number {
                    return Err(VellumError::InvalidInput(format!(
                        "image_number must be strictly increasing (got {} after {})",
                        image.image_number, last_number
                    )));
                }
                last_number = image.image_number;
            }
        }
        Ok(())
    }

    pub fn page_count(&self) -> usize {
        self.content.len()
    }

    pub fn image_count(&self) -> usize {
        self.images.as_ref().map(|i| i.len()).unwrap_or(0)
    }
}

/// A prepared record: the flat field map handed to the vector store
pub type Record = serde_json::Map<String, serde_json::Value>;
