//! Record preparers
//!
//! Flatten structured chunk/image/summary data into the wire-format field
//! maps the vector store expects. Pages and chapters travel as comma-joined
//! strings; the structured form stays internal to the chunker.

use serde_json::json;

use crate::embedding::{EmbeddedChunk, Embedding};
use crate::types::{ImageData, Record};

/// File-level identity shared by every record of a document
#[derive(Debug, Clone)]
pub struct FileRef {
    pub file_id: String,
    pub file_name: String,
    pub file_type: String,
}

/// An image together with its description and embedding
#[derive(Debug, Clone)]
pub struct DescribedImage {
    pub image: ImageData,
    pub description: String,
    pub embedding: Embedding,
}

fn ingestion_date() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

fn join_numbers(values: &[u32]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Prepare text chunk records for the documents side
pub fn prepare_chunk_records(embedded: &[EmbeddedChunk], file: &FileRef) -> Vec<Record> {
    let date = ingestion_date();
    embedded
        .iter()
        .map(|item| {
            json!({
                "file_id": file.file_id,
                "file_type": file.file_type,
                "file_name": file.file_name,
                "text": item.chunk.text,
                "text_embedding": item.embedding.vector,
                "pages": join_numbers(&item.chunk.pages),
                "chapters": item.chunk.chapters.join(","),
                "image_number": "",
                "image_number_in_page": "",
                "full_images": "",
                "date": date,
            })
            .as_object()
            .expect("record literal is an object")
            .clone()
        })
        .collect()
}

/// Prepare image-derived records for the documents side. The file type is
/// prefixed with `image_` so image records are distinguishable from text.
pub fn prepare_image_records(images: &[DescribedImage], file: &FileRef) -> Vec<Record> {
    let date = ingestion_date();
    images
        .iter()
        .map(|item| {
            json!({
                "file_id": file.file_id,
                "file_type": format!("image_{}", file.file_type),
                "file_name": file.file_name,
                "text": item.description,
                "text_embedding": item.embedding.vector,
                "pages": item.image.page.to_string(),
                "chapters": "",
                "image_number": item.image.image_number.to_string(),
                "image_number_in_page": item.image.image_number_in_page.to_string(),
                "full_images": "",
                "date": date,
            })
            .as_object()
            .expect("record literal is an object")
            .clone()
        })
        .collect()
}

/// Prepare the single summary record for the summaries side
pub fn prepare_summary_record(
    summary: &str,
    embedding: &Embedding,
    file: &FileRef,
    total_pages: usize,
    has_chapters: bool,
    total_images: usize,
) -> Record {
    json!({
        "file_id": file.file_id,
        "file_type": format!("summary_{}", file.file_type),
        "file_name": format!("summary_{}", file.file_name),
        "text": summary,
        "text_embedding": embedding.vector,
        "pages": total_pages.to_string(),
        "chapters": has_chapters.to_string(),
        "full_images": total_images.to_string(),
        "date": ingestion_date(),
    })
    .as_object()
    .expect("record literal is an object")
    .clone()
}
