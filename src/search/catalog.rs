//! Document catalog
//!
//! Built from the summary records and rendered as the Markdown the
//! selection and metadata-extraction prompts are grounded on.

use crate::types::Record;

/// One document as described by its summary record
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub file_id: String,
    pub file_name: String,
    pub file_type: String,
    pub total_pages: u32,
    pub has_chapters: bool,
    pub total_images: u32,
    pub summary: String,
}

impl CatalogEntry {
    /// Parse a summary record; records without a file_id are skipped
    fn from_record(record: &Record) -> Option<Self> {
        let str_field = |name: &str| {
            record
                .get(name)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        };

        let file_id = str_field("file_id");
        if file_id.is_empty() {
            return None;
        }

        // summary records carry summary_-prefixed name and type
        let file_name = str_field("file_name");
        let file_name = file_name
            .strip_prefix("summary_")
            .unwrap_or(&file_name)
            .to_string();
        let file_type = str_field("file_type");
        let file_type = file_type
            .strip_prefix("summary_")
            .unwrap_or(&file_type)
            .to_string();

        Some(Self {
            file_id,
            file_name,
            file_type,
            total_pages: str_field("pages").trim().parse().unwrap_or(0),
            has_chapters: str_field("chapters").trim() == "true",
            total_images: str_field("full_images").trim().parse().unwrap_or(0),
            summary: str_field("text"),
        })
    }

    fn to_markdown(&self) -> String {
        format!(
            "## {}\n\n\
             - **ID:** `{}`\n\
             - **Type:** {}\n\
             - **Pages:** {}\n\
             - **Chapters:** {}\n\
             - **Images:** {}\n\n\
             **Description:**\n{}\n",
            self.file_name,
            self.file_id,
            self.file_type.to_uppercase(),
            self.total_pages,
            if self.has_chapters { "yes" } else { "no" },
            self.total_images,
            if self.summary.is_empty() {
                "No description available."
            } else {
                &self.summary
            }
        )
    }
}

/// The set of ingested documents, as seen by the search strategies
#[derive(Debug, Clone, Default)]
pub struct DocumentCatalog {
    entries: Vec<CatalogEntry>,
}

impl DocumentCatalog {
    pub fn from_records(records: &[Record]) -> Self {
        Self {
            entries: records.iter().filter_map(CatalogEntry::from_record).collect(),
        }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, file_id: &str) -> bool {
        self.entries.iter().any(|entry| entry.file_id == file_id)
    }

    pub fn get(&self, file_id: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|entry| entry.file_id == file_id)
    }

    /// Entries restricted to the given ids, preserving catalog order
    pub fn subset(&self, file_ids: &[String]) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|entry| file_ids.contains(&entry.file_id))
                .cloned()
                .collect(),
        }
    }

    /// Markdown rendering: one section per document
    pub fn to_markdown(&self) -> String {
        if self.entries.is_empty() {
            return "# Document Library\n\nNo documents available.".to_string();
        }

        let mut parts = vec![
            "# Document Library\n".to_string(),
            format!("Total documents: **{}**\n", self.entries.len()),
            "---\n".to_string(),
        ];
        for entry in &self.entries {
            parts.push(entry.to_markdown());
            parts.push("---\n".to_string());
        }
        parts.join("\n")
    }
}
