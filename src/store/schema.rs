//! Collection schemas for the two record families
//!
//! Both partitions share a fixed field layout with dynamic fields enabled:
//! an auto-generated primary key, scalar-indexed `file_id`/`file_type`, and
//! one vector field `text_embedding` of the embedder's dimension.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VellumError};

/// Vector field name shared by every schema and index
pub const VECTOR_FIELD: &str = "text_embedding";

/// Maximum stored text length in characters
pub const TEXT_MAX_LENGTH: usize = 20_000;

/// Field data type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Int64 {
        #[serde(default)]
        primary: bool,
        #[serde(default)]
        auto_id: bool,
    },
    VarChar {
        max_length: usize,
        #[serde(default)]
        indexed: bool,
    },
    FloatVector {
        dim: usize,
    },
}

/// A single field in a collection schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldSchema {
    fn varchar(name: &str, max_length: usize) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::VarChar {
                max_length,
                indexed: false,
            },
        }
    }

    fn varchar_indexed(name: &str, max_length: usize) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::VarChar {
                max_length,
                indexed: true,
            },
        }
    }
}

/// Schema of a collection: fields plus the dynamic-field flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub fields: Vec<FieldSchema>,
    pub enable_dynamic: bool,
}

impl CollectionSchema {
    pub fn vector_dimension(&self) -> Option<usize> {
        self.fields.iter().find_map(|f| match f.kind {
            FieldKind::FloatVector { dim } => Some(dim),
            _ => None,
        })
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Builds a schema for a given embedding dimension
pub trait SchemaProvider: Send + Sync {
    fn build(&self, embedding_dim: usize) -> CollectionSchema;
}

/// Schema kind registry, keyed by string and closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// Text chunks and image-derived records
    Document,
    /// One summary record per document
    Summary,
}

impl std::str::FromStr for SchemaKind {
    type Err = VellumError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "document" => Ok(SchemaKind::Document),
            "summary" => Ok(SchemaKind::Summary),
            _ => Err(VellumError::Config(format!(
                "Unknown schema '{}'. Supported schemas: document, summary",
                s
            ))),
        }
    }
}

/// Schema for the documents side: chunk and image records
pub struct DocumentSchema;

impl SchemaProvider for DocumentSchema {
    fn build(&self, embedding_dim: usize) -> CollectionSchema {
        CollectionSchema {
            fields: vec![
                FieldSchema {
                    name: "id".to_string(),
                    kind: FieldKind::Int64 {
                        primary: true,
                        auto_id: true,
                    },
                },
                FieldSchema::varchar_indexed("file_id", 100),
                FieldSchema::varchar_indexed("file_type", 30),
                FieldSchema::varchar("file_name", 1024),
                FieldSchema::varchar("text", TEXT_MAX_LENGTH),
                FieldSchema {
                    name: VECTOR_FIELD.to_string(),
                    kind: FieldKind::FloatVector { dim: embedding_dim },
                },
                FieldSchema::varchar("pages", 100),
                FieldSchema::varchar("chapters", 500),
                FieldSchema::varchar("image_number", 100),
                FieldSchema::varchar("image_number_in_page", 100),
                FieldSchema::varchar("full_images", 100),
                FieldSchema::varchar("date", 100),
            ],
            enable_dynamic: true,
        }
    }
}

/// Schema for the summaries side: one record per document
pub struct SummarySchema;

impl SchemaProvider for SummarySchema {
    fn build(&self, embedding_dim: usize) -> CollectionSchema {
        CollectionSchema {
            fields: vec![
                FieldSchema {
                    name: "id".to_string(),
                    kind: FieldKind::Int64 {
                        primary: true,
                        auto_id: true,
                    },
                },
                FieldSchema::varchar_indexed("file_id", 100),
                FieldSchema::varchar_indexed("file_type", 30),
                FieldSchema::varchar("file_name", 1024),
                FieldSchema::varchar("text", TEXT_MAX_LENGTH),
                FieldSchema {
                    name: VECTOR_FIELD.to_string(),
                    kind: FieldKind::FloatVector { dim: embedding_dim },
                },
                FieldSchema::varchar("pages", 100),
                FieldSchema::varchar("chapters", 500),
                FieldSchema::varchar("full_images", 100),
                FieldSchema::varchar("date", 100),
            ],
            enable_dynamic: true,
        }
    }
}

/// Build the schema for a kind and embedding dimension
pub fn schema_for(kind: SchemaKind, embedding_dim: usize) -> CollectionSchema {
    match kind {
        SchemaKind::Document => DocumentSchema.build(embedding_dim),
        SchemaKind::Summary => SummarySchema.build(embedding_dim),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_kind_registry_is_closed() {
        assert_eq!("document".parse::<SchemaKind>().unwrap(), SchemaKind::Document);
        assert_eq!("Summary".parse::<SchemaKind>().unwrap(), SchemaKind::Summary);
        assert!("graph".parse::<SchemaKind>().is_err());
    }

    #[test]
    fn test_document_schema_fields() {
        let schema = schema_for(SchemaKind::Document, 1536);
        assert_eq!(schema.vector_dimension(), Some(1536));
        assert!(schema.enable_dynamic);

        let primary = schema.field("id").unwrap();
        assert!(matches!(
            primary.kind,
            FieldKind::Int64 {
                primary: true,
                auto_id: true
            }
        ));

        for name in [
            "file_id",
            "file_type",
            "file_name",
            "text",
            "pages",
            "chapters",
            "image_number",
            "image_number_in_page",
            "full_images",
            "date",
        ] {
            assert!(schema.field(name).is_some(), "missing field {}", name);
        }

        assert!(matches!(
            schema.field("file_id").unwrap().kind,
            FieldKind::VarChar { indexed: true, .. }
        ));
    }

    #[test]
    fn test_summary_schema_fields() {
        let schema = schema_for(SchemaKind::Summary, 384);
        assert_eq!(schema.vector_dimension(), Some(384));
        for name in ["file_id", "file_type", "text", "pages", "chapters", "full_images"] {
            assert!(schema.field(name).is_some(), "missing field {}", name);
        }
    }
}
