//! Filter synthesis from extracted metadata
//!
//! Renders the per-document constraints into the store filter grammar:
//! each document becomes `(file_id == "<id>" [and pages in [...]] ...)`,
//! documents combine with `or`, and any caller-supplied filter is ANDed
//! around the whole disjunction.
//!
//! Field mapping: the LLM contract speaks `num_image`/`type_file`; records
//! store `image_number`/`file_type`. A `search_image` flag without image
//! numbers constrains to image-derived records via `image_number != ""`.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::search::metadata::DocMetadata;
use crate::store::{CmpOp, FilterExpr, Literal};

pub struct FilterBuilder;

impl FilterBuilder {
    /// Expression for one document: always the id, plus every surviving
    /// constraint.
    pub fn for_document(file_id: &str, metadata: &DocMetadata) -> FilterExpr {
        let mut parts = vec![FilterExpr::eq("file_id", file_id)];

        if let Some(pages) = metadata.pages.as_deref().filter(|p| !p.is_empty()) {
            parts.push(FilterExpr::in_list(
                "pages",
                pages
                    .iter()
                    .map(|page| Literal::Str(page.to_string()))
                    .collect(),
            ));
        }

        if let Some(chapters) = metadata.chapters.as_deref().filter(|c| !c.is_empty()) {
            parts.push(FilterExpr::in_list(
                "chapters",
                chapters
                    .iter()
                    .map(|chapter| Literal::Str(chapter.clone()))
                    .collect(),
            ));
        }

        if let Some(numbers) = metadata.num_image.as_deref().filter(|n| !n.is_empty()) {
            parts.push(FilterExpr::in_list(
                "image_number",
                numbers
                    .iter()
                    .map(|number| Literal::Str(number.to_string()))
                    .collect(),
            ));
        } else if metadata.search_image {
            parts.push(FilterExpr::Cmp {
                field: "image_number".to_string(),
                op: CmpOp::Ne,
                value: Literal::Str(String::new()),
            });
        }

        if let Some(type_file) = metadata
            .type_file
            .as_deref()
            .filter(|t| !t.trim().is_empty())
        {
            parts.push(FilterExpr::eq("file_type", type_file));
        }

        FilterExpr::and(parts)
    }

    /// Combined disjunction over the metadata map; None when empty
    pub fn combined(metadata: &BTreeMap<String, DocMetadata>) -> Option<FilterExpr> {
        if metadata.is_empty() {
            return None;
        }
        Some(FilterExpr::or(
            metadata
                .iter()
                .map(|(file_id, doc)| Self::for_document(file_id, doc))
                .collect(),
        ))
    }

    /// Expression for a selection: documents with surviving metadata get
    /// their constraints, the rest degrade to id-only.
    pub fn for_selection(
        selected: &[String],
        metadata: &BTreeMap<String, DocMetadata>,
    ) -> Option<FilterExpr> {
        if selected.is_empty() {
            return None;
        }
        let default = DocMetadata::default();
        Some(FilterExpr::or(
            selected
                .iter()
                .map(|file_id| {
                    Self::for_document(file_id, metadata.get(file_id).unwrap_or(&default))
                })
                .collect(),
        ))
    }

    /// Id-only filter: `file_id == "<id>"` for one document, membership
    /// for several.
    pub fn ids_only(file_ids: &[String]) -> Option<FilterExpr> {
        match file_ids {
            [] => None,
            [only] => Some(FilterExpr::eq("file_id", only)),
            many => Some(FilterExpr::in_list(
                "file_id",
                many.iter().map(|id| Literal::Str(id.clone())).collect(),
            )),
        }
    }

    /// AND a caller-supplied filter string around the built expression and
    /// render the result. The caller filter is parsed first, so syntax
    /// violations surface as errors instead of reaching the store.
    pub fn with_caller_filter(
        built: Option<FilterExpr>,
        caller: Option<&str>,
    ) -> Result<Option<String>> {
        let caller = match caller.map(str::trim).filter(|c| !c.is_empty()) {
            Some(caller) => Some(FilterExpr::parse(caller)?),
            None => None,
        };

        Ok(match (built, caller) {
            (Some(built), Some(caller)) => Some(FilterExpr::and(vec![built, caller]).to_string()),
            (Some(built), None) => Some(built.to_string()),
            (None, Some(caller)) => Some(caller.to_string()),
            (None, None) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn meta(pages: Option<Vec<u32>>) -> DocMetadata {
        DocMetadata {
            pages,
            ..Default::default()
        }
    }

    #[test]
    fn test_single_document_without_extras() {
        let expr = FilterBuilder::for_document("doc_001", &DocMetadata::default());
        assert_eq!(expr.to_string(), r#"file_id == "doc_001""#);
    }

    #[test]
    fn test_document_with_pages_and_type() {
        let metadata = DocMetadata {
            pages: Some(vec![1, 2, 3]),
            type_file: Some("pdf".to_string()),
            ..Default::default()
        };
        let expr = FilterBuilder::for_document("doc_001", &metadata);
        assert_eq!(
            expr.to_string(),
            r#"file_id == "doc_001" and pages in ["1", "2", "3"] and file_type == "pdf""#
        );
    }

    #[test]
    fn test_search_image_without_numbers() {
        let metadata = DocMetadata {
            search_image: true,
            ..Default::default()
        };
        let expr = FilterBuilder::for_document("doc_001", &metadata);
        assert_eq!(
            expr.to_string(),
            r#"file_id == "doc_001" and image_number != """#
        );
    }

    #[test]
    fn test_image_numbers_win_over_flag() {
        let metadata = DocMetadata {
            search_image: true,
            num_image: Some(vec![2]),
            ..Default::default()
        };
        let expr = FilterBuilder::for_document("doc_001", &metadata);
        assert_eq!(
            expr.to_string(),
            r#"file_id == "doc_001" and image_number in ["2"]"#
        );
    }

    #[test]
    fn test_combined_is_parenthesized_disjunction() {
        let mut metadata = BTreeMap::new();
        metadata.insert("doc_001".to_string(), meta(Some(vec![1, 2])));
        metadata.insert("doc_002".to_string(), meta(None));

        let expr = FilterBuilder::combined(&metadata).unwrap();
        assert_eq!(
            expr.to_string(),
            r#"(file_id == "doc_001" and pages in ["1", "2"]) or file_id == "doc_002""#
        );
    }

    #[test]
    fn test_empty_metadata_map() {
        assert!(FilterBuilder::combined(&BTreeMap::new()).is_none());
        assert!(FilterBuilder::for_selection(&[], &BTreeMap::new()).is_none());
        assert!(FilterBuilder::ids_only(&[]).is_none());
    }

    #[test]
    fn test_for_selection_degrades_missing_to_id_only() {
        let selected = vec!["doc_001".to_string(), "doc_002".to_string()];
        let mut metadata = BTreeMap::new();
        metadata.insert("doc_001".to_string(), meta(Some(vec![4])));

        let expr = FilterBuilder::for_selection(&selected, &metadata).unwrap();
        assert_eq!(
            expr.to_string(),
            r#"(file_id == "doc_001" and pages in ["4"]) or file_id == "doc_002""#
        );
    }

    #[test]
    fn test_ids_only_shapes() {
        assert_eq!(
            FilterBuilder::ids_only(&["a".to_string()]).unwrap().to_string(),
            r#"file_id == "a""#
        );
        assert_eq!(
            FilterBuilder::ids_only(&["a".to_string(), "b".to_string()])
                .unwrap()
                .to_string(),
            r#"file_id in ["a", "b"]"#
        );
    }

    #[test]
    fn test_caller_filter_is_anded() {
        let built = FilterBuilder::ids_only(&["a".to_string(), "b".to_string()]);
        let rendered = FilterBuilder::with_caller_filter(built, Some(r#"file_type == "pdf""#))
            .unwrap()
            .unwrap();
        assert_eq!(rendered, r#"file_id in ["a", "b"] and file_type == "pdf""#);
    }

    #[test]
    fn test_caller_filter_syntax_violation_is_fatal() {
        let built = FilterBuilder::ids_only(&["a".to_string()]);
        assert!(FilterBuilder::with_caller_filter(built, Some("file_id ==")).is_err());
    }

    #[test]
    fn test_no_filters_at_all() {
        assert_eq!(
            FilterBuilder::with_caller_filter(None, None).unwrap(),
            None
        );
    }
}
