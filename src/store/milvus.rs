//! Milvus vector store backend (REST v2)
//!
//! Talks to a Milvus deployment over its HTTP API: connect by URL with an
//! optional token, named database, one collection per handle, named
//! partitions inside it. Create/load operations are idempotent.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Result, VellumError};
use crate::store::schema::VECTOR_FIELD;
use crate::store::{
    sort_hits, CollectionSchema, FieldKind, IndexKind, SearchHit, SearchParams, VectorStore,
};
use crate::types::Record;

/// Fields returned by searches and catalog queries
const OUTPUT_FIELDS: &[&str] = &[
    "text",
    "file_id",
    "file_name",
    "file_type",
    "pages",
    "chapters",
    "image_number",
    "image_number_in_page",
    "full_images",
    "date",
];

/// Upper bound for catalog queries
const QUERY_LIMIT: usize = 16_384;

/// Milvus collection handle
pub struct MilvusStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    database: String,
    collection: String,
}

impl MilvusStore {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            database: database.into(),
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn post(&self, path: &str, mut body: Value) -> Result<Value> {
        if let Some(object) = body.as_object_mut() {
            object.insert("dbName".to_string(), json!(self.database));
        }

        let mut request = self
            .client
            .post(format!("{}/v2/vectordb/{}", self.base_url, path))
            .json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(VellumError::Store(format!(
                "{} returned HTTP {}: {}",
                path, status, text
            )));
        }

        let mut envelope: Value = response.json().await?;
        let code = envelope["code"].as_i64().unwrap_or(-1);
        if code != 0 {
            return Err(VellumError::Store(format!(
                "{} failed with code {}: {}",
                path,
                code,
                envelope["message"].as_str().unwrap_or("unknown error")
            )));
        }
        Ok(envelope["data"].take())
    }

    async fn collection_exists(&self) -> Result<bool> {
        let data = self
            .post(
                "collections/has",
                json!({ "collectionName": self.collection }),
            )
            .await?;
        Ok(data["has"].as_bool().unwrap_or(false))
    }
}

/// Render a schema in the create-collection wire shape
fn schema_payload(schema: &CollectionSchema) -> Value {
    let fields: Vec<Value> = schema
        .fields
        .iter()
        .map(|field| match &field.kind {
            FieldKind::Int64 { primary, auto_id } => json!({
                "fieldName": field.name,
                "dataType": "Int64",
                "isPrimary": primary,
                "autoID": auto_id,
            }),
            FieldKind::VarChar { max_length, .. } => json!({
                "fieldName": field.name,
                "dataType": "VarChar",
                "elementTypeParams": { "max_length": max_length },
            }),
            FieldKind::FloatVector { dim } => json!({
                "fieldName": field.name,
                "dataType": "FloatVector",
                "elementTypeParams": { "dim": dim },
            }),
        })
        .collect();

    json!({
        "autoId": true,
        "enableDynamicField": schema.enable_dynamic,
        "fields": fields,
    })
}

/// Render index parameters in the create-collection wire shape
fn index_payload(index: &IndexKind) -> Value {
    let params = index.build_params();
    json!([{
        "fieldName": index.field_name(),
        "indexType": params["index_type"],
        "metricType": params["metric_type"],
        "params": params["params"],
    }])
}

/// Turn a search response row into a hit
fn parse_hit(row: &Value) -> Result<SearchHit> {
    let object = row
        .as_object()
        .ok_or_else(|| VellumError::Store("search row is not an object".to_string()))?;

    let id = object
        .get("id")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| VellumError::Store("search row is missing 'id'".to_string()))?;
    let score = object
        .get("distance")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0) as f32;

    let mut fields = Record::new();
    for (key, value) in object {
        if key != "distance" {
            fields.insert(key.clone(), value.clone());
        }
    }

    Ok(SearchHit { id, score, fields })
}

#[async_trait]
impl VectorStore for MilvusStore {
    async fn ensure_collection(&self, schema: &CollectionSchema, index: &IndexKind) -> Result<()> {
        if !self.collection_exists().await? {
            tracing::info!(
                collection = %self.collection,
                index = index.index_type(),
                "creating collection"
            );
            self.post(
                "collections/create",
                json!({
                    "collectionName": self.collection,
                    "schema": schema_payload(schema),
                    "indexParams": index_payload(index),
                }),
            )
            .await?;
        }

        self.post(
            "collections/load",
            json!({ "collectionName": self.collection }),
        )
        .await?;
        Ok(())
    }

    async fn ensure_partition(&self, partition: &str) -> Result<()> {
        let data = self
            .post(
                "partitions/has",
                json!({
                    "collectionName": self.collection,
                    "partitionName": partition,
                }),
            )
            .await?;

        if !data["has"].as_bool().unwrap_or(false) {
            self.post(
                "partitions/create",
                json!({
                    "collectionName": self.collection,
                    "partitionName": partition,
                }),
            )
            .await?;
            tracing::debug!(partition, "partition created");
        }
        Ok(())
    }

    async fn insert(&self, records: Vec<Record>, partition: &str) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let count = records.len();
        let data = self
            .post(
                "entities/insert",
                json!({
                    "collectionName": self.collection,
                    "partitionName": partition,
                    "data": records,
                }),
            )
            .await?;

        let inserted = data["insertCount"].as_u64().map(|n| n as usize).unwrap_or(count);
        tracing::debug!(partition, inserted, "records inserted");
        Ok(inserted)
    }

    async fn search(&self, params: SearchParams) -> Result<Vec<SearchHit>> {
        let mut body = json!({
            "collectionName": self.collection,
            "data": [params.vector],
            "annsField": VECTOR_FIELD,
            "limit": params.limit,
            "outputFields": OUTPUT_FIELDS,
        });
        if let Some(partitions) = &params.partitions {
            body["partitionNames"] = json!(partitions);
        }
        if let Some(filter) = params.filter.as_deref().filter(|f| !f.trim().is_empty()) {
            body["filter"] = json!(filter);
        }

        let data = self.post("entities/search", body).await?;
        let rows = data.as_array().cloned().unwrap_or_default();
        let mut hits = rows.iter().map(parse_hit).collect::<Result<Vec<_>>>()?;
        sort_hits(&mut hits);
        hits.truncate(params.limit);
        Ok(hits)
    }

    async fn fetch_all(&self) -> Result<Vec<Record>> {
        let data = self
            .post(
                "entities/query",
                json!({
                    "collectionName": self.collection,
                    "filter": "id >= 0",
                    "outputFields": OUTPUT_FIELDS,
                    "limit": QUERY_LIMIT,
                }),
            )
            .await?;

        let rows = data.as_array().cloned().unwrap_or_default();
        rows.iter()
            .map(|row| {
                row.as_object()
                    .cloned()
                    .ok_or_else(|| VellumError::Store("query row is not an object".to_string()))
            })
            .collect()
    }

    async fn delete_by_file_id(&self, file_id: &str) -> Result<usize> {
        let filter = crate::store::FilterExpr::eq("file_id", file_id).to_string();
        let data = self
            .post(
                "entities/delete",
                json!({
                    "collectionName": self.collection,
                    "filter": filter,
                }),
            )
            .await?;
        Ok(data["deleteCount"].as_u64().map(|n| n as usize).unwrap_or(0))
    }

    async fn list_partitions(&self) -> Result<Vec<String>> {
        let data = self
            .post(
                "partitions/list",
                json!({ "collectionName": self.collection }),
            )
            .await?;
        Ok(data
            .as_array()
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| n.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn release(&self) -> Result<()> {
        self.post(
            "collections/release",
            json!({ "collectionName": self.collection }),
        )
        .await?;
        Ok(())
    }
}
