//! HTTP client wrapper for the Qdrant-backed vector index.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::types::{
    DocumentOutcome, IndexError, IndexedDocument, RetrievedPassage, SearchFilter, VectorIndex,
};

/// Lightweight HTTP client implementing [`VectorIndex`] against a Qdrant instance.
pub struct SearchIndexService {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
    vector_size: u64,
}

impl SearchIndexService {
    /// Construct a new client for the given endpoint and collection.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        collection: &str,
        vector_size: u64,
    ) -> Result<Self, IndexError> {
        let client = Client::builder().user_agent("checklist-rag/0.1").build()?;
        let base_url = normalize_base_url(base_url).map_err(IndexError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            collection,
            vector_size,
            has_api_key = api_key.as_deref().map(|key| !key.is_empty()).unwrap_or(false),
            "Initialized search index HTTP client"
        );
        Ok(Self {
            client,
            base_url,
            api_key,
            collection: collection.to_string(),
            vector_size,
        })
    }

    async fn collection_exists(&self) -> Result<bool, IndexError> {
        let response = self
            .request(Method::GET, &format!("collections/{}", self.collection))
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = IndexError::UnexpectedStatus { status, body };
                tracing::error!(collection = %self.collection, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    async fn create_collection(&self) -> Result<(), IndexError> {
        let body = json!({
            "vectors": {
                "size": self.vector_size,
                "distance": "Cosine"
            }
        });
        let response = self
            .request(Method::PUT, &format!("collections/{}", self.collection))
            .json(&body)
            .send()
            .await?;
        self.ensure_success(response, || {
            tracing::debug!(collection = %self.collection, "Collection created");
        })
        .await
    }

    /// Ensure payload indexes exist for the filterable fields of the document schema.
    async fn ensure_payload_indexes(&self) -> Result<(), IndexError> {
        let fields: [(&str, &str); 3] = [
            ("request_id", "keyword"),
            ("source", "keyword"),
            ("page_number", "integer"),
        ];

        for (field, schema) in fields {
            let body = json!({
                "field_name": field,
                "field_schema": schema,
            });
            let response = self
                .request(Method::PUT, &format!("collections/{}/index", self.collection))
                .json(&body)
                .send()
                .await?;

            if response.status().is_success() || response.status() == StatusCode::CONFLICT {
                tracing::debug!(collection = %self.collection, field, schema, "Payload index ensured");
            } else {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let error = IndexError::UnexpectedStatus { status, body };
                tracing::warn!(collection = %self.collection, field, schema, error = %error, "Failed to ensure payload index");
            }
        }
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let mut request = self.client.request(method, url);
        if let Some(api_key) = self.api_key.as_deref().filter(|key| !key.is_empty()) {
            request = request.header("api-key", api_key);
        }
        request
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), IndexError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = IndexError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Search index request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl VectorIndex for SearchIndexService {
    async fn ensure_ready(&self) -> Result<(), IndexError> {
        if !self.collection_exists().await? {
            tracing::debug!(collection = %self.collection, vector_size = self.vector_size, "Creating collection");
            self.create_collection().await?;
        }
        self.ensure_payload_indexes().await
    }

    async fn upsert(
        &self,
        documents: &[IndexedDocument],
    ) -> Result<Vec<DocumentOutcome>, IndexError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let points: Vec<Value> = documents
            .iter()
            .map(|doc| {
                json!({
                    "id": doc.id,
                    "vector": doc.embeddings,
                    "payload": {
                        "request_id": doc.request_id,
                        "created_at": doc.created_at,
                        "source": doc.source,
                        "page_number": doc.page_number,
                        "paragraph_number": doc.paragraph_number,
                        "text": doc.text,
                    },
                })
            })
            .collect();

        let response = self
            .request(Method::PUT, &format!("collections/{}/points", self.collection))
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;

        let count = documents.len();
        self.ensure_success(response, || {
            tracing::debug!(collection = %self.collection, points = count, "Documents upserted");
        })
        .await?;

        Ok(documents
            .iter()
            .map(|doc| DocumentOutcome {
                id: doc.id.clone(),
                succeeded: true,
            })
            .collect())
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        k: usize,
        filter: SearchFilter,
    ) -> Result<Vec<RetrievedPassage>, IndexError> {
        let mut body = json!({
            "query": vector,
            "limit": k,
            "with_payload": true,
        });
        if let Some(filter_value) = build_filter(&filter) {
            body.as_object_mut()
                .expect("query body is an object")
                .insert("filter".into(), filter_value);
        }

        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/query", self.collection),
            )
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = IndexError::UnexpectedStatus { status, body };
            tracing::error!(collection = %self.collection, error = %error, "Similarity search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        Ok(points.into_iter().map(map_query_point).collect())
    }
}

/// Build a Qdrant `must` filter from the search filter fields.
fn build_filter(filter: &SearchFilter) -> Option<Value> {
    let mut must = Vec::new();
    if let Some(request_id) = filter.request_id.as_deref() {
        must.push(json!({ "key": "request_id", "match": { "value": request_id } }));
    }
    if let Some(source) = filter.source.as_deref() {
        must.push(json!({ "key": "source", "match": { "value": source } }));
    }
    if let Some(page) = filter.page_number {
        must.push(json!({ "key": "page_number", "match": { "value": page } }));
    }
    if must.is_empty() {
        None
    } else {
        Some(json!({ "must": must }))
    }
}

fn map_query_point(point: QueryPoint) -> RetrievedPassage {
    let mut text = String::new();
    let mut page_number = None;
    let mut paragraph_number = None;
    let mut source = None;

    if let Some(mut payload) = point.payload {
        if let Some(Value::String(value)) = payload.remove("text") {
            text = value;
        }
        page_number = payload
            .remove("page_number")
            .and_then(|value| value.as_u64())
            .map(|value| value as u32);
        paragraph_number = payload
            .remove("paragraph_number")
            .and_then(|value| value.as_u64())
            .map(|value| value as u32);
        if let Some(Value::String(value)) = payload.remove("source") {
            source = Some(value);
        }
    }

    RetrievedPassage {
        id: stringify_point_id(point.id),
        score: point.score,
        text,
        page_number,
        paragraph_number,
        source,
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        other => other.to_string(),
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
struct QueryPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}
