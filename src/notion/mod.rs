use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::RemoteError;
use crate::notion::model::{DatabaseQuery, QueryResponse, RetrieveDatabaseResp};

pub mod model;

const NOTION_API_BASE: &str = "https://api.notion.com/";
const NOTION_TIMEOUT: Duration = Duration::from_secs(60);

/// The document-database operations the pipeline depends on.
#[async_trait]
pub trait NotionService: Send + Sync {
    async fn query_database(&self, query: &DatabaseQuery) -> Result<QueryResponse, RemoteError>;

    /// Partial update of a page's properties.
    async fn update_page(&self, page_id: &str, properties: Value) -> Result<(), RemoteError>;
}

#[derive(Clone)]
pub struct NotionClient {
    http: Client,
    base_url: Url,
    token: String,
    version: String,
}

impl fmt::Debug for NotionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotionClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl NotionClient {
    pub fn new(token: String, version: String) -> Result<Self, RemoteError> {
        let base_url =
            Url::parse(NOTION_API_BASE).map_err(|e| RemoteError::Transport(e.to_string()))?;
        Self::with_base_url(token, version, base_url)
    }

    pub fn with_base_url(token: String, version: String, base_url: Url) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .user_agent(concat!("notion-imagegen/", env!("CARGO_PKG_VERSION")))
            .timeout(NOTION_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url,
            token,
            version,
        })
    }

    pub fn build_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Request, RemoteError> {
        let endpoint = self
            .base_url
            .join(path)
            .map_err(|e| RemoteError::Transport(format!("invalid Notion url: {}", e)))?;
        let mut builder = self
            .http
            .request(method, endpoint)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Notion-Version", &self.version);
        if let Some(body) = body {
            builder = builder
                .header("Content-Type", "application/json")
                .json(body);
        }
        Ok(builder.build()?)
    }

    async fn execute<T: DeserializeOwned>(&self, request: reqwest::Request) -> Result<T, RemoteError> {
        debug!(method = %request.method(), url = %request.url(), "sending notion request");
        let res = self.http.execute(request).await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), %body, "notion api error");
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let text = res.text().await?;
        serde_json::from_str(&text).map_err(|e| RemoteError::Decode(e.to_string()))
    }

    pub async fn retrieve_database(&self, database_id: &str) -> Result<RetrieveDatabaseResp, RemoteError> {
        let request = self.build_request(
            Method::GET,
            &format!("v1/databases/{}", database_id),
            None,
        )?;
        self.execute(request).await
    }
}

#[async_trait]
impl NotionService for NotionClient {
    async fn query_database(&self, query: &DatabaseQuery) -> Result<QueryResponse, RemoteError> {
        let body = build_query_request(query);
        let request = self.build_request(
            Method::POST,
            &format!("v1/databases/{}/query", query.database_id),
            Some(&body),
        )?;
        self.execute(request).await
    }

    async fn update_page(&self, page_id: &str, properties: Value) -> Result<(), RemoteError> {
        let body = json!({ "properties": properties });
        let request =
            self.build_request(Method::PATCH, &format!("v1/pages/{}", page_id), Some(&body))?;
        let _: Value = self.execute(request).await?;
        Ok(())
    }
}

pub fn build_query_request(query: &DatabaseQuery) -> Value {
    let mut body = Map::new();
    if !query.filter.is_empty() {
        let conditions: Vec<Value> = query.filter.iter().map(|p| p.as_json().clone()).collect();
        body.insert("filter".into(), json!({ "and": conditions }));
    }
    if !query.sorts.is_empty() {
        body.insert("sorts".into(), json!(query.sorts));
    }
    body.insert("page_size".into(), json!(query.page_size));
    if let Some(cursor) = query.start_cursor.as_deref() {
        body.insert("start_cursor".into(), json!(cursor));
    }
    Value::Object(body)
}

/// Properties payload replacing a files property with one external reference.
pub fn build_external_file_properties(property: &str, name: &str, url: &str) -> Value {
    let mut properties = Map::new();
    let name = if name.is_empty() { url } else { name };
    properties.insert(
        property.to_string(),
        json!({
            "files": [
                {
                    "name": name,
                    "type": "external",
                    "external": { "url": url }
                }
            ]
        }),
    );
    Value::Object(properties)
}
