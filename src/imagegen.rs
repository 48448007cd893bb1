use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ItemError, RemoteError};
use crate::model::PromptPair;
use crate::retry::RetryPolicy;

pub const DEFAULT_ENDPOINT: &str = "https://api.siliconflow.cn/v1/images/generations";
pub const DEFAULT_MODEL: &str = "Qwen/Qwen-Image";

/// Size and sampling parameters sent with every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageParams {
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub guidance_scale: f64,
}

impl Default for ImageParams {
    fn default() -> Self {
        Self {
            width: 768,
            height: 1024,
            steps: 25,
            guidance_scale: 7.0,
        }
    }
}

/// Wire body of one synthesis request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub guidance_scale: f64,
}

/// The generation service. Returns the raw JSON body of a 2xx response;
/// statuses >= 400 come back as `RemoteError::Status` with the body.
#[async_trait]
pub trait ImageService: Send + Sync {
    async fn synthesize(&self, request: &GenerationRequest) -> Result<Value, RemoteError>;
}

#[derive(Clone)]
pub struct SiliconFlowClient {
    http: Client,
    endpoint: Url,
    api_key: String,
}

impl fmt::Debug for SiliconFlowClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiliconFlowClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl SiliconFlowClient {
    pub fn new(api_key: String, endpoint: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| RemoteError::Transport(format!("invalid generation endpoint: {}", e)))?;
        let http = Client::builder()
            .user_agent(concat!("notion-imagegen/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint,
            api_key,
        })
    }

    pub fn build_request(&self, body: &GenerationRequest) -> Result<reqwest::Request, RemoteError> {
        Ok(self
            .http
            .post(self.endpoint.clone())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .build()?)
    }
}

#[async_trait]
impl ImageService for SiliconFlowClient {
    async fn synthesize(&self, request: &GenerationRequest) -> Result<Value, RemoteError> {
        let http_request = self.build_request(request)?;
        debug!(url = %http_request.url(), model = %request.model, "sending generation request");
        let res = self.http.execute(http_request).await?;
        let status = res.status();
        let body = res.text().await?;
        if status.as_u16() >= 400 {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

/// First usable URL from the known response shapes, checked in priority
/// order: `data[0].url`, then `images[0].url`, then a top-level `url`.
pub fn extract_image_url(body: &Value) -> Option<String> {
    [
        body.pointer("/data/0/url"),
        body.pointer("/images/0/url"),
        body.get("url"),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .find(|url| !url.is_empty())
    .map(str::to_string)
}

pub struct ImageRequestClient {
    service: Arc<dyn ImageService>,
    model: String,
    retry: RetryPolicy,
}

impl ImageRequestClient {
    pub fn new(service: Arc<dyn ImageService>, model: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            service,
            model: model.into(),
            retry,
        }
    }

    pub fn request_for(&self, prompt: &PromptPair, params: &ImageParams) -> GenerationRequest {
        GenerationRequest {
            model: self.model.clone(),
            prompt: prompt.positive.clone(),
            negative_prompt: prompt.negative.clone(),
            width: params.width,
            height: params.height,
            steps: params.steps,
            guidance_scale: params.guidance_scale,
        }
    }

    /// `Ok(None)` means the service answered but no URL could be extracted.
    pub async fn generate(
        &self,
        prompt: &PromptPair,
        params: &ImageParams,
    ) -> Result<Option<String>, ItemError> {
        if prompt.positive.trim().is_empty() {
            return Err(ItemError::EmptyPrompt);
        }
        let request = &self.request_for(prompt, params);
        let service = &self.service;
        let body = self
            .retry
            .run("image.generate", move || service.synthesize(request))
            .await?;
        let url = extract_image_url(&body);
        if url.is_none() {
            warn!(response = %body, "generation response carried no url");
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct ScriptedService {
        responses: Mutex<VecDeque<Result<Value, RemoteError>>>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    #[async_trait]
    impl ImageService for ScriptedService {
        async fn synthesize(&self, request: &GenerationRequest) -> Result<Value, RemoteError> {
            self.requests.lock().await.push(request.clone());
            self.responses
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Ok(json!({})))
        }
    }

    fn prompt(positive: &str) -> PromptPair {
        PromptPair {
            positive: positive.into(),
            negative: "noise".into(),
        }
    }

    fn client(service: Arc<ScriptedService>) -> ImageRequestClient {
        ImageRequestClient::new(
            service,
            DEFAULT_MODEL,
            RetryPolicy::new(2, Duration::from_millis(10)),
        )
    }

    #[test]
    fn extracts_url_in_priority_order() {
        assert_eq!(
            extract_image_url(&json!({ "data": [ { "url": "http://x/1.png" } ] })),
            Some("http://x/1.png".into())
        );
        assert_eq!(
            extract_image_url(&json!({ "images": [ { "url": "http://x/2.png" } ] })),
            Some("http://x/2.png".into())
        );
        assert_eq!(
            extract_image_url(&json!({ "url": "http://x/3.png" })),
            Some("http://x/3.png".into())
        );
        assert_eq!(
            extract_image_url(&json!({
                "url": "http://x/3.png",
                "images": [ { "url": "http://x/2.png" } ],
                "data": [ { "url": "http://x/1.png" } ]
            })),
            Some("http://x/1.png".into())
        );
        // data present but unusable falls through to the next shape
        assert_eq!(
            extract_image_url(&json!({
                "data": [ { "b64_json": "..." } ],
                "images": [ { "url": "http://x/2.png" } ]
            })),
            Some("http://x/2.png".into())
        );
    }

    #[test]
    fn missing_or_empty_url_is_none() {
        assert_eq!(extract_image_url(&json!({})), None);
        assert_eq!(extract_image_url(&json!({ "data": [] })), None);
        assert_eq!(extract_image_url(&json!({ "url": "" })), None);
        assert_eq!(extract_image_url(&json!({ "url": 42 })), None);
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected_without_request() {
        let service = Arc::new(ScriptedService::default());
        let err = client(service.clone())
            .generate(&prompt("  "), &ImageParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ItemError::EmptyPrompt));
        assert!(service.requests.lock().await.is_empty());
    }

    #[tokio::test]
    async fn sends_prompt_and_params() {
        let service = Arc::new(ScriptedService::default());
        service
            .responses
            .lock()
            .await
            .push_back(Ok(json!({ "images": [ { "url": "http://x/9.png" } ] })));
        let params = ImageParams {
            width: 512,
            height: 512,
            steps: 30,
            guidance_scale: 4.5,
        };
        let url = client(service.clone())
            .generate(&prompt("画面描述：cat"), &params)
            .await
            .unwrap();
        assert_eq!(url.as_deref(), Some("http://x/9.png"));

        let requests = service.requests.lock().await;
        assert_eq!(requests.len(), 1);
        let sent = serde_json::to_value(&requests[0]).unwrap();
        assert_eq!(
            sent,
            json!({
                "model": DEFAULT_MODEL,
                "prompt": "画面描述：cat",
                "negative_prompt": "noise",
                "width": 512,
                "height": 512,
                "steps": 30,
                "guidance_scale": 4.5
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_are_retried_then_reported() {
        let service = Arc::new(ScriptedService::default());
        {
            let mut responses = service.responses.lock().await;
            for _ in 0..3 {
                responses.push_back(Err(RemoteError::Status {
                    status: 502,
                    body: "bad gateway".into(),
                }));
            }
        }
        let err = client(service.clone())
            .generate(&prompt("x"), &ImageParams::default())
            .await
            .unwrap_err();
        match err {
            ItemError::Remote(RemoteError::Status { status, body }) => {
                assert_eq!(status, 502);
                assert_eq!(body, "bad gateway");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(service.requests.lock().await.len(), 3);
    }

    #[test]
    fn build_request_sets_headers() {
        let client =
            SiliconFlowClient::new("key".into(), DEFAULT_ENDPOINT, Duration::from_secs(120)).unwrap();
        let body = ImageRequestClient::new(
            Arc::new(ScriptedService::default()),
            DEFAULT_MODEL,
            RetryPolicy::default(),
        )
        .request_for(&prompt("x"), &ImageParams::default());
        let request = client.build_request(&body).unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().path(), "/v1/images/generations");
        assert_eq!(
            request
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "Bearer key"
        );
    }
}
