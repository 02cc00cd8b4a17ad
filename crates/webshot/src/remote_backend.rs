//! Remote Render Backend
//!
//! Delegates rendering to an external screenshot service over HTTP

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::backend::{RenderBackend, RenderRequest};
use crate::error::{PreviewError, PreviewResult};

/// Render backend that posts render requests to a screenshot service
pub struct RemoteRenderBackend {
    /// Endpoint of the screenshot service
    service_url: String,
    /// API key for authentication (if required)
    api_key: Option<String>,
    /// HTTP client
    client: Client,
}

#[derive(Deserialize)]
struct RenderResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    image: Option<String>, // Base64 encoded image
    #[serde(default)]
    error: Option<String>,
}

impl RemoteRenderBackend {
    /// Create a new remote render backend
    pub fn new(service_url: impl Into<String>, api_key: Option<String>) -> PreviewResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| {
                error!("Failed to create HTTP client: {}", e);
                PreviewError::Network(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            service_url: service_url.into(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl RenderBackend for RemoteRenderBackend {
    async fn capture(&self, request: &RenderRequest, out: &mut Vec<u8>) -> PreviewResult<()> {
        debug!(
            "Rendering {} using remote service at {}",
            request.url, self.service_url
        );

        if url::Url::parse(&request.url).is_err() {
            return Err(PreviewError::InvalidUrl(request.url.clone()));
        }

        let mut call = self.client.post(&self.service_url).json(request);
        if let Some(ref api_key) = self.api_key {
            call = call.bearer_auth(api_key);
        }

        let response = call.send().await.map_err(|e| {
            error!("HTTP request to screenshot service failed: {}", e);
            PreviewError::Network(format!("Request failed: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(
                "Screenshot service returned error {}: {}",
                status, error_text
            );
            return Err(PreviewError::Network(format!(
                "Service returned error {}: {}",
                status, error_text
            )));
        }

        let body: RenderResponse = response.json().await.map_err(|e| {
            error!("Failed to parse screenshot service response: {}", e);
            PreviewError::Network(format!("Failed to parse response: {}", e))
        })?;

        if !body.success {
            let message = body.error.unwrap_or_else(|| "Unknown error".to_string());
            error!("Screenshot service reported failure: {}", message);
            return Err(PreviewError::BackendFault {
                url: request.url.clone(),
                message,
            });
        }

        let image_data = body
            .image
            .ok_or_else(|| PreviewError::NoData(request.url.clone()))?;
        let image_bytes = base64::engine::general_purpose::STANDARD
            .decode(image_data.trim())
            .map_err(|e| {
                error!("Failed to decode base64 image: {}", e);
                PreviewError::BackendFault {
                    url: request.url.clone(),
                    message: format!("Failed to decode image: {}", e),
                }
            })?;

        info!(
            "Rendered {} using remote service ({} bytes)",
            request.url,
            image_bytes.len()
        );
        out.extend_from_slice(&image_bytes);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "remote-api"
    }

    async fn is_available(&self) -> bool {
        let health_url = format!("{}/health", self.service_url.trim_end_matches('/'));
        self.client
            .get(&health_url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
