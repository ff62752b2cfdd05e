//! Generator backends: the remote HTTP image service and an offline renderer

use crate::config::{Backend, ServiceOptions};
use crate::error::{Error, Result};
use crate::qr::QrEncoder;
use crate::request::QrRequest;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Image bytes returned by a generator
#[derive(Debug, Clone)]
pub struct FetchedImage {
    /// Reference to the fetched resource (final response URL, or a data URI for local renders)
    pub url: String,
    /// Encoded image bytes
    pub bytes: Bytes,
    /// Reported content type, if any
    pub content_type: Option<String>,
}

/// Something that turns a [`QrRequest`] into image bytes
#[async_trait]
pub trait QrService: Send + Sync {
    /// Fetch the image described by `request`.
    async fn fetch(&self, request: &QrRequest) -> Result<FetchedImage>;
}

/// Build the backend selected in configuration.
pub fn from_options(options: &ServiceOptions) -> Result<Arc<dyn QrService>> {
    match options.backend {
        Backend::Remote => Ok(Arc::new(HttpQrService::new(options)?)),
        Backend::Local => Ok(Arc::new(LocalQrService::new())),
    }
}

/// Client for a remote `create-qr-code` style endpoint
#[derive(Debug, Clone)]
pub struct HttpQrService {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpQrService {
    /// Create a client for the configured endpoint.
    pub fn new(options: &ServiceOptions) -> Result<Self> {
        url::Url::parse(&options.endpoint)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs.max(1)))
            .user_agent(options.user_agent.clone())
            .build()?;
        Ok(Self {
            http,
            endpoint: options.endpoint.clone(),
        })
    }

    /// Configured endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl QrService for HttpQrService {
    async fn fetch(&self, request: &QrRequest) -> Result<FetchedImage> {
        let url = request.url(&self.endpoint)?;
        debug!(%url, "Requesting QR image");

        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "QR service rejected request");
            return Err(Error::Fetch {
                status: status.as_u16(),
            });
        }

        let final_url = resp.url().to_string();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp.bytes().await?;
        debug!(bytes = bytes.len(), content_type = ?content_type, "Fetched QR image");

        Ok(FetchedImage {
            url: final_url,
            bytes,
            content_type,
        })
    }
}

/// Offline backend rendering with the `qrcode` crate
#[derive(Debug, Default)]
pub struct LocalQrService;

impl LocalQrService {
    /// Create the offline backend
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl QrService for LocalQrService {
    async fn fetch(&self, request: &QrRequest) -> Result<FetchedImage> {
        let request = request.clone();
        let format = request.format;
        let bytes = tokio::task::spawn_blocking(move || QrEncoder::new().render(&request))
            .await
            .map_err(|e| Error::Other(format!("Render task failed: {e}")))??;
        debug!(bytes = bytes.len(), %format, "Rendered QR image locally");

        Ok(FetchedImage {
            url: format!("data:{};base64,{}", format.mime(), STANDARD.encode(&bytes)),
            bytes: Bytes::from(bytes),
            content_type: Some(format.mime().to_string()),
        })
    }
}
